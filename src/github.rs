//! GitHub REST client for the live-window strategy.
//!
//! Implements [`IssueTracker`] over `api.github.com` (or a GitHub
//! Enterprise base URL). Listing is an idempotent read and is retried on
//! 429/5xx/transport failures; comment and issue creation are sent once.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use triage_core::models::RepoRef;
use triage_core::tracker::{CreatedComment, IssueTracker, TrackerConnector, TrackerIssue};

use crate::config::GithubConfig;

const PAGE_SIZE: usize = 100;
const RETRY_BASE_DELAY_MS: u64 = 500;

#[derive(Debug, Deserialize)]
struct GithubIssue {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GithubCommentCreateResponse {
    id: u64,
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubIssueCreateResponse {
    number: u64,
}

fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

fn retry_delay(attempt: usize) -> Duration {
    let exponent = attempt.saturating_sub(1).min(5) as u32;
    Duration::from_millis(RETRY_BASE_DELAY_MS.saturating_mul(1 << exponent))
}

fn truncate_for_error(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push_str("...");
    truncated
}

#[derive(Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
    retry_max_attempts: usize,
}

impl GithubClient {
    pub fn new(api_base: &str, token: &str, timeout_secs: u64, max_retries: u32) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("issue-triage"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header)
                .context("invalid github authorization header")?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .context("failed to create github api client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            retry_max_attempts: max_retries as usize + 1,
        })
    }

    async fn request_json<T, F>(&self, operation: &str, mut request_builder: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            match request_builder().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .with_context(|| format!("failed to decode github {operation}"));
                    }

                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts && is_retryable_status(status.as_u16()) {
                        tokio::time::sleep(retry_delay(attempt)).await;
                        continue;
                    }

                    bail!(
                        "github api {operation} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, 800)
                    );
                }
                Err(error) => {
                    let transient = error.is_timeout() || error.is_connect() || error.is_request();
                    if attempt < self.retry_max_attempts && transient {
                        tokio::time::sleep(retry_delay(attempt)).await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("github api {operation} request failed"));
                }
            }
        }
    }

    /// Single attempt; used for writes that must not be repeated.
    async fn send_once<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = request
            .send()
            .await
            .with_context(|| format!("github api {operation} request failed"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "github api {operation} failed with status {}: {}",
                status.as_u16(),
                truncate_for_error(&body, 800)
            );
        }
        response
            .json::<T>()
            .await
            .with_context(|| format!("failed to decode github {operation}"))
    }
}

#[async_trait]
impl IssueTracker for GithubClient {
    async fn list_open_issues(&self, repo: &RepoRef, limit: usize) -> Result<Vec<TrackerIssue>> {
        let mut page = 1_u32;
        let mut rows = Vec::new();
        while rows.len() < limit {
            let url = format!("{}/repos/{}/{}/issues", self.api_base, repo.owner, repo.name);
            let page_value = page.to_string();
            let chunk: Vec<GithubIssue> = self
                .request_json("list issues", || {
                    self.http.get(&url).query(&[
                        ("state", "open"),
                        ("sort", "created"),
                        ("direction", "desc"),
                        ("per_page", "100"),
                        ("page", page_value.as_str()),
                    ])
                })
                .await?;
            let chunk_len = chunk.len();
            rows.extend(
                chunk
                    .into_iter()
                    .filter(|issue| issue.pull_request.is_none())
                    .map(|issue| TrackerIssue {
                        number: issue.number,
                        title: issue.title,
                        body: issue.body.unwrap_or_default(),
                    }),
            );
            if chunk_len < PAGE_SIZE {
                break;
            }
            page = page.saturating_add(1);
        }
        rows.truncate(limit);
        Ok(rows)
    }

    async fn create_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        body: &str,
    ) -> Result<CreatedComment> {
        let url = format!(
            "{}/repos/{}/{}/issues/{}/comments",
            self.api_base, repo.owner, repo.name, number
        );
        let created: GithubCommentCreateResponse = self
            .send_once("create comment", self.http.post(url).json(&json!({ "body": body })))
            .await?;
        Ok(CreatedComment {
            id: created.id,
            html_url: created.html_url,
        })
    }

    async fn create_issue(&self, repo: &RepoRef, title: &str, body: &str) -> Result<u64> {
        let url = format!("{}/repos/{}/{}/issues", self.api_base, repo.owner, repo.name);
        let created: GithubIssueCreateResponse = self
            .send_once(
                "create issue",
                self.http
                    .post(url)
                    .json(&json!({ "title": title, "body": body })),
            )
            .await?;
        Ok(created.number)
    }
}

/// Serves every installation with the token from `[github]` / `GITHUB_TOKEN`.
///
/// Exchanging a GitHub App installation id for a scoped token is left to
/// whatever provisions the token.
pub struct StaticTokenConnector {
    client: Arc<GithubClient>,
}

impl StaticTokenConnector {
    pub fn from_config(config: &GithubConfig) -> Result<Self> {
        let token = config
            .token
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("github.token (or GITHUB_TOKEN) required in live mode"))?;
        let client = GithubClient::new(
            &config.api_base,
            token,
            config.timeout_secs,
            config.max_retries,
        )?;
        Ok(Self {
            client: Arc::new(client),
        })
    }
}

#[async_trait]
impl TrackerConnector for StaticTokenConnector {
    async fn connect(&self, _installation_id: Option<u64>) -> Result<Arc<dyn IssueTracker>> {
        Ok(self.client.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn repo() -> RepoRef {
        RepoRef::new("owner", "repo")
    }

    fn client(server: &MockServer, max_retries: u32) -> GithubClient {
        GithubClient::new(&server.base_url(), "token", 5, max_retries).unwrap()
    }

    #[tokio::test]
    async fn test_list_open_issues_filters_pull_requests() {
        let server = MockServer::start();
        let list = server.mock(|when, then| {
            when.method(GET)
                .path("/repos/owner/repo/issues")
                .query_param("state", "open")
                .query_param("sort", "created")
                .query_param("direction", "desc")
                .header("authorization", "Bearer token")
                .header("accept", "application/vnd.github+json");
            then.status(200).json_body(json!([
                { "number": 9, "title": "newest", "body": "b9" },
                { "number": 8, "title": "a PR", "body": null, "pull_request": { "url": "x" } },
                { "number": 7, "title": "older", "body": null }
            ]));
        });

        let issues = client(&server, 0).list_open_issues(&repo(), 50).await.unwrap();

        list.assert_calls(1);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].number, 9);
        assert_eq!(issues[1].number, 7);
        assert_eq!(issues[1].body, "");
    }

    #[tokio::test]
    async fn test_list_open_issues_respects_limit() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/repos/owner/repo/issues");
            then.status(200).json_body(json!([
                { "number": 3, "title": "c" },
                { "number": 2, "title": "b" },
                { "number": 1, "title": "a" }
            ]));
        });

        let issues = client(&server, 0).list_open_issues(&repo(), 2).await.unwrap();
        assert_eq!(
            issues.iter().map(|i| i.number).collect::<Vec<_>>(),
            vec![3, 2]
        );
    }

    #[tokio::test]
    async fn test_list_retries_server_errors() {
        let server = MockServer::start();
        let list = server.mock(|when, then| {
            when.method(GET).path("/repos/owner/repo/issues");
            then.status(502);
        });

        let err = client(&server, 2)
            .list_open_issues(&repo(), 10)
            .await
            .unwrap_err();
        list.assert_calls(3);
        assert!(err.to_string().contains("502"));
    }

    #[tokio::test]
    async fn test_create_comment_is_not_retried() {
        let server = MockServer::start();
        let post = server.mock(|when, then| {
            when.method(POST).path("/repos/owner/repo/issues/42/comments");
            then.status(500);
        });

        let result = client(&server, 3)
            .create_comment(&repo(), 42, "hello")
            .await;
        assert!(result.is_err());
        post.assert_calls(1);
    }

    #[tokio::test]
    async fn test_create_comment_and_issue() {
        let server = MockServer::start();
        let comment = server.mock(|when, then| {
            when.method(POST)
                .path("/repos/owner/repo/issues/42/comments")
                .body_includes("Possibly related");
            then.status(201).json_body(json!({
                "id": 901,
                "html_url": "https://example.test/comment/901"
            }));
        });
        let issue = server.mock(|when, then| {
            when.method(POST)
                .path("/repos/owner/repo/issues")
                .body_includes("Seeded issue");
            then.status(201).json_body(json!({ "number": 77 }));
        });

        let client = client(&server, 0);
        let created = client
            .create_comment(&repo(), 42, "Possibly related issues:")
            .await
            .unwrap();
        let number = client
            .create_issue(&repo(), "Seeded issue", "body")
            .await
            .unwrap();

        comment.assert_calls(1);
        issue.assert_calls(1);
        assert_eq!(created.id, 901);
        assert_eq!(number, 77);
    }

    #[tokio::test]
    async fn test_static_connector_requires_token() {
        let config = GithubConfig::default();
        assert!(StaticTokenConnector::from_config(&config).is_err());

        let config = GithubConfig {
            token: Some("ghs_abc".into()),
            ..GithubConfig::default()
        };
        let connector = StaticTokenConnector::from_config(&config).unwrap();
        assert!(connector.connect(Some(12)).await.is_ok());
    }
}

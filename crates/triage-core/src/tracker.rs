//! Issue tracker abstraction.
//!
//! The live-window strategy lists open issues and posts comments through
//! [`IssueTracker`]; [`TrackerConnector`] resolves the installation
//! reference carried by a webhook event into a tracker client. Credential
//! exchange happens behind the connector.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::models::RepoRef;

/// An open issue as listed by the tracker (pull requests excluded).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerIssue {
    pub number: u64,
    pub title: String,
    pub body: String,
}

impl TrackerIssue {
    /// Text submitted to the embedding provider: title, blank line, body.
    pub fn embedding_text(&self) -> String {
        format!("{}\n\n{}", self.title, self.body)
    }
}

/// Reference to a comment the tracker created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedComment {
    pub id: u64,
    pub html_url: Option<String>,
}

/// Tracker operations consumed by the pipeline.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// List up to `limit` open issues, most recently created first.
    async fn list_open_issues(&self, repo: &RepoRef, limit: usize) -> Result<Vec<TrackerIssue>>;

    /// Post a comment on an issue. Not idempotent.
    async fn create_comment(&self, repo: &RepoRef, number: u64, body: &str)
        -> Result<CreatedComment>;

    /// Open a new issue, returning its number.
    async fn create_issue(&self, repo: &RepoRef, title: &str, body: &str) -> Result<u64>;
}

/// Resolves an installation reference to an authenticated tracker client.
#[async_trait]
pub trait TrackerConnector: Send + Sync {
    async fn connect(&self, installation_id: Option<u64>) -> Result<Arc<dyn IssueTracker>>;
}

//! In-memory [`TriageStore`] implementation for tests and demo deployments.
//!
//! All tables live behind a single `std::sync::RwLock`, so every
//! operation is atomic with respect to the others. Recency is tracked
//! by insertion sequence rather than wall-clock time, which keeps
//! ordering deterministic when several rows share a millisecond.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    DecisionLog, Issue, IssueRecord, NewSuggestion, RepoRef, SimilarLink, StoredEmbedding,
    TriageSuggestion,
};

use super::TriageStore;

struct StoredRepo {
    id: String,
    repo: RepoRef,
    installation_id: Option<u64>,
}

struct StoredVector {
    id: String,
    issue_id: String,
    vector: Vec<f32>,
    model: String,
    created_at: i64,
    seq: u64,
}

#[derive(Default)]
struct State {
    seq: u64,
    repos: Vec<StoredRepo>,
    issues: Vec<Issue>,
    embeddings: Vec<StoredVector>,
    links: HashMap<(String, String), f32>,
    suggestions: Vec<TriageSuggestion>,
    decisions: Vec<DecisionLog>,
}

impl State {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

/// In-memory store for tests and the demo server.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of issue rows.
    pub fn issue_count(&self) -> usize {
        self.state.read().unwrap().issues.len()
    }

    /// Number of embedding rows across all issues.
    pub fn embedding_count(&self) -> usize {
        self.state.read().unwrap().embeddings.len()
    }

    /// Number of similarity edges across all issues.
    pub fn link_count(&self) -> usize {
        self.state.read().unwrap().links.len()
    }

    /// Installation id recorded for a repository, if any.
    pub fn installation_id(&self, repo: &RepoRef) -> Option<u64> {
        let state = self.state.read().unwrap();
        state
            .repos
            .iter()
            .find(|r| &r.repo == repo)
            .and_then(|r| r.installation_id)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl TriageStore for InMemoryStore {
    async fn upsert_repository(
        &self,
        repo: &RepoRef,
        installation_id: Option<u64>,
    ) -> Result<String> {
        let mut state = self.state.write().unwrap();
        if let Some(existing) = state.repos.iter_mut().find(|r| &r.repo == repo) {
            if installation_id.is_some() {
                existing.installation_id = installation_id;
            }
            return Ok(existing.id.clone());
        }
        let id = Uuid::new_v4().to_string();
        state.repos.push(StoredRepo {
            id: id.clone(),
            repo: repo.clone(),
            installation_id,
        });
        Ok(id)
    }

    async fn upsert_issue(&self, repo_id: &str, issue: &IssueRecord) -> Result<Issue> {
        let mut state = self.state.write().unwrap();
        let now = now_ms();
        if let Some(existing) = state
            .issues
            .iter_mut()
            .find(|i| i.repo_id == repo_id && i.number == issue.number)
        {
            existing.title = issue.title.clone();
            existing.body = issue.body.clone();
            existing.state = issue.state.clone();
            existing.author = issue.author.clone();
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let row = Issue {
            id: Uuid::new_v4().to_string(),
            repo_id: repo_id.to_string(),
            number: issue.number,
            title: issue.title.clone(),
            body: issue.body.clone(),
            state: issue.state.clone(),
            author: issue.author.clone(),
            updated_at: now,
        };
        state.issues.push(row.clone());
        Ok(row)
    }

    async fn insert_embedding(
        &self,
        issue_id: &str,
        vector: &[f32],
        model: &str,
    ) -> Result<String> {
        let mut state = self.state.write().unwrap();
        let seq = state.next_seq();
        let id = Uuid::new_v4().to_string();
        state.embeddings.push(StoredVector {
            id: id.clone(),
            issue_id: issue_id.to_string(),
            vector: vector.to_vec(),
            model: model.to_string(),
            created_at: now_ms(),
            seq,
        });
        Ok(id)
    }

    async fn recent_embeddings(
        &self,
        exclude_issue_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredEmbedding>> {
        let state = self.state.read().unwrap();

        let mut latest: HashMap<&str, &StoredVector> = HashMap::new();
        for sv in state
            .embeddings
            .iter()
            .filter(|sv| sv.issue_id != exclude_issue_id)
        {
            let entry = latest.entry(sv.issue_id.as_str()).or_insert(sv);
            if sv.seq > entry.seq {
                *entry = sv;
            }
        }

        let mut rows: Vec<&StoredVector> = latest.into_values().collect();
        rows.sort_by(|a, b| b.seq.cmp(&a.seq));
        rows.truncate(limit);

        Ok(rows
            .into_iter()
            .filter_map(|sv| {
                let issue = state.issues.iter().find(|i| i.id == sv.issue_id)?;
                Some(StoredEmbedding {
                    id: sv.id.clone(),
                    issue_id: sv.issue_id.clone(),
                    issue_number: issue.number,
                    issue_title: issue.title.clone(),
                    vector: sv.vector.clone(),
                    model: sv.model.clone(),
                    created_at: sv.created_at,
                })
            })
            .collect())
    }

    async fn upsert_similar_link(
        &self,
        issue_id: &str,
        similar_issue_id: &str,
        score: f32,
    ) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state
            .links
            .insert((issue_id.to_string(), similar_issue_id.to_string()), score);
        Ok(())
    }

    async fn insert_suggestion(&self, suggestion: &NewSuggestion) -> Result<TriageSuggestion> {
        let mut state = self.state.write().unwrap();
        let row = TriageSuggestion {
            id: Uuid::new_v4().to_string(),
            issue_id: suggestion.issue_id.clone(),
            labels: suggestion.labels.clone(),
            assignees: suggestion.assignees.clone(),
            priority_score: suggestion.priority_score,
            confidence: suggestion.confidence.clone(),
            rationale: suggestion.rationale.clone(),
            created_at: now_ms(),
        };
        state.suggestions.push(row.clone());
        Ok(row)
    }

    async fn insert_decision_log(
        &self,
        issue_id: &str,
        action: &str,
        actor: &str,
        payload: &serde_json::Value,
    ) -> Result<DecisionLog> {
        let mut state = self.state.write().unwrap();
        let row = DecisionLog {
            id: Uuid::new_v4().to_string(),
            issue_id: issue_id.to_string(),
            action: action.to_string(),
            actor: actor.to_string(),
            payload: payload.clone(),
            created_at: now_ms(),
        };
        state.decisions.push(row.clone());
        Ok(row)
    }

    async fn find_issue_by_number(&self, number: u64) -> Result<Option<Issue>> {
        let state = self.state.read().unwrap();
        Ok(state.issues.iter().find(|i| i.number == number).cloned())
    }

    async fn latest_suggestion(&self, issue_id: &str) -> Result<Option<TriageSuggestion>> {
        let state = self.state.read().unwrap();
        // Vec order is insertion order, so the last match is the newest.
        Ok(state
            .suggestions
            .iter()
            .rev()
            .find(|s| s.issue_id == issue_id)
            .cloned())
    }

    async fn similar_links(&self, issue_id: &str) -> Result<Vec<SimilarLink>> {
        let state = self.state.read().unwrap();
        let mut links: Vec<SimilarLink> = state
            .links
            .iter()
            .filter(|((from, _), _)| from == issue_id)
            .filter_map(|((from, to), score)| {
                let similar = state.issues.iter().find(|i| &i.id == to)?;
                Some(SimilarLink {
                    issue_id: from.clone(),
                    similar_issue_id: to.clone(),
                    similar_issue_number: similar.number,
                    score: *score,
                })
            })
            .collect();
        links.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(links)
    }

    async fn decision_logs(&self, issue_id: &str) -> Result<Vec<DecisionLog>> {
        let state = self.state.read().unwrap();
        Ok(state
            .decisions
            .iter()
            .filter(|d| d.issue_id == issue_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(number: u64, title: &str) -> IssueRecord {
        IssueRecord {
            repo: RepoRef::new("acme", "widgets"),
            number,
            title: title.to_string(),
            body: String::new(),
            state: "open".to_string(),
            author: "octocat".to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_issue_is_idempotent_by_identity() {
        let store = InMemoryStore::new();
        let repo_id = store
            .upsert_repository(&RepoRef::new("acme", "widgets"), None)
            .await
            .unwrap();
        let first = store.upsert_issue(&repo_id, &record(42, "v1")).await.unwrap();
        let second = store.upsert_issue(&repo_id, &record(42, "v2")).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.issue_count(), 1);
        let found = store.find_issue_by_number(42).await.unwrap().unwrap();
        assert_eq!(found.title, "v2");
    }

    #[tokio::test]
    async fn test_repository_upsert_keeps_id_and_records_installation() {
        let store = InMemoryStore::new();
        let repo = RepoRef::new("acme", "widgets");
        let a = store.upsert_repository(&repo, None).await.unwrap();
        let b = store.upsert_repository(&repo, Some(55)).await.unwrap();
        let c = store.upsert_repository(&repo, None).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(store.installation_id(&repo), Some(55));
    }

    #[tokio::test]
    async fn test_recent_embeddings_latest_per_issue_excluding_target() {
        let store = InMemoryStore::new();
        let repo_id = store
            .upsert_repository(&RepoRef::new("acme", "widgets"), None)
            .await
            .unwrap();
        let a = store.upsert_issue(&repo_id, &record(1, "a")).await.unwrap();
        let b = store.upsert_issue(&repo_id, &record(2, "b")).await.unwrap();
        let c = store.upsert_issue(&repo_id, &record(3, "c")).await.unwrap();

        store.insert_embedding(&a.id, &[1.0, 0.0], "m").await.unwrap();
        store.insert_embedding(&b.id, &[0.0, 1.0], "m").await.unwrap();
        store.insert_embedding(&a.id, &[0.5, 0.5], "m").await.unwrap();
        store.insert_embedding(&c.id, &[9.0, 9.0], "m").await.unwrap();

        let recent = store.recent_embeddings(&c.id, 50).await.unwrap();
        let numbers: Vec<u64> = recent.iter().map(|e| e.issue_number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(recent[0].vector, vec![0.5, 0.5]);

        let limited = store.recent_embeddings(&c.id, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_similar_link_overwrites_score() {
        let store = InMemoryStore::new();
        let repo_id = store
            .upsert_repository(&RepoRef::new("acme", "widgets"), None)
            .await
            .unwrap();
        let a = store.upsert_issue(&repo_id, &record(1, "a")).await.unwrap();
        let b = store.upsert_issue(&repo_id, &record(2, "b")).await.unwrap();

        store.upsert_similar_link(&a.id, &b.id, 0.2).await.unwrap();
        store.upsert_similar_link(&a.id, &b.id, 0.8).await.unwrap();
        store.upsert_similar_link(&b.id, &a.id, 0.8).await.unwrap();

        assert_eq!(store.link_count(), 2);
        let links = store.similar_links(&a.id).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].score, 0.8);
        assert_eq!(links[0].similar_issue_number, 2);
    }

    #[tokio::test]
    async fn test_latest_suggestion_is_most_recent() {
        let store = InMemoryStore::new();
        for rationale in ["first", "second"] {
            store
                .insert_suggestion(&NewSuggestion {
                    issue_id: "i1".into(),
                    labels: vec![],
                    assignees: vec![],
                    priority_score: 0.0,
                    confidence: json!({}),
                    rationale: rationale.into(),
                })
                .await
                .unwrap();
        }
        let latest = store.latest_suggestion("i1").await.unwrap().unwrap();
        assert_eq!(latest.rationale, "second");
        assert!(store.latest_suggestion("other").await.unwrap().is_none());
    }
}

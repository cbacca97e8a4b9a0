//! Storage abstraction for the persistent-index strategy.
//!
//! The [`TriageStore`] trait defines every durable operation the pipeline
//! and the query side need, so the core has no dependency on a specific
//! storage technology. Each mutating operation is a single atomic
//! upsert or insert keyed by the entity's identity; callers are never
//! assumed to be serialized.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{
    DecisionLog, Issue, IssueRecord, NewSuggestion, RepoRef, SimilarLink, StoredEmbedding,
    TriageSuggestion,
};

/// Abstract durable store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_repository`](TriageStore::upsert_repository) | Insert or touch a repository by `(owner, repo)` |
/// | [`upsert_issue`](TriageStore::upsert_issue) | Insert or update an issue by `(repo_id, number)` |
/// | [`insert_embedding`](TriageStore::insert_embedding) | Append an embedding for an issue |
/// | [`recent_embeddings`](TriageStore::recent_embeddings) | Most recent embedding per other issue |
/// | [`upsert_similar_link`](TriageStore::upsert_similar_link) | Insert or rescore a similarity edge |
/// | [`insert_suggestion`](TriageStore::insert_suggestion) | Append a triage suggestion |
/// | [`insert_decision_log`](TriageStore::insert_decision_log) | Append an audit record |
#[async_trait]
pub trait TriageStore: Send + Sync {
    /// Returns the repository id. An existing row keeps its id; a known
    /// `installation_id` replaces the stored one.
    async fn upsert_repository(&self, repo: &RepoRef, installation_id: Option<u64>)
        -> Result<String>;

    /// Returns the issue id. Re-ingesting the same number overwrites the
    /// mutable fields and never creates a second row.
    async fn upsert_issue(&self, repo_id: &str, issue: &IssueRecord) -> Result<Issue>;

    /// Returns the new embedding id.
    async fn insert_embedding(&self, issue_id: &str, vector: &[f32], model: &str)
        -> Result<String>;

    /// The most recent embedding of each issue other than `exclude_issue_id`,
    /// newest first, at most `limit` entries.
    async fn recent_embeddings(
        &self,
        exclude_issue_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredEmbedding>>;

    async fn upsert_similar_link(
        &self,
        issue_id: &str,
        similar_issue_id: &str,
        score: f32,
    ) -> Result<()>;

    async fn insert_suggestion(&self, suggestion: &NewSuggestion) -> Result<TriageSuggestion>;

    async fn insert_decision_log(
        &self,
        issue_id: &str,
        action: &str,
        actor: &str,
        payload: &serde_json::Value,
    ) -> Result<DecisionLog>;

    /// Look up an issue by number. When several repositories share the
    /// number, the earliest-created issue wins.
    async fn find_issue_by_number(&self, number: u64) -> Result<Option<Issue>>;

    async fn latest_suggestion(&self, issue_id: &str) -> Result<Option<TriageSuggestion>>;

    /// Outgoing similarity edges, highest score first.
    async fn similar_links(&self, issue_id: &str) -> Result<Vec<SimilarLink>>;

    /// Audit trail, oldest first.
    async fn decision_logs(&self, issue_id: &str) -> Result<Vec<DecisionLog>>;
}

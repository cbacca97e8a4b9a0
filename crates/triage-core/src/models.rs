//! Core data models used throughout the triage pipeline.
//!
//! These types represent the issues, embeddings, similarity edges,
//! suggestions, and audit records that flow between the pipeline and
//! the store.

use serde::{Deserialize, Serialize};

/// Owner/name pair identifying a repository on the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// `owner/name`, as used in tracker URLs and log fields.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Canonical issue extracted from a webhook payload or a tracker listing.
///
/// Identity is `(repo, number)`; every other field is mutable and is
/// overwritten on re-ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub repo: RepoRef,
    pub number: u64,
    pub title: String,
    /// Empty when the tracker sent no body.
    pub body: String,
    pub state: String,
    /// `"unknown"` when the payload carried no author.
    pub author: String,
}

impl IssueRecord {
    /// Text submitted to the embedding provider: title, blank line, body.
    pub fn embedding_text(&self) -> String {
        format!("{}\n\n{}", self.title, self.body)
    }
}

/// A stored issue row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    pub id: String,
    pub repo_id: String,
    pub number: u64,
    pub title: String,
    pub body: String,
    pub state: String,
    pub author: String,
    /// Unix milliseconds.
    pub updated_at: i64,
}

/// A stored embedding joined with the issue it belongs to.
#[derive(Debug, Clone)]
pub struct StoredEmbedding {
    pub id: String,
    pub issue_id: String,
    pub issue_number: u64,
    pub issue_title: String,
    pub vector: Vec<f32>,
    pub model: String,
    /// Unix milliseconds.
    pub created_at: i64,
}

/// Directed similarity edge `issue_id → similar_issue_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarLink {
    pub issue_id: String,
    pub similar_issue_id: String,
    pub similar_issue_number: u64,
    pub score: f32,
}

/// Fields of a suggestion before the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSuggestion {
    pub issue_id: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub priority_score: f64,
    pub confidence: serde_json::Value,
    pub rationale: String,
}

/// A stored triage suggestion. The most recent one per issue is current.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageSuggestion {
    pub id: String,
    pub issue_id: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub priority_score: f64,
    pub confidence: serde_json::Value,
    pub rationale: String,
    /// Unix milliseconds.
    pub created_at: i64,
}

/// Immutable audit record of an action taken against a suggestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionLog {
    pub id: String,
    pub issue_id: String,
    pub action: String,
    pub actor: String,
    pub payload: serde_json::Value,
    /// Unix milliseconds.
    pub created_at: i64,
}

/// One scored candidate selected by the similarity engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    /// Store id in persistent mode; `None` for live-window candidates.
    pub issue_id: Option<String>,
    pub number: u64,
    pub title: String,
    pub score: f32,
}

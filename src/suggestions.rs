//! Query-side operations over stored suggestions.
//!
//! Issues are addressed by number alone. When the same number exists in
//! several repositories, the earliest-ingested issue answers.

use serde::Serialize;

use triage_core::models::{DecisionLog, Issue, SimilarLink, TriageSuggestion};
use triage_core::store::TriageStore;

use crate::error::{TriageError, TriageResult};

pub const APPLY_ACTION: &str = "APPLY_SUGGESTION";
pub const SYSTEM_ACTOR: &str = "system";

async fn require_issue(store: &dyn TriageStore, number: u64) -> TriageResult<Issue> {
    store
        .find_issue_by_number(number)
        .await?
        .ok_or_else(|| TriageError::NotFound(format!("issue #{} not found", number)))
}

/// The most recent suggestion for an issue, or `None` if it has none yet.
///
/// Fails with [`TriageError::NotFound`] when the issue was never ingested.
pub async fn get_current_suggestion(
    store: &dyn TriageStore,
    number: u64,
) -> TriageResult<Option<TriageSuggestion>> {
    let issue = require_issue(store, number).await?;
    Ok(store.latest_suggestion(&issue.id).await?)
}

/// Append an `APPLY_SUGGESTION` decision log holding a snapshot of the
/// current suggestion.
///
/// Nothing is changed on the tracker. Every call appends a new record.
pub async fn apply_suggestion(store: &dyn TriageStore, number: u64) -> TriageResult<DecisionLog> {
    let issue = require_issue(store, number).await?;
    let suggestion = store
        .latest_suggestion(&issue.id)
        .await?
        .ok_or_else(|| TriageError::NotFound(format!("no suggestion for issue #{}", number)))?;

    let payload = serde_json::to_value(&suggestion).map_err(anyhow::Error::from)?;
    let log = store
        .insert_decision_log(&issue.id, APPLY_ACTION, SYSTEM_ACTOR, &payload)
        .await?;
    tracing::info!(issue = number, decision = %log.id, "suggestion applied");
    Ok(log)
}

/// Everything stored about one issue, for the CLI.
#[derive(Debug, Serialize)]
pub struct IssueReport {
    pub issue: Issue,
    pub suggestion: Option<TriageSuggestion>,
    pub similar: Vec<SimilarLink>,
    pub decisions: Vec<DecisionLog>,
}

pub async fn issue_report(store: &dyn TriageStore, number: u64) -> TriageResult<IssueReport> {
    let issue = require_issue(store, number).await?;
    Ok(IssueReport {
        suggestion: store.latest_suggestion(&issue.id).await?,
        similar: store.similar_links(&issue.id).await?,
        decisions: store.decision_logs(&issue.id).await?,
        issue,
    })
}

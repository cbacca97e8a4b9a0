//! Persistent index: a growing embedding store appended to on every event.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use triage_core::embedding::EmbeddingProvider;
use triage_core::event::IssueEvent;
use triage_core::models::{Neighbor, NewSuggestion};
use triage_core::similarity::{nearest, Candidate};
use triage_core::store::TriageStore;

use super::{NeighborStrategy, TriageOutcome};
use crate::config::Mode;
use crate::error::{TriageError, TriageResult};

pub const RETRIEVAL_RATIONALE: &str = "Initial retrieval only";

pub struct PersistentIndex {
    store: Arc<dyn TriageStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    recent_limit: usize,
    top_k: usize,
}

impl PersistentIndex {
    pub fn new(
        store: Arc<dyn TriageStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        recent_limit: usize,
        top_k: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            recent_limit,
            top_k,
        }
    }
}

#[async_trait]
impl NeighborStrategy for PersistentIndex {
    fn mode(&self) -> Mode {
        Mode::Persistent
    }

    async fn process(&self, event: &IssueEvent) -> TriageResult<TriageOutcome> {
        let record = &event.issue;
        let repo_id = self
            .store
            .upsert_repository(&record.repo, event.installation_id)
            .await?;
        let issue = self.store.upsert_issue(&repo_id, record).await?;

        let vector = self
            .embedder
            .embed(&record.embedding_text())
            .await
            .map_err(|e| TriageError::external("embedding", format!("{:#}", e)))?;
        let embedding_id = self
            .store
            .insert_embedding(&issue.id, &vector, self.embedder.model_name())
            .await?;

        let candidates: Vec<Candidate<Neighbor>> = self
            .store
            .recent_embeddings(&issue.id, self.recent_limit)
            .await?
            .into_iter()
            .map(|stored| Candidate {
                item: Neighbor {
                    issue_id: Some(stored.issue_id),
                    number: stored.issue_number,
                    title: stored.issue_title,
                    score: 0.0,
                },
                vector: stored.vector,
            })
            .collect();
        debug!(issue = record.number, candidates = candidates.len(), "scoring candidates");

        // Negative scores are kept: this mode records the closest issues
        // whatever their sign.
        let neighbors: Vec<Neighbor> = nearest(&vector, &candidates, self.top_k)
            .into_iter()
            .map(|scored| Neighbor {
                score: scored.score,
                ..scored.item
            })
            .collect();

        for neighbor in &neighbors {
            if let Some(similar_id) = neighbor.issue_id.as_deref() {
                self.store
                    .upsert_similar_link(&issue.id, similar_id, neighbor.score)
                    .await?;
            }
        }

        let suggestion = self
            .store
            .insert_suggestion(&NewSuggestion {
                issue_id: issue.id.clone(),
                labels: Vec::new(),
                assignees: Vec::new(),
                priority_score: 0.0,
                confidence: json!({
                    "retrieval": {
                        "k": neighbors.len(),
                        "neighbors": neighbors
                            .iter()
                            .map(|n| json!({ "number": n.number, "score": n.score }))
                            .collect::<Vec<_>>(),
                    }
                }),
                rationale: RETRIEVAL_RATIONALE.to_string(),
            })
            .await?;

        info!(
            repo = %record.repo.full_name(),
            issue = record.number,
            neighbors = neighbors.len(),
            "indexed issue"
        );

        Ok(TriageOutcome::Indexed {
            issue_id: issue.id,
            embedding_id,
            neighbors,
            suggestion_id: suggestion.id,
        })
    }
}

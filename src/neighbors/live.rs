//! Live window: re-fetch and re-embed the tracker's recent open issues on
//! every event, then comment on the target issue. Nothing is stored.
//!
//! Each event costs one embedding call per candidate in the window. The
//! calls run with bounded concurrency; the pipeline bounds the whole event
//! with its timeout.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, info};

use triage_core::embedding::EmbeddingProvider;
use triage_core::event::IssueEvent;
use triage_core::models::Neighbor;
use triage_core::similarity::{score_all, top_k, Candidate};
use triage_core::tracker::{TrackerConnector, TrackerIssue};

use super::{NeighborStrategy, TriageOutcome};
use crate::config::Mode;
use crate::error::{TriageError, TriageResult};

pub const COMMENT_HEADER: &str = "Possibly related issues:";

pub struct LiveWindow {
    connector: Arc<dyn TrackerConnector>,
    embedder: Arc<dyn EmbeddingProvider>,
    window: usize,
    concurrency: usize,
    top_k: usize,
}

impl LiveWindow {
    pub fn new(
        connector: Arc<dyn TrackerConnector>,
        embedder: Arc<dyn EmbeddingProvider>,
        window: usize,
        concurrency: usize,
        top_k: usize,
    ) -> Self {
        Self {
            connector,
            embedder,
            window,
            concurrency: concurrency.max(1),
            top_k,
        }
    }

    async fn embed(&self, text: &str) -> TriageResult<Vec<f32>> {
        self.embedder
            .embed(text)
            .await
            .map_err(|e| TriageError::external("embedding", format!("{:#}", e)))
    }
}

/// Comment body listing each neighbor's number, title, and score.
pub fn format_comment(neighbors: &[Neighbor]) -> String {
    let mut body = String::from(COMMENT_HEADER);
    for neighbor in neighbors {
        body.push_str(&format!(
            "\n- #{} {} (similarity {:.3})",
            neighbor.number, neighbor.title, neighbor.score
        ));
    }
    body
}

#[async_trait]
impl NeighborStrategy for LiveWindow {
    fn mode(&self) -> Mode {
        Mode::Live
    }

    async fn process(&self, event: &IssueEvent) -> TriageResult<TriageOutcome> {
        let record = &event.issue;
        let tracker = self
            .connector
            .connect(event.installation_id)
            .await
            .map_err(|e| TriageError::external("tracker", format!("{:#}", e)))?;

        let open_issues = tracker
            .list_open_issues(&record.repo, self.window)
            .await
            .map_err(|e| TriageError::external("tracker", format!("{:#}", e)))?;
        let target = self.embed(&record.embedding_text()).await?;

        let window: Vec<TrackerIssue> = open_issues
            .into_iter()
            .filter(|issue| issue.number != record.number)
            .collect();
        debug!(issue = record.number, candidates = window.len(), "embedding live window");

        // buffered() keeps input order, so ties still resolve in listing order.
        let candidates: Vec<Candidate<Neighbor>> = stream::iter(window.into_iter().map(|issue| {
            let embedder = Arc::clone(&self.embedder);
            async move {
                let vector = embedder.embed(&issue.embedding_text()).await?;
                Ok::<_, anyhow::Error>(Candidate {
                    item: Neighbor {
                        issue_id: None,
                        number: issue.number,
                        title: issue.title,
                        score: 0.0,
                    },
                    vector,
                })
            }
        }))
        .buffered(self.concurrency)
        .try_collect::<Vec<_>>()
        .await
        .map_err(|e| TriageError::external("embedding", format!("{:#}", e)))?;

        let positive: Vec<_> = score_all(&target, &candidates)
            .into_iter()
            .filter(|scored| scored.score > 0.0)
            .collect();
        let neighbors: Vec<Neighbor> = top_k(positive, self.top_k)
            .into_iter()
            .map(|scored| Neighbor {
                score: scored.score,
                ..scored.item
            })
            .collect();

        if neighbors.is_empty() {
            info!(
                repo = %record.repo.full_name(),
                issue = record.number,
                "no related issues above zero similarity"
            );
            return Ok(TriageOutcome::Commented {
                neighbors,
                comment: None,
            });
        }

        let comment = tracker
            .create_comment(&record.repo, record.number, &format_comment(&neighbors))
            .await
            .map_err(|e| TriageError::external("tracker", format!("{:#}", e)))?;
        info!(
            repo = %record.repo.full_name(),
            issue = record.number,
            neighbors = neighbors.len(),
            comment_id = comment.id,
            "posted related-issues comment"
        );

        Ok(TriageOutcome::Commented {
            neighbors,
            comment: Some(comment),
        })
    }
}

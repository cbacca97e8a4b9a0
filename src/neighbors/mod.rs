//! Neighbor sources: where candidate issues and their vectors come from.
//!
//! The operating mode is resolved once at startup into one
//! [`NeighborStrategy`] object and handed to the pipeline:
//!
//! | Mode | Strategy | Effect |
//! |------|----------|--------|
//! | `persistent` | [`PersistentIndex`] | Store rows: issue, embedding, links, suggestion |
//! | `live` | [`LiveWindow`] | One tracker comment; nothing stored |

pub mod live;
pub mod persistent;

use async_trait::async_trait;
use serde::Serialize;

use triage_core::event::IssueEvent;
use triage_core::models::Neighbor;
use triage_core::tracker::CreatedComment;

use crate::config::Mode;
use crate::error::TriageResult;

pub use live::LiveWindow;
pub use persistent::PersistentIndex;

/// Result of running one qualifying event through a strategy.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TriageOutcome {
    Indexed {
        issue_id: String,
        embedding_id: String,
        neighbors: Vec<Neighbor>,
        suggestion_id: String,
    },
    Commented {
        neighbors: Vec<Neighbor>,
        /// `None` when no candidate scored above zero.
        comment: Option<CreatedComment>,
    },
}

impl TriageOutcome {
    pub fn neighbors(&self) -> &[Neighbor] {
        match self {
            TriageOutcome::Indexed { neighbors, .. } | TriageOutcome::Commented { neighbors, .. } => {
                neighbors
            }
        }
    }
}

#[async_trait]
pub trait NeighborStrategy: Send + Sync {
    fn mode(&self) -> Mode;

    /// Embed the event's issue, score it against this strategy's
    /// candidates, and apply the strategy's effect.
    async fn process(&self, event: &IssueEvent) -> TriageResult<TriageOutcome>;
}

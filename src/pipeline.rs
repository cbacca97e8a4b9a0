//! Webhook delivery pipeline.
//!
//! ```text
//! verify_signature → normalize → NeighborStrategy::process (under timeout)
//! ```
//!
//! Only a bad signature is reported to the caller. Ignored events and
//! processing failures are acknowledged the same way as successes, so a
//! sender cannot observe internal state; failures are logged.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use triage_core::event::{normalize, IgnoreReason, IssueEvent, WebhookEvent};
use triage_core::store::TriageStore;
use triage_core::tracker::TrackerConnector;

use crate::config::{Config, Mode};
use crate::embedding::create_provider;
use crate::error::{TriageError, TriageResult};
use crate::github::StaticTokenConnector;
use crate::neighbors::{LiveWindow, NeighborStrategy, PersistentIndex, TriageOutcome};
use crate::signature::verify_signature;

/// What happened to an authenticated delivery.
#[derive(Debug)]
pub enum DeliveryOutcome {
    Processed(TriageOutcome),
    Ignored(IgnoreReason),
    /// Processing started and failed; the delivery is still acknowledged.
    Failed(TriageError),
}

pub struct Pipeline {
    secret: Option<String>,
    strategy: Arc<dyn NeighborStrategy>,
    event_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        secret: Option<String>,
        strategy: Arc<dyn NeighborStrategy>,
        event_timeout: Duration,
    ) -> Self {
        Self {
            secret,
            strategy,
            event_timeout,
        }
    }

    pub fn mode(&self) -> Mode {
        self.strategy.mode()
    }

    pub fn is_trust_mode(&self) -> bool {
        self.secret.is_none()
    }

    /// Authenticate, normalize, and process one webhook delivery.
    ///
    /// Returns `Err` only for [`TriageError::Authentication`]; nothing
    /// downstream runs in that case.
    pub async fn handle_delivery(
        &self,
        event_type: &str,
        signature: Option<&str>,
        body: &[u8],
    ) -> TriageResult<DeliveryOutcome> {
        verify_signature(self.secret.as_deref(), body, signature)?;

        let event = match normalize(event_type, body) {
            WebhookEvent::Issue(event) => event,
            WebhookEvent::Ignored(reason) => {
                debug!(event_type, %reason, "ignoring delivery");
                return Ok(DeliveryOutcome::Ignored(reason));
            }
        };

        match self.ingest(&event).await {
            Ok(outcome) => Ok(DeliveryOutcome::Processed(outcome)),
            Err(err) => {
                error!(
                    repo = %event.issue.repo.full_name(),
                    issue = event.issue.number,
                    action = event.action.as_str(),
                    error = %err,
                    "triage failed"
                );
                Ok(DeliveryOutcome::Failed(err))
            }
        }
    }

    /// Run a normalized event through the strategy under the event timeout.
    pub async fn ingest(&self, event: &IssueEvent) -> TriageResult<TriageOutcome> {
        info!(
            repo = %event.issue.repo.full_name(),
            issue = event.issue.number,
            action = event.action.as_str(),
            mode = self.mode().as_str(),
            "processing issue event"
        );
        tokio::time::timeout(self.event_timeout, self.strategy.process(event))
            .await
            .map_err(|_| {
                TriageError::Timeout(format!(
                    "issue #{} not processed within {}s",
                    event.issue.number,
                    self.event_timeout.as_secs()
                ))
            })?
    }
}

/// Resolve the configured mode into a strategy and build the pipeline.
///
/// `store` is required in persistent mode and ignored in live mode.
pub fn build_pipeline(config: &Config, store: Option<Arc<dyn TriageStore>>) -> Result<Pipeline> {
    let embedder = create_provider(&config.embedding)?;

    let strategy: Arc<dyn NeighborStrategy> = match config.pipeline.mode {
        Mode::Persistent => {
            let store =
                store.ok_or_else(|| anyhow::anyhow!("persistent mode requires a database"))?;
            Arc::new(PersistentIndex::new(
                store,
                embedder,
                config.retrieval.recent_limit,
                config.retrieval.top_k,
            ))
        }
        Mode::Live => {
            let connector: Arc<dyn TrackerConnector> =
                Arc::new(StaticTokenConnector::from_config(&config.github)?);
            Arc::new(LiveWindow::new(
                connector,
                embedder,
                config.live.window,
                config.live.concurrency,
                config.retrieval.top_k,
            ))
        }
    };

    if config.webhook.secret.is_none() {
        warn!("no webhook secret configured: every delivery is accepted without verification");
    }

    Ok(Pipeline::new(
        config.webhook.secret.clone(),
        strategy,
        Duration::from_secs(config.pipeline.event_timeout_secs),
    ))
}

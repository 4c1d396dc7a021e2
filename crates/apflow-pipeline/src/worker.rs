// SPDX-FileCopyrightText: 2026 Apflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue consumers that drive the stages.
//!
//! A [`StageWorker`] dequeues one entry at a time, hands the payload to its
//! [`StageHandler`] and acks on `Ok`. On `Err` the entry is settled by the
//! kind of failure:
//!
//! - validation and serialization failures go straight to the poison queue
//! - an open circuit defers the entry until the breaker admits a trial,
//!   without spending a delivery
//! - anything else is hidden for an exponential backoff and redelivered
//!
//! Cancellation is checked between entries, so an in-flight entry is always
//! finished before the worker stops.

use std::sync::Arc;
use std::time::Duration;

use apflow_core::types::QueueEntry;
use apflow_core::{
    ApflowError, EnrichedInvoice, Envelope, IngestTrigger, NotificationMessage, RawMail,
};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::PipelineContext;
use crate::outcome::StageOutcome;
use crate::stages;

/// Consumes one queue's payloads.
#[async_trait]
pub trait StageHandler: Send + Sync {
    /// Stage name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Queue this handler consumes.
    fn queue(&self) -> &'static str;

    async fn handle(
        &self,
        ctx: &PipelineContext,
        payload: &str,
    ) -> Result<StageOutcome, ApflowError>;
}

/// `ingest-triggers` -> ingest run.
pub struct IngestHandler;

/// `raw-mail` -> enrich.
pub struct EnrichHandler;

/// `enriched-invoices` -> post.
pub struct PostHandler;

/// `notifications` -> notify.
pub struct NotifyHandler;

#[async_trait]
impl StageHandler for IngestHandler {
    fn name(&self) -> &'static str {
        "ingest"
    }

    fn queue(&self) -> &'static str {
        IngestTrigger::QUEUE
    }

    async fn handle(
        &self,
        ctx: &PipelineContext,
        payload: &str,
    ) -> Result<StageOutcome, ApflowError> {
        let trigger = IngestTrigger::from_json(payload)?;
        debug!(source = %trigger.source, "ingest triggered");
        stages::run_ingest(ctx).await?;
        Ok(StageOutcome::Processed)
    }
}

#[async_trait]
impl StageHandler for EnrichHandler {
    fn name(&self) -> &'static str {
        "enrich"
    }

    fn queue(&self) -> &'static str {
        RawMail::QUEUE
    }

    async fn handle(
        &self,
        ctx: &PipelineContext,
        payload: &str,
    ) -> Result<StageOutcome, ApflowError> {
        let raw = RawMail::from_json(payload)?;
        stages::enrich(ctx, &raw).await
    }
}

#[async_trait]
impl StageHandler for PostHandler {
    fn name(&self) -> &'static str {
        "post"
    }

    fn queue(&self) -> &'static str {
        EnrichedInvoice::QUEUE
    }

    async fn handle(
        &self,
        ctx: &PipelineContext,
        payload: &str,
    ) -> Result<StageOutcome, ApflowError> {
        let invoice = EnrichedInvoice::from_json(payload)?;
        stages::post(ctx, &invoice).await
    }
}

#[async_trait]
impl StageHandler for NotifyHandler {
    fn name(&self) -> &'static str {
        "notify"
    }

    fn queue(&self) -> &'static str {
        NotificationMessage::QUEUE
    }

    async fn handle(
        &self,
        ctx: &PipelineContext,
        payload: &str,
    ) -> Result<StageOutcome, ApflowError> {
        let message = match NotificationMessage::from_json(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping malformed notification");
                return Ok(StageOutcome::Failed(e.to_string()));
            }
        };
        Ok(stages::notify(ctx, &message).await)
    }
}

/// Handlers for every queue-driven stage.
pub fn all_handlers() -> Vec<Arc<dyn StageHandler>> {
    vec![
        Arc::new(IngestHandler),
        Arc::new(EnrichHandler),
        Arc::new(PostHandler),
        Arc::new(NotifyHandler),
    ]
}

pub struct StageWorker {
    ctx: Arc<PipelineContext>,
    handler: Arc<dyn StageHandler>,
    poll_interval: Duration,
}

impl StageWorker {
    pub fn new(
        ctx: Arc<PipelineContext>,
        handler: Arc<dyn StageHandler>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            ctx,
            handler,
            poll_interval,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.handler.name()
    }

    /// Process the next visible entry, if any.
    ///
    /// Returns `Ok(None)` when the queue is empty. A handler error is not
    /// returned: the entry is settled and reported as [`StageOutcome::Failed`].
    pub async fn process_next(&self) -> Result<Option<StageOutcome>, ApflowError> {
        let queue = self.handler.queue();
        let Some(entry) = self
            .ctx
            .queue
            .dequeue(queue, self.ctx.settings.visibility_timeout)
            .await?
        else {
            return Ok(None);
        };

        let stage = self.handler.name();
        match self.handler.handle(&self.ctx, &entry.payload).await {
            Ok(outcome) => {
                self.ctx.queue.ack(entry.id).await?;
                debug!(stage, entry_id = entry.id, %outcome, "entry processed");
                metrics::counter!(
                    "apflow_stage_outcomes_total",
                    "stage" => stage,
                    "outcome" => outcome.to_string()
                )
                .increment(1);
                Ok(Some(outcome))
            }
            Err(e) => {
                metrics::counter!("apflow_stage_failures_total", "stage" => stage).increment(1);
                self.settle_failure(&entry, &e).await?;
                Ok(Some(StageOutcome::Failed(e.to_string())))
            }
        }
    }

    async fn settle_failure(
        &self,
        entry: &QueueEntry,
        error: &ApflowError,
    ) -> Result<(), ApflowError> {
        let stage = self.handler.name();
        let reason = error.to_string();
        match error {
            ApflowError::Validation(_) | ApflowError::Serialization { .. } => {
                warn!(
                    stage,
                    entry_id = entry.id,
                    error = %error,
                    "entry rejected, moving to poison queue"
                );
                self.ctx.queue.poison(entry.id, &reason).await
            }
            ApflowError::CircuitOpen { dependency } => {
                let delay = self
                    .ctx
                    .breakers
                    .get(dependency)
                    .and_then(|breaker| breaker.retry_after())
                    .unwrap_or(self.ctx.settings.redelivery_delay);
                info!(
                    stage,
                    entry_id = entry.id,
                    dependency = %dependency,
                    delay_secs = delay.as_secs(),
                    "circuit open, deferring entry"
                );
                self.ctx.queue.defer(entry.id, &reason, delay).await
            }
            _ => {
                let delay = self.ctx.settings.redelivery_backoff(entry.dequeue_count);
                warn!(
                    stage,
                    entry_id = entry.id,
                    delivery = entry.dequeue_count,
                    max_deliveries = entry.max_deliveries,
                    delay_secs = delay.as_secs(),
                    error = %error,
                    "stage failed, entry will be redelivered"
                );
                self.ctx.queue.release(entry.id, &reason, delay).await
            }
        }
    }

    /// Process entries until the queue has nothing visible.
    pub async fn drain(&self) -> Result<Vec<StageOutcome>, ApflowError> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.process_next().await? {
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Poll until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let stage = self.handler.name();
        info!(stage, queue = self.handler.queue(), "stage worker started");

        while !cancel.is_cancelled() {
            let idle = match self.process_next().await {
                Ok(Some(_)) => false,
                Ok(None) => true,
                Err(e) => {
                    warn!(stage, error = %e, "queue unavailable");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }

        info!(stage, "stage worker stopped");
    }
}

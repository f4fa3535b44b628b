use std::fmt;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::PipelineError;
use crate::models::Entity;

// ============================================================================
// Outcome Sinks
// ============================================================================
//
// Terminal handlers for the pipeline. Every dispatched event ends in exactly
// one call: on_success with the persisted entity, or on_error with a
// description of what failed.
//
// ============================================================================

/// A failed event, as reported to the error sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingFailure {
    pub correlation_id: Uuid,
    pub payload: String,
    pub error: PipelineError,
    pub attempts: u32,
}

impl fmt::Display for ProcessingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error processing event '{}': {}", self.payload, self.error)
    }
}

pub trait OutcomeSink: Send + Sync {
    fn on_success(&self, entity: &Entity);

    fn on_error(&self, failure: &ProcessingFailure);
}

/// Logs every outcome
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSink;

impl OutcomeSink for LoggingSink {
    fn on_success(&self, entity: &Entity) {
        tracing::info!(entity_id = ?entity.id, "Processed entity: {}", entity);
    }

    fn on_error(&self, failure: &ProcessingFailure) {
        tracing::error!(
            correlation_id = %failure.correlation_id,
            stage = failure.error.label(),
            attempts = failure.attempts,
            "{}",
            failure
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Processed(Entity),
    Failed(ProcessingFailure),
}

/// Forwards outcomes into a channel, for callers that consume results
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Outcome>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl OutcomeSink for ChannelSink {
    fn on_success(&self, entity: &Entity) {
        if self.tx.send(Outcome::Processed(entity.clone())).is_err() {
            tracing::debug!("Outcome receiver dropped");
        }
    }

    fn on_error(&self, failure: &ProcessingFailure) {
        if self.tx.send(Outcome::Failed(failure.clone())).is_err() {
            tracing::debug!("Outcome receiver dropped");
        }
    }
}

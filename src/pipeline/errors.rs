use std::time::Duration;

use crate::storage::StorageError;
use crate::utils::IsTransient;

// ============================================================================
// Pipeline Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid Event: payload is empty")]
    Empty,

    #[error("Invalid Event: payload is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
}

/// Why a single event's chain ended early
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Processing timed out after {0:?}")]
    Timeout(Duration),

    #[error("Processing task panicked: {0}")]
    TaskPanicked(String),
}

impl PipelineError {
    /// Label used for the failure metric
    pub fn label(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validate",
            PipelineError::Storage(_) => "persist",
            PipelineError::Timeout(_) => "timeout",
            PipelineError::TaskPanicked(_) => "panic",
        }
    }
}

impl IsTransient for PipelineError {
    fn is_transient(&self) -> bool {
        match self {
            PipelineError::Storage(e) => e.is_transient(),
            // A timed-out save may already have landed
            PipelineError::Validation(_) | PipelineError::Timeout(_) | PipelineError::TaskPanicked(_) => {
                false
            }
        }
    }
}

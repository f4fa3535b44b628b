use crate::utils::IsTransient;

// ============================================================================
// Storage Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("Storage capacity exhausted ({capacity} entities)")]
    CapacityExhausted { capacity: usize },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl IsTransient for StorageError {
    fn is_transient(&self) -> bool {
        matches!(self, StorageError::Backend(_))
    }
}

// ============================================================================
// Event Bus Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("Event bus buffer is full (capacity {capacity})")]
    Overflow { capacity: usize },
}

impl BusError {
    /// Label used for the rejection metric
    pub fn reason(&self) -> &'static str {
        match self {
            BusError::Closed => "closed",
            BusError::Overflow { .. } => "overflow",
        }
    }
}

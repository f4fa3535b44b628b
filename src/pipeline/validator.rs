use super::ValidationError;
use crate::models::{Event, ValidatedEvent};

/// Stage 1: rejects malformed events before they enter the pipeline
#[derive(Debug, Clone, Default)]
pub struct EventValidator {
    max_payload_bytes: Option<usize>,
}

impl EventValidator {
    pub fn new(max_payload_bytes: Option<usize>) -> Self {
        Self { max_payload_bytes }
    }

    pub fn validate(&self, event: Event) -> Result<ValidatedEvent, ValidationError> {
        if event.payload.is_empty() {
            return Err(ValidationError::Empty);
        }

        if let Some(limit) = self.max_payload_bytes {
            let size = event.payload.len();
            if size > limit {
                return Err(ValidationError::TooLarge { size, limit });
            }
        }

        Ok(ValidatedEvent::new(event.payload))
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Data Models
// ============================================================================
//
// Event            - raw text payload travelling through the bus
// ValidatedEvent   - payload that passed the validator (never empty)
// Entity           - domain record produced by the mapper and persisted
//
// ============================================================================

/// Identity assigned to an entity by the persistence stage
pub type EntityId = u64;

/// A raw event as published by a producer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub payload: String,
    pub published_at: DateTime<Utc>,
}

impl Event {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            published_at: Utc::now(),
        }
    }
}

impl From<&str> for Event {
    fn from(payload: &str) -> Self {
        Event::new(payload)
    }
}

impl From<String> for Event {
    fn from(payload: String) -> Self {
        Event::new(payload)
    }
}

/// An event that passed validation.
///
/// Only the validator can build one, so holding a `ValidatedEvent`
/// guarantees a non-empty payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedEvent {
    payload: String,
}

impl ValidatedEvent {
    pub(crate) fn new(payload: String) -> Self {
        debug_assert!(!payload.is_empty());
        Self { payload }
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn into_payload(self) -> String {
        self.payload
    }
}

/// Domain record persisted by the pipeline
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Entity {
    pub id: Option<EntityId>,
    pub data: String,
}

impl Entity {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            id: None,
            data: data.into(),
        }
    }

    pub fn with_id(mut self, id: EntityId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "Entity{{id={}, data='{}'}}", id, self.data),
            None => write!(f, "Entity{{id=null, data='{}'}}", self.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_display() {
        let entity = Entity::new("Event 1").with_id(1);
        assert_eq!(entity.to_string(), "Entity{id=1, data='Event 1'}");

        let unsaved = Entity::new("Event 2");
        assert_eq!(unsaved.to_string(), "Entity{id=null, data='Event 2'}");
        assert!(!unsaved.is_persisted());
    }

    #[test]
    fn test_entity_serializes_to_json() {
        let entity = Entity::new("hello").with_id(7);
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["data"], "hello");
    }
}

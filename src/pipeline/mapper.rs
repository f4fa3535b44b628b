use crate::models::{Entity, ValidatedEvent};

/// Stage 2: turns a validated event into an unsaved entity
#[derive(Debug, Clone, Copy, Default)]
pub struct EventMapper;

impl EventMapper {
    pub fn map_to_entity(&self, event: ValidatedEvent) -> Entity {
        Entity::new(event.into_payload())
    }
}

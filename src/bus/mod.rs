// ============================================================================
// Event Bus Module
// ============================================================================
//
// In-memory multicast bus decoupling producers from the pipeline.
//
// - event_bus/ - publish/subscribe with a backlog for the next subscriber
// - errors/    - errors reported synchronously to producers
//
// ============================================================================

mod errors;
mod event_bus;

pub use errors::BusError;
pub use event_bus::{BufferPolicy, EventBus, EventStream};

// ============================================================================
// Pipeline Module - validate → map → persist
// ============================================================================
//
// Stages, leaves first:
// - validator/   - rejects empty or oversized payloads
// - mapper/      - builds an unsaved Entity from a validated event
// - persistence/ - assigns identity and stores through an EntityRepository
//
// Orchestration:
// - processor/   - subscribes to the bus and runs one task per event
// - sink/        - terminal success/error handlers
//
// ============================================================================

mod errors;
mod mapper;
mod persistence;
mod processor;
mod sink;
mod validator;

pub use errors::{PipelineError, ValidationError};
pub use mapper::EventMapper;
pub use persistence::EventPersistence;
pub use processor::{EventProcessor, PipelineState, MAX_IN_FLIGHT_LIMIT};
pub use sink::{ChannelSink, LoggingSink, Outcome, OutcomeSink, ProcessingFailure};
pub use validator::EventValidator;

// ============================================================================
// sink_bus
// ============================================================================
//
// In-process publish/subscribe event bus feeding an asynchronous
// validate → map → persist pipeline.
//
//   Producer ──publish──> EventBus ══multicast══> EventProcessor
//                                                   │ one task per event
//                                                   ├─ EventValidator
//                                                   ├─ EventMapper
//                                                   └─ EventPersistence ──> EntityRepository
//                                                        │
//                                                   OutcomeSink (success / error)
//
// ============================================================================

pub mod app;
pub mod bus;
pub mod config;
pub mod health;
pub mod http;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod storage;
pub mod utils;

pub use app::App;
pub use bus::{BufferPolicy, BusError, EventBus, EventStream};
pub use config::{AppConfig, ConfigError};
pub use models::{Entity, EntityId, Event, ValidatedEvent};
pub use pipeline::{
    ChannelSink, EventMapper, EventPersistence, EventProcessor, EventValidator, LoggingSink,
    Outcome, OutcomeSink, PipelineError, PipelineState, ProcessingFailure, ValidationError,
};
pub use storage::{EntityRepository, InMemoryEntityRepository, StorageError};

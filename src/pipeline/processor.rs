use futures_util::{FutureExt, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{
    EventMapper, EventPersistence, EventValidator, OutcomeSink, PipelineError, ProcessingFailure,
};
use crate::bus::{EventBus, EventStream};
use crate::config::PipelineConfig;
use crate::metrics::Metrics;
use crate::models::{Entity, Event};
use crate::utils::{retry_on_transient, RetryConfig, RetryResult};

// ============================================================================
// Event Processor - validate → map → persist over the bus stream
// ============================================================================
//
// Dispatcher:
//   one subscription, pulled in publish order. Each event becomes its own
//   task, so a slow or failing event never holds back the next one.
//   At most `max_in_flight` tasks run at once; when all permits are taken
//   the dispatcher stops pulling and events wait in the bus buffer.
//
// Per-event task:
//   validate → map → persist, optionally retried (transient errors only)
//   and bounded by a deadline. The outcome goes to the sink exactly once;
//   errors and panics end that event only.
//
// Lifecycle:
//   NotStarted → Running on the first start_processing(). Later calls are
//   no-ops. The dispatcher exits once the bus is closed and in-flight
//   events have finished.
//
// ============================================================================

/// Largest accepted `max_in_flight`; the drain acquires all permits in one
/// `acquire_many`, which takes a u32
pub const MAX_IN_FLIGHT_LIMIT: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    NotStarted,
    Running,
}

#[derive(Clone)]
struct Stages {
    validator: EventValidator,
    mapper: EventMapper,
    persistence: EventPersistence,
    sink: Arc<dyn OutcomeSink>,
    retry: RetryConfig,
    timeout: Option<Duration>,
    metrics: Option<Arc<Metrics>>,
}

pub struct EventProcessor {
    bus: EventBus,
    stages: Stages,
    max_in_flight: usize,
    started: AtomicBool,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl EventProcessor {
    pub fn new(
        bus: EventBus,
        persistence: EventPersistence,
        sink: Arc<dyn OutcomeSink>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            bus,
            stages: Stages {
                validator: EventValidator::new(config.max_payload_bytes),
                mapper: EventMapper,
                persistence,
                sink,
                retry: config.retry.clone(),
                timeout: config.stage_timeout(),
                metrics: None,
            },
            max_in_flight: config.max_in_flight.clamp(1, MAX_IN_FLIGHT_LIMIT),
            started: AtomicBool::new(false),
            dispatcher: Mutex::new(None),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.stages.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> PipelineState {
        if self.started.load(Ordering::SeqCst) {
            PipelineState::Running
        } else {
            PipelineState::NotStarted
        }
    }

    /// Subscribe to the bus and start dispatching events.
    ///
    /// Returns `true` if this call started the pipeline. Must be called
    /// from within a tokio runtime.
    pub fn start_processing(&self) -> bool {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("Pipeline already running, ignoring start request");
            return false;
        }

        let stream = self.bus.subscribe();
        let stages = Arc::new(self.stages.clone());
        let handle = tokio::spawn(dispatch(stream, stages, self.max_in_flight));

        *self.dispatcher.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);

        tracing::info!(max_in_flight = self.max_in_flight, "Event pipeline started");
        true
    }

    /// Wait for the dispatcher to finish. It finishes only after the bus is
    /// closed and every in-flight event has reached its sink.
    pub async fn wait(&self) {
        let handle = self.dispatcher.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Pipeline dispatcher terminated abnormally");
            }
        }
    }
}

async fn dispatch(mut stream: EventStream, stages: Arc<Stages>, max_in_flight: usize) {
    let permits = Arc::new(Semaphore::new(max_in_flight));

    while let Some(event) = stream.next().await {
        let permit = match permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let stages = stages.clone();
        tokio::spawn(async move {
            stages.process(event).await;
            drop(permit);
        });
    }

    // Every in-flight task holds one permit
    let total = u32::try_from(max_in_flight).unwrap_or(u32::MAX);
    if let Ok(all) = permits.acquire_many(total).await {
        drop(all);
    }
    tracing::info!("Event stream ended, pipeline drained");
}

impl Stages {
    async fn process(&self, event: Event) {
        let correlation_id = Uuid::new_v4();
        let payload = event.payload.clone();
        let started = Instant::now();
        let attempts = AtomicU32::new(0);

        let _in_flight = InFlightGuard::enter(self.metrics.clone());
        tracing::debug!(
            correlation_id = %correlation_id,
            published_at = %event.published_at,
            "Dispatching event"
        );

        let chain = AssertUnwindSafe(self.run_with_policies(&event, correlation_id, &attempts));
        let result = match chain.catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(PipelineError::TaskPanicked(panic_message(panic))),
        };

        let elapsed = started.elapsed().as_secs_f64();
        match result {
            Ok(entity) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_outcome(None, elapsed);
                }
                self.sink.on_success(&entity);
            }
            Err(error) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_outcome(Some(error.label()), elapsed);
                }
                self.sink.on_error(&ProcessingFailure {
                    correlation_id,
                    payload,
                    error,
                    attempts: attempts.load(Ordering::SeqCst),
                });
            }
        }
    }

    /// The chain with retry around it and the deadline around both
    async fn run_with_policies(
        &self,
        event: &Event,
        correlation_id: Uuid,
        attempts: &AtomicU32,
    ) -> Result<Entity, PipelineError> {
        let retried = retry_on_transient(&self.retry, |attempt| {
            attempts.store(attempt, Ordering::SeqCst);
            if attempt > 1 {
                if let Some(metrics) = &self.metrics {
                    metrics.record_retry_attempt();
                }
            }
            self.run_chain(event.clone(), correlation_id)
        });

        let outcome: RetryResult<Entity, PipelineError> = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, retried).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(PipelineError::Timeout(limit)),
            },
            None => retried.await,
        };

        outcome.into_result()
    }

    async fn run_chain(&self, event: Event, correlation_id: Uuid) -> Result<Entity, PipelineError> {
        let validated = self.validator.validate(event)?;
        tracing::debug!(correlation_id = %correlation_id, "Event validated");

        let entity = self.mapper.map_to_entity(validated);

        let saved = self.persistence.persist(entity).await?;
        tracing::debug!(
            correlation_id = %correlation_id,
            entity_id = ?saved.id,
            "Entity persisted"
        );

        Ok(saved)
    }
}

/// Holds the in-flight gauge up for one event, including when a sink panics
struct InFlightGuard(Option<Arc<Metrics>>);

impl InFlightGuard {
    fn enter(metrics: Option<Arc<Metrics>>) -> Self {
        if let Some(metrics) = &metrics {
            metrics.in_flight.inc();
        }
        Self(metrics)
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(metrics) = &self.0 {
            metrics.in_flight.dec();
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

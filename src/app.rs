use std::sync::Arc;

use crate::bus::{BusError, EventBus};
use crate::config::AppConfig;
use crate::health::{system_health, SystemHealth};
use crate::metrics::Metrics;
use crate::pipeline::{EventPersistence, EventProcessor, LoggingSink, OutcomeSink};
use crate::storage::{EntityRepository, InMemoryEntityRepository};

// ============================================================================
// Application Wiring
// ============================================================================
//
//   Metrics ──┬──> EventBus ──> EventProcessor ──> OutcomeSink
//             └──> EventPersistence ──> InMemoryEntityRepository
//
// Everything is built once, from AppConfig, at process start.
//
// ============================================================================

pub struct App {
    pub config: AppConfig,
    pub metrics: Arc<Metrics>,
    pub bus: EventBus,
    pub repository: Arc<dyn EntityRepository>,
    pub processor: Arc<EventProcessor>,
}

impl App {
    /// Wire the application with the logging sink
    pub fn from_config(config: AppConfig) -> prometheus::Result<Self> {
        Self::with_sink(config, Arc::new(LoggingSink))
    }

    pub fn with_sink(config: AppConfig, sink: Arc<dyn OutcomeSink>) -> prometheus::Result<Self> {
        let metrics = Arc::new(Metrics::new()?);

        let bus = EventBus::with_metrics(config.bus.buffer, metrics.clone());

        let repository: Arc<dyn EntityRepository> =
            Arc::new(InMemoryEntityRepository::new(config.storage.max_entities));
        let persistence = EventPersistence::new(repository.clone()).with_metrics(metrics.clone());

        let processor = EventProcessor::new(bus.clone(), persistence, sink, &config.pipeline)
            .with_metrics(metrics.clone());

        Ok(Self {
            config,
            metrics,
            bus,
            repository,
            processor: Arc::new(processor),
        })
    }

    pub fn start(&self) -> bool {
        self.processor.start_processing()
    }

    /// Publish the configured startup events
    pub fn publish_samples(&self) -> Result<usize, BusError> {
        tracing::info!("Publishing events...");
        for event in &self.config.sample_events {
            self.bus.publish(event.as_str())?;
        }
        tracing::info!(count = self.config.sample_events.len(), "Events published.");
        Ok(self.config.sample_events.len())
    }

    pub fn health(&self) -> SystemHealth {
        system_health(&self.bus, &self.processor)
    }

    /// Close the bus and wait for in-flight events to finish
    pub async fn shutdown(&self) {
        self.bus.close();
        self.processor.wait().await;
        tracing::info!(stored = self.repository.len(), "Shutdown complete");
    }
}

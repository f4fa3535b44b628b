use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Event bus throughput, rejections and backlog
// - Pipeline outcomes, latency and in-flight work
// - Retry attempts
// - Stored entity count
//
// All metrics are registered with one Registry and scraped via /metrics
// ============================================================================

/// Central metrics registry for the bus and pipeline
pub struct Metrics {
    registry: Registry,

    // Bus Metrics
    pub bus_events_published: IntCounter,
    pub bus_events_rejected: IntCounterVec,
    pub bus_backlog: IntGauge,

    // Pipeline Metrics
    pub events_processed: IntCounter,
    pub events_failed: IntCounterVec,
    pub processing_duration: Histogram,
    pub in_flight: IntGauge,
    pub retry_attempts: IntCounter,

    // Storage Metrics
    pub entities_stored: IntGauge,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let bus_events_published = IntCounter::new(
            "bus_events_published_total",
            "Total events accepted by the event bus",
        )?;
        registry.register(Box::new(bus_events_published.clone()))?;

        let bus_events_rejected = IntCounterVec::new(
            Opts::new("bus_events_rejected_total", "Total events rejected at publish time"),
            &["reason"],
        )?;
        registry.register(Box::new(bus_events_rejected.clone()))?;

        let bus_backlog = IntGauge::new(
            "bus_backlog_events",
            "Events buffered while no subscriber is attached",
        )?;
        registry.register(Box::new(bus_backlog.clone()))?;

        let events_processed = IntCounter::new(
            "pipeline_events_processed_total",
            "Total events that completed validate, map and persist",
        )?;
        registry.register(Box::new(events_processed.clone()))?;

        let events_failed = IntCounterVec::new(
            Opts::new("pipeline_events_failed_total", "Total events that failed processing"),
            &["stage"],
        )?;
        registry.register(Box::new(events_failed.clone()))?;

        let processing_duration = Histogram::with_opts(
            HistogramOpts::new(
                "pipeline_processing_duration_seconds",
                "Time from dispatch to terminal outcome",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(processing_duration.clone()))?;

        let in_flight = IntGauge::new(
            "pipeline_in_flight_events",
            "Events currently being processed",
        )?;
        registry.register(Box::new(in_flight.clone()))?;

        let retry_attempts = IntCounter::new(
            "pipeline_retry_attempts_total",
            "Total processing attempts beyond the first",
        )?;
        registry.register(Box::new(retry_attempts.clone()))?;

        let entities_stored = IntGauge::new(
            "storage_entities_total",
            "Entities held by the persistence store",
        )?;
        registry.register(Box::new(entities_stored.clone()))?;

        Ok(Self {
            registry,
            bus_events_published,
            bus_events_rejected,
            bus_backlog,
            events_processed,
            events_failed,
            processing_duration,
            in_flight,
            retry_attempts,
            entities_stored,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_published(&self, backlog_len: usize) {
        self.bus_events_published.inc();
        self.bus_backlog.set(backlog_len as i64);
    }

    pub fn record_rejected(&self, reason: &str) {
        self.bus_events_rejected.with_label_values(&[reason]).inc();
    }

    pub fn set_backlog(&self, backlog_len: usize) {
        self.bus_backlog.set(backlog_len as i64);
    }

    /// Helper to record a terminal pipeline outcome
    pub fn record_outcome(&self, failed_stage: Option<&str>, duration_secs: f64) {
        match failed_stage {
            None => self.events_processed.inc(),
            Some(stage) => self.events_failed.with_label_values(&[stage]).inc(),
        }
        self.processing_duration.observe(duration_secs);
    }

    pub fn record_retry_attempt(&self) {
        self.retry_attempts.inc();
    }

    pub fn set_entities_stored(&self, count: usize) {
        self.entities_stored.set(count as i64);
    }
}

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bus::EventBus;
use crate::pipeline::{EventProcessor, PipelineState};

// ============================================================================
// Health Reporting
// ============================================================================
//
// Each component reports a status; the system status is the worst of them.
//
// bus      - Unhealthy once closed, Degraded while events wait in the backlog
// pipeline - Unhealthy until start_processing() has been called
//
// ============================================================================

/// Health status of a component
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Health information for a component
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    pub details: Option<String>,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            last_check: Utc::now(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: Vec<ComponentHealth>,
    pub check_time: DateTime<Utc>,
}

pub fn bus_health(bus: &EventBus) -> ComponentHealth {
    let backlog = bus.backlog_len();
    let subscribers = bus.subscriber_count();

    let status = if bus.is_closed() {
        HealthStatus::Unhealthy("Event bus closed".to_string())
    } else if backlog > 0 {
        HealthStatus::Degraded(format!("{} events waiting for a subscriber", backlog))
    } else {
        HealthStatus::Healthy
    };

    ComponentHealth::new("event_bus", status)
        .with_details(format!("subscribers={}, backlog={}", subscribers, backlog))
}

pub fn pipeline_health(processor: &EventProcessor) -> ComponentHealth {
    match processor.state() {
        PipelineState::Running => ComponentHealth::new("pipeline", HealthStatus::Healthy),
        PipelineState::NotStarted => ComponentHealth::new(
            "pipeline",
            HealthStatus::Unhealthy("Pipeline not started".to_string()),
        ),
    }
}

pub fn compute_overall_status(components: &[ComponentHealth]) -> HealthStatus {
    let mut degraded = Vec::new();
    let mut unhealthy = Vec::new();

    for health in components {
        match &health.status {
            HealthStatus::Unhealthy(msg) => unhealthy.push(format!("{}: {}", health.name, msg)),
            HealthStatus::Degraded(msg) => degraded.push(format!("{}: {}", health.name, msg)),
            HealthStatus::Healthy => {}
        }
    }

    if !unhealthy.is_empty() {
        HealthStatus::Unhealthy(unhealthy.join(", "))
    } else if !degraded.is_empty() {
        HealthStatus::Degraded(degraded.join(", "))
    } else {
        HealthStatus::Healthy
    }
}

pub fn system_health(bus: &EventBus, processor: &EventProcessor) -> SystemHealth {
    let components = vec![bus_health(bus), pipeline_health(processor)];
    SystemHealth {
        overall_status: compute_overall_status(&components),
        components,
        check_time: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_status_is_worst_component() {
        let components = vec![
            ComponentHealth::new("a", HealthStatus::Healthy),
            ComponentHealth::new("b", HealthStatus::Degraded("slow".into())),
        ];
        assert_eq!(
            compute_overall_status(&components),
            HealthStatus::Degraded("b: slow".into())
        );

        let components = vec![
            ComponentHealth::new("b", HealthStatus::Degraded("slow".into())),
            ComponentHealth::new("c", HealthStatus::Unhealthy("down".into())),
        ];
        assert_eq!(
            compute_overall_status(&components),
            HealthStatus::Unhealthy("c: down".into())
        );
        assert!(compute_overall_status(&[]).is_healthy());
    }

    #[test]
    fn test_bus_health_transitions() {
        let bus = EventBus::default();
        assert!(bus_health(&bus).status.is_healthy());

        bus.publish("waiting").unwrap();
        assert!(matches!(bus_health(&bus).status, HealthStatus::Degraded(_)));

        bus.close();
        assert!(matches!(bus_health(&bus).status, HealthStatus::Unhealthy(_)));
    }

    #[test]
    fn test_status_serializes_with_reason() {
        let json = serde_json::to_value(HealthStatus::Degraded("x".into())).unwrap();
        assert_eq!(json, serde_json::json!({"status": "degraded", "reason": "x"}));
    }
}

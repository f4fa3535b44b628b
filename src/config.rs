use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::bus::BufferPolicy;
use crate::pipeline::MAX_IN_FLIGHT_LIMIT;
use crate::utils::RetryConfig;

// ============================================================================
// Application Configuration
// ============================================================================
//
// Resolution order:
//   1. built-in defaults
//   2. TOML file named by SINK_BUS_CONFIG (optional)
//   3. SINK_BUS_* environment overrides
//
// Defaults reproduce the reference behaviour: unbounded bus buffer, no
// retries, no timeouts, no storage limit.
//
// ============================================================================

pub const CONFIG_PATH_ENV: &str = "SINK_BUS_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bus: BusConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
    pub http: HttpConfig,
    /// Events published by the binary right after startup
    pub sample_events: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            pipeline: PipelineConfig::default(),
            storage: StorageConfig::default(),
            http: HttpConfig::default(),
            sample_events: vec![
                "Event 1".to_string(),
                "Event 2".to_string(),
                "Event 3".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub buffer: BufferPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on events processed at the same time
    pub max_in_flight: usize,
    /// Per-event deadline for the whole validate, map, persist chain
    pub stage_timeout_ms: Option<u64>,
    pub max_payload_bytes: Option<usize>,
    pub retry: RetryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 256,
            stage_timeout_ms: None,
            max_payload_bytes: None,
            retry: RetryConfig::disabled(),
        }
    }
}

impl PipelineConfig {
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub max_entities: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Load from the optional config file, then apply environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply SINK_BUS_* overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("SINK_BUS_BUFFER_CAPACITY") {
            self.bus.buffer = if value.eq_ignore_ascii_case("unbounded") {
                BufferPolicy::Unbounded
            } else {
                BufferPolicy::Bounded {
                    capacity: parse("SINK_BUS_BUFFER_CAPACITY", &value)?,
                }
            };
        }
        if let Some(value) = lookup("SINK_BUS_MAX_IN_FLIGHT") {
            self.pipeline.max_in_flight = parse("SINK_BUS_MAX_IN_FLIGHT", &value)?;
        }
        if let Some(value) = lookup("SINK_BUS_STAGE_TIMEOUT_MS") {
            self.pipeline.stage_timeout_ms = Some(parse("SINK_BUS_STAGE_TIMEOUT_MS", &value)?);
        }
        if let Some(value) = lookup("SINK_BUS_MAX_PAYLOAD_BYTES") {
            self.pipeline.max_payload_bytes = Some(parse("SINK_BUS_MAX_PAYLOAD_BYTES", &value)?);
        }
        if let Some(value) = lookup("SINK_BUS_RETRY_PRESET") {
            self.pipeline.retry = match value.trim().to_ascii_lowercase().as_str() {
                "disabled" => RetryConfig::disabled(),
                "default" => RetryConfig::default(),
                "aggressive" => RetryConfig::aggressive(),
                "conservative" => RetryConfig::conservative(),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "SINK_BUS_RETRY_PRESET",
                        value,
                    })
                }
            };
        }
        if let Some(value) = lookup("SINK_BUS_RETRY_ATTEMPTS") {
            self.pipeline.retry.max_attempts = parse("SINK_BUS_RETRY_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("SINK_BUS_MAX_ENTITIES") {
            self.storage.max_entities = Some(parse("SINK_BUS_MAX_ENTITIES", &value)?);
        }
        if let Some(value) = lookup("SINK_BUS_HTTP_PORT") {
            self.http.port = parse("SINK_BUS_HTTP_PORT", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let BufferPolicy::Bounded { capacity: 0 } = self.bus.buffer {
            return Err(ConfigError::Invalid("bus buffer capacity must be at least 1".into()));
        }
        if self.pipeline.max_in_flight == 0 {
            return Err(ConfigError::Invalid("max_in_flight must be at least 1".into()));
        }
        if self.pipeline.max_in_flight > MAX_IN_FLIGHT_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_in_flight must be at most {}",
                MAX_IN_FLIGHT_LIMIT
            )));
        }
        if self.pipeline.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.pipeline.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid("retry.multiplier must be >= 1.0".into()));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_reference_behaviour() {
        let config = AppConfig::default();
        assert_eq!(config.bus.buffer, BufferPolicy::Unbounded);
        assert_eq!(config.pipeline.max_in_flight, 256);
        assert!(!config.pipeline.retry.is_enabled());
        assert_eq!(config.pipeline.stage_timeout(), None);
        assert_eq!(config.sample_events, vec!["Event 1", "Event 2", "Event 3"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            sample_events = []

            [bus.buffer]
            kind = "bounded"
            capacity = 64

            [pipeline]
            stage_timeout_ms = 250

            [pipeline.retry]
            max_attempts = 4
            initial_delay = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.bus.buffer, BufferPolicy::Bounded { capacity: 64 });
        assert_eq!(config.pipeline.stage_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.pipeline.retry.max_attempts, 4);
        assert_eq!(config.pipeline.retry.initial_delay, Duration::from_millis(10));
        assert_eq!(config.pipeline.max_in_flight, 256);
        assert!(config.sample_events.is_empty());
        assert_eq!(config.http, HttpConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SINK_BUS_BUFFER_CAPACITY", "128"),
            ("SINK_BUS_RETRY_PRESET", "conservative"),
            ("SINK_BUS_RETRY_ATTEMPTS", "3"),
            ("SINK_BUS_MAX_ENTITIES", "10"),
            ("SINK_BUS_HTTP_PORT", "9999"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.bus.buffer, BufferPolicy::Bounded { capacity: 128 });
        // The preset applies first, then the explicit attempt count
        assert_eq!(config.pipeline.retry.initial_delay, RetryConfig::conservative().initial_delay);
        assert_eq!(config.pipeline.retry.max_attempts, 3);
        assert_eq!(config.storage.max_entities, Some(10));
        assert_eq!(config.http.port, 9999);
    }

    #[test]
    fn test_bad_env_value_is_reported() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(|key| (key == "SINK_BUS_MAX_IN_FLIGHT").then(|| "lots".to_string()))
            .unwrap_err();

        assert!(matches!(err, ConfigError::InvalidValue { key: "SINK_BUS_MAX_IN_FLIGHT", .. }));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = AppConfig::default();
        config.bus.buffer = BufferPolicy::Bounded { capacity: 0 };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_oversized_in_flight_limit() {
        let mut config = AppConfig::default();
        config.pipeline.max_in_flight = MAX_IN_FLIGHT_LIMIT;
        assert!(config.validate().is_ok());

        config.pipeline.max_in_flight = MAX_IN_FLIGHT_LIMIT + 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}

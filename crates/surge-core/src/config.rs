//! surge.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::duration::parse_duration;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid duration for `{field}`: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurgeConfig {
    pub store: StoreConfig,
    pub engine: EngineConfig,
    pub fleet: FleetConfig,
    pub forecast: ForecastConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interval between policy evaluation sweeps.
    pub evaluation_interval: String,
    /// Upper bound on a single fleet-resize attempt.
    pub resize_timeout: String,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff: String,
    pub max_backoff: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Fleet size the simulated controller starts with.
    pub initial_size: u32,
    pub launch_delay: String,
    pub drain_delay: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub history_window: String,
    pub cache_ttl: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// JSON telemetry snapshot maintained by an external agent.
    pub telemetry_file: PathBuf,
    /// How long raw samples are kept in the time-series store.
    pub retention: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/surge"),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            evaluation_interval: "2m".to_string(),
            resize_timeout: "5m".to_string(),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: "1s".to_string(),
            max_backoff: "30s".to_string(),
        }
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            initial_size: 2,
            launch_delay: "30s".to_string(),
            drain_delay: "10s".to_string(),
        }
    }
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            history_window: "7d".to_string(),
            cache_ttl: "1h".to_string(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            telemetry_file: PathBuf::from("/var/run/surge/telemetry.json"),
            retention: "7d".to_string(),
        }
    }
}

impl SurgeConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: SurgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The default document written by `surged init-config`.
    pub fn scaffold() -> Self {
        Self::default()
    }

    /// Check that every duration field parses and the retry budget is sane.
    pub fn validate(&self) -> ConfigResult<()> {
        self.evaluation_interval()?;
        self.resize_timeout()?;
        self.initial_backoff()?;
        self.max_backoff()?;
        self.launch_delay()?;
        self.drain_delay()?;
        self.history_window()?;
        self.cache_ttl()?;
        self.retention()?;
        if self.engine.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "engine.retry.max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.evaluation_interval()?.is_zero() {
            return Err(ConfigError::Invalid {
                field: "engine.evaluation_interval",
                reason: "must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn evaluation_interval(&self) -> ConfigResult<Duration> {
        resolve("engine.evaluation_interval", &self.engine.evaluation_interval)
    }

    pub fn resize_timeout(&self) -> ConfigResult<Duration> {
        resolve("engine.resize_timeout", &self.engine.resize_timeout)
    }

    pub fn initial_backoff(&self) -> ConfigResult<Duration> {
        resolve("engine.retry.initial_backoff", &self.engine.retry.initial_backoff)
    }

    pub fn max_backoff(&self) -> ConfigResult<Duration> {
        resolve("engine.retry.max_backoff", &self.engine.retry.max_backoff)
    }

    pub fn launch_delay(&self) -> ConfigResult<Duration> {
        resolve("fleet.launch_delay", &self.fleet.launch_delay)
    }

    pub fn drain_delay(&self) -> ConfigResult<Duration> {
        resolve("fleet.drain_delay", &self.fleet.drain_delay)
    }

    pub fn history_window(&self) -> ConfigResult<Duration> {
        resolve("forecast.history_window", &self.forecast.history_window)
    }

    pub fn cache_ttl(&self) -> ConfigResult<Duration> {
        resolve("forecast.cache_ttl", &self.forecast.cache_ttl)
    }

    pub fn retention(&self) -> ConfigResult<Duration> {
        resolve("metrics.retention", &self.metrics.retention)
    }
}

fn resolve(field: &'static str, value: &str) -> ConfigResult<Duration> {
    parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaffold_roundtrip() {
        let config = SurgeConfig::scaffold();
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("evaluation_interval"));

        let parsed = SurgeConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config = SurgeConfig::from_toml_str("").unwrap();
        assert_eq!(config.evaluation_interval().unwrap(), Duration::from_secs(120));
        assert_eq!(config.cache_ttl().unwrap(), Duration::from_secs(3600));
        assert_eq!(config.history_window().unwrap(), Duration::from_secs(7 * 86_400));
        assert_eq!(config.fleet.initial_size, 2);
    }

    #[test]
    fn test_parse_partial_section() {
        let toml_str = r#"
[engine]
evaluation_interval = "30s"

[engine.retry]
max_attempts = 5
"#;
        let config = SurgeConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.evaluation_interval().unwrap(), Duration::from_secs(30));
        assert_eq!(config.engine.retry.max_attempts, 5);
        // Untouched fields keep their defaults.
        assert_eq!(config.initial_backoff().unwrap(), Duration::from_secs(1));
        assert_eq!(config.resize_timeout().unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let toml_str = r#"
[forecast]
cache_ttl = "an hour"
"#;
        let err = SurgeConfig::from_toml_str(toml_str).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidDuration { field: "forecast.cache_ttl", .. }
        ));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let toml_str = r#"
[engine.retry]
max_attempts = 0
"#;
        let err = SurgeConfig::from_toml_str(toml_str).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("surge.toml");
        std::fs::write(&path, "[fleet]\ninitial_size = 4\n").unwrap();

        let config = SurgeConfig::from_file(&path).unwrap();
        assert_eq!(config.fleet.initial_size, 4);

        let missing = SurgeConfig::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}

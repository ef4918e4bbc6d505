use crate::error::{ConfigError, ConfigErrorCode};
use crate::retry::RetryPolicy;
use crate::timeout::TimeoutConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level runtime configuration, layered from defaults, an optional project config
/// file, and `STEPRT__`-prefixed environment variables (highest priority).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub state: StateBackendConfig,

    #[serde(default)]
    pub steps: StepsConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub timeout: TimeoutConfigSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            state: StateBackendConfig::default(),
            steps: StepsConfig::default(),
            retry: RetryConfig::default(),
            timeout: TimeoutConfigSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError {
            code: ConfigErrorCode::FileNotFound,
            message: format!("failed to read config file: {e}"),
            field: Some(path.display().to_string()),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError {
            code: ConfigErrorCode::ParseError,
            message: format!("failed to parse TOML: {e}"),
            field: None,
        })
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError {
            code: ConfigErrorCode::FileNotFound,
            message: format!("failed to read config file: {e}"),
            field: Some(path.display().to_string()),
        })?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError {
            code: ConfigErrorCode::ParseError,
            message: format!("failed to parse YAML: {e}"),
            field: None,
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");

        match extension {
            "toml" => Self::from_toml_file(path),
            "yaml" | "yml" => Self::from_yaml_file(path),
            _ => Err(ConfigError {
                code: ConfigErrorCode::ParseError,
                message: format!("unsupported file extension '{extension}'. Use .toml, .yaml, or .yml"),
                field: Some(path.display().to_string()),
            }),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let settings = config::Config::builder().add_source(
            config::Environment::with_prefix("STEPRT")
                .separator("__")
                .try_parsing(true),
        );

        settings.build().and_then(|c| c.try_deserialize()).map_err(|e| ConfigError {
            code: ConfigErrorCode::ParseError,
            message: format!("failed to parse environment config: {e}"),
            field: None,
        })
    }

    /// Layer: built-in defaults, then an optional project config file, then
    /// `STEPRT__`-prefixed environment variables (highest priority).
    pub fn from_sources<P: AsRef<Path>>(file_path: Option<P>) -> Result<Self, ConfigError> {
        let mut settings = config::Config::builder();

        settings = settings.add_source(config::Config::try_from(&Self::default()).map_err(|e| ConfigError {
            code: ConfigErrorCode::ParseError,
            message: format!("failed to seed config defaults: {e}"),
            field: None,
        })?);

        if let Some(path) = file_path {
            let path_str = path.as_ref().display().to_string();
            settings = settings.add_source(config::File::with_name(&path_str).required(false));
        }

        settings = settings.add_source(
            config::Environment::with_prefix("STEPRT")
                .separator("__")
                .try_parsing(true),
        );

        settings.build().and_then(|c| c.try_deserialize()).map_err(|e| ConfigError {
            code: ConfigErrorCode::ParseError,
            message: format!("failed to build config: {e}"),
            field: None,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.state.validate()?;
        self.retry.validate()?;
        self.timeout.validate()?;
        Ok(())
    }
}

/// State backend adapter selection, per §6's `adapter: memory|file|remote` contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateAdapter {
    Memory,
    File,
    Remote,
}

impl Default for StateAdapter {
    fn default() -> Self {
        StateAdapter::Memory
    }
}

/// State backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateBackendConfig {
    #[serde(default)]
    pub adapter: StateAdapter,

    /// File adapter only.
    pub path: Option<String>,

    /// Remote adapter only.
    pub host: Option<String>,
    pub port: Option<u16>,
    pub password: Option<String>,
    pub db: Option<u32>,
    pub ttl: Option<u64>,
}

impl Default for StateBackendConfig {
    fn default() -> Self {
        Self {
            adapter: StateAdapter::Memory,
            path: None,
            host: None,
            port: None,
            password: None,
            db: None,
            ttl: None,
        }
    }
}

impl StateBackendConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.adapter {
            StateAdapter::File if self.path.is_none() => Err(ConfigError {
                code: ConfigErrorCode::MissingRequiredField,
                message: "state.path is required when adapter = file".to_string(),
                field: Some("state.path".to_string()),
            }),
            StateAdapter::Remote if self.host.is_none() || self.port.is_none() => Err(ConfigError {
                code: ConfigErrorCode::MissingRequiredField,
                message: "state.host and state.port are required when adapter = remote".to_string(),
                field: Some("state.host".to_string()),
            }),
            _ => Ok(()),
        }
    }
}

/// Step discovery and runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepsConfig {
    /// Directory scanned for `*.step.<ext>` files.
    #[serde(default = "default_steps_dir")]
    pub directory: String,

    /// Directory holding the per-language runner bridge scripts.
    #[serde(default = "default_runners_dir")]
    pub runners_directory: String,

    /// Maximum number of concurrently running worker invocations.
    pub max_concurrent_workers: Option<usize>,
}

fn default_steps_dir() -> String {
    "steps".to_string()
}

fn default_runners_dir() -> String {
    "runners".to_string()
}

impl Default for StepsConfig {
    fn default() -> Self {
        Self {
            directory: default_steps_dir(),
            runners_directory: default_runners_dir(),
            max_concurrent_workers: None,
        }
    }
}

/// Retry policy declared at the config level. Carried for forward compatibility with an
/// outer scheduler; the core executor itself never re-invokes a failed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    100
}
fn default_max_delay_ms() -> u64 {
    30000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_jitter_factor() -> f64 {
    0.1
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.backoff_multiplier < 1.0 {
            return Err(ConfigError {
                code: ConfigErrorCode::InvalidValue,
                message: "backoff multiplier must be >= 1.0".to_string(),
                field: Some("retry.backoff_multiplier".to_string()),
            });
        }

        if self.jitter_factor < 0.0 || self.jitter_factor > 1.0 {
            return Err(ConfigError {
                code: ConfigErrorCode::InvalidValue,
                message: "jitter factor must be between 0.0 and 1.0".to_string(),
                field: Some("retry.jitter_factor".to_string()),
            });
        }

        Ok(())
    }

    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter_factor: self.jitter_factor,
            max_total_duration: None,
        }
    }
}

/// Timeout configuration settings. Not applied by the executor itself (§5); a reusable
/// helper (`timeout.rs`) is exposed for hosts that want to wrap an executor call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfigSettings {
    pub total_ms: Option<u64>,
    pub first_response_ms: Option<u64>,
}

impl Default for TimeoutConfigSettings {
    fn default() -> Self {
        Self {
            total_ms: None,
            first_response_ms: None,
        }
    }
}

impl TimeoutConfigSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    pub fn to_config(&self) -> TimeoutConfig {
        TimeoutConfig {
            total: self.total_ms.map(Duration::from_millis),
            first_response: self.first_response_ms.map(Duration::from_millis),
        }
    }
}

/// Structured logging configuration: level filter and output shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit newline-delimited JSON records instead of human-readable pretty output.
    #[serde(default)]
    pub json_format: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.logging.level, "info");
        assert!(matches!(config.state.adapter, StateAdapter::Memory));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = RuntimeConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("max_attempts"));

        let parsed: RuntimeConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.retry.max_attempts, config.retry.max_attempts);
    }

    #[test]
    fn test_toml_deserialization_with_overrides() {
        let toml_str = r#"
            [state]
            adapter = "file"
            path = "./data/state.json"

            [retry]
            max_attempts = 5

            [logging]
            level = "debug"
        "#;

        let config: RuntimeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.state.path.as_deref(), Some("./data/state.json"));
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = RuntimeConfig::default();
        let yaml_str = serde_yaml::to_string(&config).unwrap();
        let parsed: RuntimeConfig = serde_yaml::from_str(&yaml_str).unwrap();
        assert_eq!(parsed.steps.directory, config.steps.directory);
    }

    #[test]
    fn test_file_adapter_requires_path() {
        let config = StateBackendConfig {
            adapter: StateAdapter::File,
            path: None,
            ..StateBackendConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_remote_adapter_requires_host_and_port() {
        let config = StateBackendConfig {
            adapter: StateAdapter::Remote,
            host: Some("localhost".to_string()),
            port: None,
            ..StateBackendConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_config_to_policy() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay_ms: 200,
            max_delay_ms: 60000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
        };

        let policy = config.to_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_delay, Duration::from_millis(200));
    }

    #[test]
    fn test_validation_invalid_jitter() {
        let mut config = RetryConfig::default();
        config.jitter_factor = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_config_conversion() {
        let settings = TimeoutConfigSettings {
            total_ms: Some(5000),
            first_response_ms: Some(1000),
        };

        let timeout = settings.to_config();
        assert_eq!(timeout.total, Some(Duration::from_millis(5000)));
        assert_eq!(timeout.first_response, Some(Duration::from_millis(1000)));
    }
}

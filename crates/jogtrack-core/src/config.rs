//! Engine configuration.
//!
//! Loaded from `config.toml` in the platform config directory
//! (`~/.config/jogtrack/config.toml` on Linux). Every section and field is
//! optional; missing values fall back to the defaults below.
//!
//! ```toml
//! [api]
//! base_url = "http://localhost:5000/api"
//! request_timeout_secs = 10
//!
//! [location]
//! high_accuracy = true
//! max_sample_age_ms = 1000
//! wait_timeout_ms = 20000
//!
//! [events]
//! channel_capacity = 100
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::events::{DEFAULT_CHANNEL_CAPACITY, EventDispatcher};
use crate::provider::WatchOptions;
use crate::util::normalize_base_url;

/// Engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend API settings.
    pub api: ApiConfig,
    /// Location provider settings.
    pub location: LocationConfig,
    /// Event channel settings.
    pub events: EventsConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    ///
    /// # Example
    ///
    /// ```
    /// use jogtrack_core::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.api.validate());
        errors.extend(self.location.validate());
        errors.extend(self.events.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Backend API settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API root including the path prefix.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl ApiConfig {
    /// Validate API settings.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if normalize_base_url(&self.base_url).is_none() {
            errors.push(ValidationError {
                field: "api.base_url".to_string(),
                message: format!(
                    "must start with http:// or https://, got '{}'",
                    self.base_url
                ),
            });
        }
        if !(1..=300).contains(&self.request_timeout_secs) {
            errors.push(ValidationError {
                field: "api.request_timeout_secs".to_string(),
                message: format!(
                    "must be between 1 and 300 seconds, got {}",
                    self.request_timeout_secs
                ),
            });
        }
        errors
    }

    /// Request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Build an HTTP client for these settings.
    #[cfg(feature = "api-client")]
    pub fn client(
        &self,
    ) -> Result<crate::api_client::SessionApiClient, crate::error::BackendError> {
        crate::api_client::SessionApiClient::with_timeout(&self.base_url, self.request_timeout())
    }
}

/// Location provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Start watches in high accuracy. When false, watches start in low
    /// accuracy and have no fallback left.
    pub high_accuracy: bool,
    /// Oldest cached fix the provider may return, in milliseconds.
    pub max_sample_age_ms: u64,
    /// How long the provider waits for a fix, in milliseconds.
    pub wait_timeout_ms: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            max_sample_age_ms: 1000,
            wait_timeout_ms: 20_000,
        }
    }
}

impl LocationConfig {
    /// Validate location settings.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.wait_timeout_ms == 0 {
            errors.push(ValidationError {
                field: "location.wait_timeout_ms".to_string(),
                message: "must be greater than 0".to_string(),
            });
        } else if self.wait_timeout_ms > 600_000 {
            errors.push(ValidationError {
                field: "location.wait_timeout_ms".to_string(),
                message: format!(
                    "must be at most 600000 (10 minutes), got {}",
                    self.wait_timeout_ms
                ),
            });
        }
        if self.max_sample_age_ms > 3_600_000 {
            errors.push(ValidationError {
                field: "location.max_sample_age_ms".to_string(),
                message: format!(
                    "must be at most 3600000 (1 hour), got {}",
                    self.max_sample_age_ms
                ),
            });
        }
        errors
    }

    /// Provider options for these settings.
    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            high_accuracy: self.high_accuracy,
            max_sample_age: Duration::from_millis(self.max_sample_age_ms),
            wait_timeout: Duration::from_millis(self.wait_timeout_ms),
        }
    }
}

/// Event channel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast channel capacity; slower receivers lag past this.
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl EventsConfig {
    /// Validate event settings.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if !(1..=10_000).contains(&self.channel_capacity) {
            errors.push(ValidationError {
                field: "events.channel_capacity".to_string(),
                message: format!(
                    "must be between 1 and 10000, got {}",
                    self.channel_capacity
                ),
            });
        }
        errors
    }

    /// A dispatcher with the configured capacity.
    pub fn dispatcher<E: Clone>(&self) -> EventDispatcher<E> {
        EventDispatcher::new(self.channel_capacity)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field path (e.g., `api.base_url`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("jogtrack")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "http://localhost:5000/api");
        assert_eq!(config.api.request_timeout_secs, 10);
        assert!(config.location.high_accuracy);
        assert_eq!(config.location.max_sample_age_ms, 1000);
        assert_eq!(config.location.wait_timeout_ms, 20_000);
        assert_eq!(config.events.channel_capacity, 100);
    }

    #[test]
    fn test_default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_watch_options_from_config() {
        let options = LocationConfig::default().watch_options();
        assert_eq!(options, WatchOptions::default());

        let config = LocationConfig {
            high_accuracy: false,
            max_sample_age_ms: 0,
            wait_timeout_ms: 5000,
        };
        let options = config.watch_options();
        assert!(!options.high_accuracy);
        assert_eq!(options.max_sample_age, Duration::ZERO);
        assert_eq!(options.wait_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml = r#"
            [location]
            high_accuracy = false
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(!config.location.high_accuracy);
        assert_eq!(config.location.wait_timeout_ms, 20_000);
        assert_eq!(config.api, ApiConfig::default());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let config = Config {
            api: ApiConfig {
                base_url: "https://runs.example.com/api".to_string(),
                request_timeout_secs: 30,
            },
            location: LocationConfig {
                high_accuracy: false,
                max_sample_age_ms: 500,
                wait_timeout_ms: 15_000,
            },
            events: EventsConfig {
                channel_capacity: 32,
            },
        };

        config.save(&config_path).unwrap();
        let loaded = Config::load_validated(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let config = Config {
            api: ApiConfig {
                base_url: "localhost:5000".to_string(),
                request_timeout_secs: 0,
            },
            location: LocationConfig {
                wait_timeout_ms: 0,
                ..Default::default()
            },
            events: EventsConfig {
                channel_capacity: 0,
            },
        };

        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation errors");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            [
                "api.base_url",
                "api.request_timeout_secs",
                "location.wait_timeout_ms",
                "events.channel_capacity"
            ]
        );
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = ConfigError::Validation(vec![ValidationError {
            field: "api.base_url".to_string(),
            message: "must start with http:// or https://".to_string(),
        }]);
        let display = err.to_string();
        assert!(display.contains("Configuration validation failed"));
        assert!(display.contains("  - api.base_url: must start with http:// or https://"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("jogtrack/config.toml"));
    }

    #[cfg(feature = "api-client")]
    #[test]
    fn test_api_config_builds_client() {
        let client = ApiConfig::default().client().unwrap();
        assert_eq!(client.base_url(), "http://localhost:5000/api");
    }
}

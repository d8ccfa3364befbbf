//! Server configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thingstore_history::{DEFAULT_CURSOR_LIFESPAN, DEFAULT_LIMIT, History};
use thingstore_store::BackendKind;

use crate::filter::FiltersConfig;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage settings.
    pub storage: StorageConfig,
    /// Cursor and query settings.
    pub history: HistoryConfig,
    /// Background recording settings.
    pub recorder: RecorderConfig,
    /// Which messages are recorded.
    pub filters: FiltersConfig,
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

    /// Validate the configuration and return all errors found.
    ///
    /// This checks:
    /// - The storage backend is known and has a path if it needs one
    /// - Cursor lifespan and sweep interval are within 1s - 1 hour
    /// - The default query limit is within bounds
    /// - The recorder has a queue and at least one worker
    /// - Filter lists contain no empty entries
    ///
    /// # Example
    ///
    /// ```
    /// use thingstore_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.storage.validate());
        errors.extend(self.history.validate());
        errors.extend(self.recorder.validate());
        errors.extend(self.filters.validate());

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

    /// Open the configured backend and build a history engine on top of it.
    pub fn open_history(&self) -> thingstore_store::Result<History> {
        let backend = thingstore_store::open_backend(&self.storage.backend, &self.storage.path)?;
        Ok(History::new(backend)
            .with_cursor_lifespan(self.history.cursor_lifespan())
            .with_default_limit(self.history.default_limit))
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend identifier (`sqlite` or `memory`).
    pub backend: String,
    /// Database file path, used by persistent backends.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Sqlite.as_str().to_string(),
            path: thingstore_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        match self.backend.parse::<BackendKind>() {
            Ok(BackendKind::Sqlite) if self.path.as_os_str().is_empty() => {
                errors.push(ValidationError {
                    field: "storage.path".to_string(),
                    message: "database path cannot be empty".to_string(),
                });
            }
            Ok(_) => {}
            Err(_) => {
                errors.push(ValidationError {
                    field: "storage.backend".to_string(),
                    message: format!(
                        "unknown backend '{}': expected 'sqlite' or 'memory'",
                        self.backend
                    ),
                });
            }
        }

        errors
    }
}

/// Minimum cursor lifespan and sweep interval in seconds.
pub const MIN_INTERVAL_SECS: u64 = 1;
/// Maximum cursor lifespan and sweep interval in seconds (1 hour).
pub const MAX_INTERVAL_SECS: u64 = 3600;
/// Largest accepted default query limit.
pub const MAX_DEFAULT_LIMIT: usize = 100_000;

/// Cursor and query configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Seconds an unused cursor survives.
    pub cursor_lifespan_secs: u64,
    /// Seconds between sweeps for expired cursors.
    pub sweep_interval_secs: u64,
    /// Batch size used when a caller passes `limit <= 0`.
    pub default_limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            cursor_lifespan_secs: DEFAULT_CURSOR_LIFESPAN.as_secs(),
            sweep_interval_secs: 30,
            default_limit: DEFAULT_LIMIT,
        }
    }
}

impl HistoryConfig {
    pub fn cursor_lifespan(&self) -> Duration {
        Duration::from_secs(self.cursor_lifespan_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Validate history configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (field, value) in [
            ("history.cursor_lifespan_secs", self.cursor_lifespan_secs),
            ("history.sweep_interval_secs", self.sweep_interval_secs),
        ] {
            if value < MIN_INTERVAL_SECS {
                errors.push(ValidationError {
                    field: field.to_string(),
                    message: format!(
                        "{} is too short (minimum {} second)",
                        value, MIN_INTERVAL_SECS
                    ),
                });
            } else if value > MAX_INTERVAL_SECS {
                errors.push(ValidationError {
                    field: field.to_string(),
                    message: format!(
                        "{} is too long (maximum {} seconds / 1 hour)",
                        value, MAX_INTERVAL_SECS
                    ),
                });
            }
        }

        if self.default_limit == 0 || self.default_limit > MAX_DEFAULT_LIMIT {
            errors.push(ValidationError {
                field: "history.default_limit".to_string(),
                message: format!(
                    "default limit {} out of range (1-{})",
                    self.default_limit, MAX_DEFAULT_LIMIT
                ),
            });
        }

        errors
    }
}

/// Largest accepted recorder worker count.
pub const MAX_WORKERS: usize = 64;

/// Background recorder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Values that may wait for a worker before new ones are dropped.
    pub queue_capacity: usize,
    /// Number of worker tasks storing values.
    pub workers: usize,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            workers: 2,
        }
    }
}

impl RecorderConfig {
    /// Validate recorder configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.queue_capacity == 0 {
            errors.push(ValidationError {
                field: "recorder.queue_capacity".to_string(),
                message: "queue capacity must be at least 1".to_string(),
            });
        }
        if self.workers == 0 || self.workers > MAX_WORKERS {
            errors.push(ValidationError {
                field: "recorder.workers".to_string(),
                message: format!(
                    "worker count {} out of range (1-{})",
                    self.workers, MAX_WORKERS
                ),
            });
        }

        errors
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
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `storage.backend` or `filters.requests.include_names[0]`).
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
        .join("thingstore")
        .join("server.toml")
}

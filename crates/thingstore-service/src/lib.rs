//! Hosting layer for the thingstore history engine.
//!
//! This crate provides:
//! - Configuration loaded from `~/.config/thingstore/server.toml`
//! - Filters selecting which notifications and requests are recorded
//! - A background recorder storing selected messages without blocking publishers
//! - A serde request/response surface over every history query
//! - A periodic sweep of abandoned cursors
//! - A newline-delimited JSON session used by the `thingstore serve` command
//!
//! # Configuration
//!
//! ```toml
//! [storage]
//! backend = "sqlite"
//! path = "~/.local/share/thingstore/history.db"
//!
//! [history]
//! cursor_lifespan_secs = 60
//! sweep_interval_secs = 30
//! default_limit = 1000
//!
//! [recorder]
//! queue_capacity = 1024
//! workers = 2
//!
//! [filters.notifications]
//! exclude_names = ["debug"]
//!
//! [filters.requests]
//! affordance_types = ["action"]
//! ```

pub mod config;
pub mod dispatch;
pub mod filter;
pub mod message;
pub mod recorder;
pub mod session;
pub mod sweep;

pub use config::{
    Config, ConfigError, HistoryConfig, RecorderConfig, StorageConfig, ValidationError,
    default_config_path,
};
pub use dispatch::{CURSOR_NOT_FOUND, HistoryRequest, HistoryResponse, dispatch, execute};
pub use filter::{FiltersConfig, RecordFilter};
pub use message::{MessageKind, ThingMessage};
pub use recorder::{Recorder, RecorderSnapshot, RecorderStats, SubmitOutcome};
pub use sweep::CursorSweeper;

//! Time-ordered value history with resumable cursors for IoT Things.
//!
//! Values are stored one bucket per Thing under keys that sort by time
//! (see [`codec`]). Reads go through a [`HistoryCursor`], either held
//! directly, or cached server-side in a [`CursorCache`] under an opaque key so
//! that remote, stateless clients can page through history across calls.
//!
//! # Features
//!
//! - Validation with default timestamps before anything is written
//! - First/last/next/prev/seek with an optional affordance-name filter
//! - Windowed batch reads that never lose the record on a window boundary
//! - Owner-checked cursors that expire when abandoned
//! - Corrupt entries are logged and skipped, never fatal to a scan
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use thingstore_history::History;
//! use thingstore_store::MemoryBackend;
//! use thingstore_types::{AffordanceType, ThingValue};
//! use time::OffsetDateTime;
//!
//! let history = History::new(Arc::new(MemoryBackend::new()));
//! history.add_value(
//!     ThingValue::new("thing-1", "temperature", AffordanceType::Property, "agent-1")
//!         .with_data(serde_json::json!(21.5)),
//! )?;
//!
//! let key = history.create_cursor("client-1", "thing-1", Some("temperature"))?;
//! let page = history.next_n("client-1", &key, OffsetDateTime::now_utc(), 0)?;
//! assert_eq!(page.values.len(), 1);
//! history.release_cursor("client-1", &key)?;
//! # Ok::<(), thingstore_history::Error>(())
//! ```

mod cache;
pub mod codec;
mod cursor;
mod error;
mod history;
mod scan;
mod validate;

pub use cache::{CursorCache, CursorInfo, DEFAULT_CURSOR_LIFESPAN, SharedCursor};
pub use cursor::{Direction, HistoryCursor};
pub use error::{Error, Result};
pub use history::History;
pub use scan::{DEFAULT_LIMIT, HistoryPage, effective_limit};
pub use validate::{ValidationError, validate};

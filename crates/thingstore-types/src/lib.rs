//! Shared value types for the thingstore history engine.
//!
//! This crate provides the record type stored per Thing ([`ThingValue`]) and
//! the closed set of affordance kinds ([`AffordanceType`]) together with their
//! one-character storage tags.
//!
//! # Example
//!
//! ```
//! use thingstore_types::{AffordanceType, ThingValue};
//!
//! let value = ThingValue::new("thing-1", "temperature", AffordanceType::Property, "agent-1")
//!     .with_data(serde_json::json!(21.5));
//! assert!(value.timestamp.is_none());
//! ```

pub mod error;
pub mod types;

pub use error::ParseError;
pub use types::{AffordanceType, ThingValue};

//! Error types for parsing thingstore value types.

use thiserror::Error;

/// Errors that can occur when parsing affordance kinds from text or key tags.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The affordance type name is not one of property, event or action.
    #[error("Unknown affordance type: {0}")]
    UnknownAffordanceType(String),

    /// The one-character storage tag is not one of `p`, `e` or `a`.
    #[error("Unknown affordance tag: {0:?}")]
    UnknownAffordanceTag(String),
}

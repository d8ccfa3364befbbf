//! Core value types recorded by the history engine.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ParseError;

/// Kind of affordance a recorded value belongs to.
///
/// Each kind has a one-character tag used inside storage keys:
/// `p` for properties, `e` for events and `a` for actions.
///
/// ```
/// use thingstore_types::AffordanceType;
///
/// assert_eq!(AffordanceType::Action.tag(), "a");
/// assert_eq!(AffordanceType::from_tag("p"), Ok(AffordanceType::Property));
/// assert!(AffordanceType::from_tag("x").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AffordanceType {
    /// A readable (and possibly writable) property.
    Property,
    /// An event emitted by the Thing.
    Event,
    /// An action invoked on the Thing.
    Action,
}

impl AffordanceType {
    /// All affordance kinds, in declaration order.
    pub const ALL: [AffordanceType; 3] = [
        AffordanceType::Property,
        AffordanceType::Event,
        AffordanceType::Action,
    ];

    /// The one-character tag used in storage keys.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            AffordanceType::Property => "p",
            AffordanceType::Event => "e",
            AffordanceType::Action => "a",
        }
    }

    /// Parse a storage key tag.
    ///
    /// Unknown tags are rejected rather than silently mapped to events.
    pub fn from_tag(tag: &str) -> Result<Self, ParseError> {
        match tag {
            "p" => Ok(AffordanceType::Property),
            "e" => Ok(AffordanceType::Event),
            "a" => Ok(AffordanceType::Action),
            other => Err(ParseError::UnknownAffordanceTag(other.to_string())),
        }
    }

    /// The lowercase name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AffordanceType::Property => "property",
            AffordanceType::Event => "event",
            AffordanceType::Action => "action",
        }
    }
}

impl FromStr for AffordanceType {
    type Err = ParseError;

    /// Parse an affordance type name (case-insensitive).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "property" => Ok(AffordanceType::Property),
            "event" => Ok(AffordanceType::Event),
            "action" => Ok(AffordanceType::Action),
            _ => Err(ParseError::UnknownAffordanceType(s.to_string())),
        }
    }
}

impl fmt::Display for AffordanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded observation of a Thing's property, event or action.
///
/// `timestamp` may be left empty by producers; it is filled with the current
/// time when the value is validated for storage. Values read back from the
/// store always carry a timestamp with millisecond precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThingValue {
    /// ID of the Thing that owns this value.
    pub thing_id: String,
    /// Affordance name (property, event or action identifier).
    pub name: String,
    /// Kind of affordance.
    pub affordance_type: AffordanceType,
    /// Client that produced the value.
    pub sender_id: String,
    /// When the value was produced.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
    /// Opaque payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ThingValue {
    /// Create a value without timestamp and with a null payload.
    pub fn new(
        thing_id: impl Into<String>,
        name: impl Into<String>,
        affordance_type: AffordanceType,
        sender_id: impl Into<String>,
    ) -> Self {
        Self {
            thing_id: thing_id.into(),
            name: name.into(),
            affordance_type,
            sender_id: sender_id.into(),
            timestamp: None,
            data: serde_json::Value::Null,
        }
    }

    /// Set the production time.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: OffsetDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Set the payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_mapping_is_bijective() {
        for kind in AffordanceType::ALL {
            assert_eq!(AffordanceType::from_tag(kind.tag()), Ok(kind));
        }
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let err = AffordanceType::from_tag("x").unwrap_err();
        assert_eq!(err, ParseError::UnknownAffordanceTag("x".to_string()));
        assert!(AffordanceType::from_tag("").is_err());
        assert!(AffordanceType::from_tag("pe").is_err());
    }

    #[test]
    fn test_from_str_case_insensitive() {
        assert_eq!("Property".parse(), Ok(AffordanceType::Property));
        assert_eq!("EVENT".parse(), Ok(AffordanceType::Event));
        assert_eq!("action".parse(), Ok(AffordanceType::Action));
        assert!("sensor".parse::<AffordanceType>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(AffordanceType::Event.to_string(), "event");
    }

    #[test]
    fn test_thing_value_serde() {
        let ts = time::macros::datetime!(2024-05-01 12:00:00 UTC);
        let value = ThingValue::new("thing-1", "temperature", AffordanceType::Property, "agent-1")
            .with_timestamp(ts)
            .with_data(serde_json::json!(21.5));

        let json = serde_json::to_string(&value).unwrap();
        assert!(json.contains("\"affordance_type\":\"property\""));
        assert!(json.contains("2024-05-01T12:00:00Z"));

        let back: ThingValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_thing_value_defaults_on_deserialize() {
        let json = r#"{
            "thing_id": "thing-1",
            "name": "alarm",
            "affordance_type": "event",
            "sender_id": "agent-1"
        }"#;
        let value: ThingValue = serde_json::from_str(json).unwrap();
        assert!(value.timestamp.is_none());
        assert!(value.data.is_null());
    }
}

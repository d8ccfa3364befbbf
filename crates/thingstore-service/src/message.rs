//! Messages flowing through the hub that may be persisted.

use serde::{Deserialize, Serialize};
use thingstore_history::ValidationError;
use thingstore_types::{AffordanceType, ThingValue};
use time::OffsetDateTime;

/// Whether a message reports a state change or asks for one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Property update or event published by a Thing.
    Notification,
    /// Action or property write requested by a consumer.
    Request,
}

/// A message published to the hub.
///
/// The affordance type is kept as received; it is only checked when the
/// message is turned into a [`ThingValue`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThingMessage {
    pub kind: MessageKind,
    pub thing_id: String,
    pub name: String,
    pub affordance_type: String,
    pub sender_id: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ThingMessage {
    /// Parsed affordance type, if it is one of the known kinds.
    pub fn affordance(&self) -> Option<AffordanceType> {
        self.affordance_type.parse().ok()
    }

    /// Map the message to a storable value.
    pub fn to_value(&self) -> Result<ThingValue, ValidationError> {
        let affordance_type: AffordanceType = self.affordance_type.parse()?;
        let mut value = ThingValue::new(
            self.thing_id.clone(),
            self.name.clone(),
            affordance_type,
            self.sender_id.clone(),
        )
        .with_data(self.data.clone());
        value.timestamp = self.timestamp;
        Ok(value)
    }
}

//! Validation of values before they are encoded and stored.

use thingstore_types::{ParseError, ThingValue};
use time::OffsetDateTime;

/// Reasons a value is rejected for storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A required field is empty.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// A field contains the storage key separator.
    #[error("{field} must not contain '/': {value:?}")]
    KeySeparator { field: &'static str, value: String },

    /// The affordance type is not property, event or action.
    #[error("unknown affordance type {0:?}")]
    UnknownAffordanceType(String),

    /// The timestamp lies before the Unix epoch and has no sortable key.
    #[error("timestamp {0} is before the Unix epoch")]
    TimestampBeforeEpoch(OffsetDateTime),
}

impl From<ParseError> for ValidationError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::UnknownAffordanceType(kind) | ParseError::UnknownAffordanceTag(kind) => {
                ValidationError::UnknownAffordanceType(kind)
            }
            other => ValidationError::UnknownAffordanceType(other.to_string()),
        }
    }
}

/// Check required fields and fill in defaults.
///
/// Sets `timestamp` to the current time when the producer left it empty, so
/// this must run before the value is encoded.
pub fn validate(value: &mut ThingValue) -> Result<(), ValidationError> {
    if value.thing_id.is_empty() {
        return Err(ValidationError::MissingField("thing_id"));
    }
    if value.name.is_empty() {
        return Err(ValidationError::MissingField("name"));
    }
    if value.sender_id.is_empty() {
        return Err(ValidationError::MissingField("sender_id"));
    }

    for (field, text) in [("name", &value.name), ("sender_id", &value.sender_id)] {
        if text.contains('/') {
            return Err(ValidationError::KeySeparator {
                field,
                value: text.clone(),
            });
        }
    }

    let timestamp = *value.timestamp.get_or_insert_with(OffsetDateTime::now_utc);
    if timestamp < OffsetDateTime::UNIX_EPOCH {
        return Err(ValidationError::TimestampBeforeEpoch(timestamp));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use thingstore_types::AffordanceType;
    use time::macros::datetime;

    fn value() -> ThingValue {
        ThingValue::new("thing-1", "temperature", AffordanceType::Property, "agent-1")
    }

    #[test]
    fn test_valid_value_gets_timestamp() {
        let mut v = value();
        let before = OffsetDateTime::now_utc();
        validate(&mut v).unwrap();
        let ts = v.timestamp.unwrap();
        assert!(ts >= before && ts <= OffsetDateTime::now_utc());
    }

    #[test]
    fn test_existing_timestamp_kept() {
        let ts = datetime!(2023-01-01 00:00:00 UTC);
        let mut v = value().with_timestamp(ts);
        validate(&mut v).unwrap();
        assert_eq!(v.timestamp, Some(ts));
    }

    #[test]
    fn test_missing_fields() {
        let mut v = value();
        v.thing_id.clear();
        assert_eq!(validate(&mut v), Err(ValidationError::MissingField("thing_id")));

        let mut v = value();
        v.name.clear();
        assert_eq!(validate(&mut v), Err(ValidationError::MissingField("name")));

        let mut v = value();
        v.sender_id.clear();
        assert_eq!(validate(&mut v), Err(ValidationError::MissingField("sender_id")));
        assert!(v.timestamp.is_none());
    }

    #[test]
    fn test_separator_rejected() {
        let mut v = value();
        v.name = "a/b".to_string();
        let err = validate(&mut v).unwrap_err();
        assert!(matches!(err, ValidationError::KeySeparator { field: "name", .. }));

        let mut v = value();
        v.sender_id = "svc/1".to_string();
        assert!(validate(&mut v).is_err());
    }

    #[test]
    fn test_pre_epoch_rejected() {
        let mut v = value().with_timestamp(datetime!(1969-12-31 23:59:59 UTC));
        assert!(matches!(
            validate(&mut v),
            Err(ValidationError::TimestampBeforeEpoch(_))
        ));
    }

    #[test]
    fn test_unknown_type_from_parse_error() {
        let err: ValidationError = "sensor"
            .parse::<AffordanceType>()
            .map_err(ValidationError::from)
            .unwrap_err();
        assert_eq!(err, ValidationError::UnknownAffordanceType("sensor".into()));
        assert_eq!(err.to_string(), "unknown affordance type \"sensor\"");
    }
}

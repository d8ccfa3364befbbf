//! Storage key and payload encoding.
//!
//! A value is stored under the key `<millis>/<name>/<tag>/<sender>` where
//! `millis` is the Unix timestamp in milliseconds, zero-padded to
//! [`TIMESTAMP_DIGITS`] digits so that byte order equals time order. The
//! stored payload is the JSON encoding of `data` only; every other field is
//! rebuilt from the key and the bucket the entry lives in.

use thingstore_types::{AffordanceType, ThingValue};
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::validate::ValidationError;

/// Width of the zero-padded millisecond timestamp at the start of each key.
pub const TIMESTAMP_DIGITS: usize = 15;

/// Separator between key parts.
pub const KEY_SEPARATOR: char = '/';

/// The four parts of a well-formed storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyParts<'a> {
    pub millis: i64,
    pub name: &'a str,
    pub tag: &'a str,
    pub sender_id: &'a str,
}

impl<'a> KeyParts<'a> {
    /// Split a key into exactly four parts with a numeric timestamp.
    pub fn parse(key: &'a [u8]) -> Option<Self> {
        let key = std::str::from_utf8(key).ok()?;
        let mut parts = key.split(KEY_SEPARATOR);
        let millis = parts.next()?.parse().ok()?;
        let name = parts.next()?;
        let tag = parts.next()?;
        let sender_id = parts.next()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            millis,
            name,
            tag,
            sender_id,
        })
    }
}

/// Milliseconds since the Unix epoch.
pub fn unix_millis(timestamp: OffsetDateTime) -> i64 {
    (timestamp.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Key prefix that sorts at or before every entry recorded at `timestamp`.
///
/// Timestamps before the epoch are clamped to the epoch.
pub fn timestamp_key(timestamp: OffsetDateTime) -> String {
    let millis = unix_millis(timestamp).max(0);
    format!("{millis:0width$}", width = TIMESTAMP_DIGITS)
}

/// Build the storage key and payload for a validated value.
pub fn encode(value: &ThingValue) -> Result<(String, Vec<u8>)> {
    let timestamp = value
        .timestamp
        .ok_or(ValidationError::MissingField("timestamp"))?;

    let key = format!(
        "{}{sep}{}{sep}{}{sep}{}",
        timestamp_key(timestamp),
        value.name,
        value.affordance_type.tag(),
        value.sender_id,
        sep = KEY_SEPARATOR,
    );
    let payload = serde_json::to_vec(&value.data)?;
    Ok((key, payload))
}

/// Rebuild a value from its bucket, key and payload.
///
/// Returns `Ok(None)` when the key is too malformed to describe a value (fewer
/// than two parts or a non-numeric timestamp). Returns an error when the key
/// has an unknown affordance tag or the payload is not valid JSON. Callers
/// iterating history skip the entry in both cases.
///
/// Keys without a tag decode as events; keys without a sender decode with an
/// empty `sender_id`.
pub fn decode(bucket_id: &str, key: &[u8], payload: &[u8]) -> Result<Option<ThingValue>> {
    let Ok(key) = std::str::from_utf8(key) else {
        return Ok(None);
    };
    let parts: Vec<&str> = key.split(KEY_SEPARATOR).collect();
    if parts.len() < 2 {
        return Ok(None);
    }
    let Ok(millis) = parts[0].parse::<i64>() else {
        return Ok(None);
    };
    let Ok(timestamp) = OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
    else {
        return Ok(None);
    };

    let affordance_type = match parts.get(2) {
        Some(tag) => AffordanceType::from_tag(tag)
            .map_err(|_| Error::UnknownAffordanceTag(key.to_string()))?,
        None => AffordanceType::Event,
    };

    let data = if payload.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(payload).map_err(|source| Error::Decode {
            key: key.to_string(),
            source,
        })?
    };

    Ok(Some(ThingValue {
        thing_id: bucket_id.to_string(),
        name: parts[1].to_string(),
        affordance_type,
        sender_id: parts.get(3).map(|s| s.to_string()).unwrap_or_default(),
        timestamp: Some(timestamp),
        data,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use time::macros::datetime;

    fn sample() -> ThingValue {
        ThingValue::new("thing-1", "temperature", AffordanceType::Property, "agent-1")
            .with_timestamp(datetime!(2024-03-01 10:00:00.123 UTC))
            .with_data(json!({"value": 21.5, "unit": "C"}))
    }

    #[test]
    fn test_encode_layout() {
        let (key, payload) = encode(&sample()).unwrap();
        assert_eq!(key, "001709287200123/temperature/p/agent-1");
        assert_eq!(
            serde_json::from_slice::<serde_json::Value>(&payload).unwrap(),
            json!({"value": 21.5, "unit": "C"})
        );
    }

    #[test]
    fn test_encode_type_tags() {
        for (kind, tag) in [
            (AffordanceType::Action, "/a/"),
            (AffordanceType::Property, "/p/"),
            (AffordanceType::Event, "/e/"),
        ] {
            let mut v = sample();
            v.affordance_type = kind;
            assert!(encode(&v).unwrap().0.contains(tag));
        }
    }

    #[test]
    fn test_encode_requires_timestamp() {
        let mut v = sample();
        v.timestamp = None;
        assert!(matches!(
            encode(&v),
            Err(Error::Validation(ValidationError::MissingField("timestamp")))
        ));
    }

    #[test]
    fn test_decode_roundtrip() {
        let v = sample();
        let (key, payload) = encode(&v).unwrap();
        let back = decode("thing-1", key.as_bytes(), &payload).unwrap().unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_decode_malformed_key() {
        assert!(decode("t", b"garbage", b"1").unwrap().is_none());
        assert!(decode("t", b"notanumber/name/p/s", b"1").unwrap().is_none());
        assert!(decode("t", &[0xff, 0xfe], b"1").unwrap().is_none());
    }

    #[test]
    fn test_decode_short_keys() {
        let v = decode("t", b"1000/alarm", b"true").unwrap().unwrap();
        assert_eq!(v.affordance_type, AffordanceType::Event);
        assert_eq!(v.sender_id, "");
        assert_eq!(v.timestamp, Some(datetime!(1970-01-01 00:00:01 UTC)));

        let v = decode("t", b"1000/open/a", b"").unwrap().unwrap();
        assert_eq!(v.affordance_type, AffordanceType::Action);
        assert!(v.data.is_null());
    }

    #[test]
    fn test_decode_unpadded_legacy_key() {
        let v = decode("t", b"1709287200123/temperature/p/agent-1", b"1")
            .unwrap()
            .unwrap();
        assert_eq!(v.timestamp, sample().timestamp);
    }

    #[test]
    fn test_decode_unknown_tag_is_error() {
        let err = decode("t", b"1000/temp/x/agent", b"1").unwrap_err();
        assert!(matches!(err, Error::UnknownAffordanceTag(_)));
    }

    #[test]
    fn test_decode_corrupt_payload_is_error() {
        let err = decode("t", b"1000/temp/p/agent", b"{not json").unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
        assert!(err.to_string().contains("1000/temp/p/agent"));
    }

    #[test]
    fn test_key_parts() {
        let parts = KeyParts::parse(b"000000000001000/temp/p/agent").unwrap();
        assert_eq!(parts.millis, 1000);
        assert_eq!(parts.name, "temp");
        assert_eq!(parts.tag, "p");
        assert_eq!(parts.sender_id, "agent");

        assert!(KeyParts::parse(b"1000/temp/p").is_none());
        assert!(KeyParts::parse(b"1000/temp/p/agent/extra").is_none());
        assert!(KeyParts::parse(b"x/temp/p/agent").is_none());
    }

    #[test]
    fn test_timestamp_key_clamps_pre_epoch() {
        assert_eq!(
            timestamp_key(datetime!(1960-01-01 00:00:00 UTC)),
            "000000000000000"
        );
    }

    fn affordance() -> impl Strategy<Value = AffordanceType> {
        prop_oneof![
            Just(AffordanceType::Property),
            Just(AffordanceType::Event),
            Just(AffordanceType::Action),
        ]
    }

    fn value_strategy() -> impl Strategy<Value = ThingValue> {
        (
            "[a-z0-9:-]{1,16}",
            "[A-Za-z0-9_.-]{1,16}",
            affordance(),
            "[A-Za-z0-9_.-]{1,16}",
            0i64..=9_999_999_999_999,
            any::<i64>(),
        )
            .prop_map(|(thing, name, kind, sender, millis, n)| {
                let ts = OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
                    .unwrap();
                ThingValue::new(thing, name, kind, sender)
                    .with_timestamp(ts)
                    .with_data(json!({ "n": n }))
            })
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(v in value_strategy()) {
            let (key, payload) = encode(&v).unwrap();
            let back = decode(&v.thing_id, key.as_bytes(), &payload).unwrap().unwrap();
            prop_assert_eq!(back, v);
        }

        #[test]
        fn prop_key_order_follows_time(a in 0i64..=9_999_999_999_999, b in 0i64..=9_999_999_999_999) {
            let at = |ms: i64| OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).unwrap();
            let ka = timestamp_key(at(a));
            let kb = timestamp_key(at(b));
            prop_assert_eq!(a.cmp(&b), ka.cmp(&kb));
        }
    }
}

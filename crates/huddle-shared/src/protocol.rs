use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{FIELD_DATE, FIELD_TEXT, FIELD_UID};
use crate::timekey::TimeKey;
use crate::types::ParticipantId;

/// A message as persisted under `channels/<id>/messages/<key>`.
///
/// The sender's display name is deliberately absent: it is resolved by each
/// receiver at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Sender uid
    pub uid: String,
    pub text: String,
    /// Server timestamp (Unix epoch millis)
    #[serde(alias = "timestamp")]
    pub date: i64,
}

/// Outcome of validating a loosely typed log payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Valid(MessageRecord),
    /// A required field is missing or has the wrong JSON type.
    Malformed(String),
}

impl MessageRecord {
    pub fn new(sender: &ParticipantId, text: impl Into<String>, date: TimeKey) -> Self {
        Self {
            uid: sender.0.clone(),
            text: text.into(),
            date: date.timestamp(),
        }
    }

    pub fn sender(&self) -> ParticipantId {
        ParticipantId(self.uid.clone())
    }

    pub fn timestamp(&self) -> TimeKey {
        TimeKey::from_timestamp(self.date)
    }

    /// Validate a payload pushed by the backend.
    pub fn parse(payload: &Value) -> Parsed {
        match Self::deserialize(payload) {
            Ok(record) => Parsed::Valid(record),
            Err(e) => Parsed::Malformed(e.to_string()),
        }
    }

    /// Encode for writing to the log.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(FIELD_UID.to_string(), Value::from(self.uid.as_str()));
        map.insert(FIELD_TEXT.to_string(), Value::from(self.text.as_str()));
        map.insert(FIELD_DATE.to_string(), Value::from(self.date));
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_valid_record() {
        let parsed = MessageRecord::parse(&json!({
            "uid": "u1",
            "text": "hello",
            "date": 1_505_412_000_000_i64,
        }));
        assert_eq!(
            parsed,
            Parsed::Valid(MessageRecord {
                uid: "u1".into(),
                text: "hello".into(),
                date: 1_505_412_000_000,
            })
        );
    }

    #[test]
    fn test_parse_accepts_timestamp_alias() {
        let parsed = MessageRecord::parse(&json!({ "uid": "u1", "text": "hi", "timestamp": 7 }));
        match parsed {
            Parsed::Valid(record) => assert_eq!(record.timestamp(), TimeKey::from_timestamp(7)),
            Parsed::Malformed(e) => panic!("unexpected malformed payload: {e}"),
        }
    }

    #[test]
    fn test_parse_rejects_missing_and_mistyped_fields() {
        let payloads = [
            json!({ "text": "hi", "date": 1 }),
            json!({ "uid": "u1", "date": 1 }),
            json!({ "uid": "u1", "text": "hi" }),
            json!({ "uid": 42, "text": "hi", "date": 1 }),
            json!({ "uid": "u1", "text": ["hi"], "date": 1 }),
            json!({ "uid": "u1", "text": "hi", "date": "yesterday" }),
            json!({ "uid": "u1", "text": "hi", "date": 1.5 }),
            json!("just a string"),
            Value::Null,
        ];
        for payload in payloads {
            assert!(
                matches!(MessageRecord::parse(&payload), Parsed::Malformed(_)),
                "payload should be rejected: {payload}"
            );
        }
    }

    #[test]
    fn test_to_value_uses_wire_field_names() {
        let record = MessageRecord::new(&ParticipantId::new("u1"), "hey", TimeKey::from_timestamp(9));
        assert_eq!(record.to_value(), json!({ "uid": "u1", "text": "hey", "date": 9 }));
    }
}

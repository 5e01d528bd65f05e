//! Items and control messages
//!
//! An `Item` is one unit of work read from the events stream. After the
//! leader applies an item it publishes a `ControlMessage` carrying the
//! item's key and the side effects the engine produced, so replicas can
//! apply the outcome instead of recomputing it.
//!
//! Control messages travel as JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::stream::Record;

/// One decoded unit of work from the events stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Item key, unique per item
    pub key: String,
    /// Offset on the events stream
    pub offset: i64,
    /// Opaque engine payload
    pub payload: Vec<u8>,
}

impl Item {
    /// Build an item from an events-stream record.
    pub fn from_record(record: &Record) -> Self {
        Self {
            key: record.key.clone(),
            offset: record.offset,
            payload: record.value.clone(),
        }
    }
}

/// A leader-computed outcome a replica applies directly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideEffect {
    /// Kind of effect, interpreted by the processing handler
    pub name: String,
    /// Effect data
    #[serde(default)]
    pub payload: Value,
}

impl SideEffect {
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// Leader decision published once per processed item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlMessage {
    /// Key of the processed item
    pub id: String,
    /// Events-stream offset of the processed item
    pub offset: i64,
    /// Side effects replicas must apply
    #[serde(default)]
    pub side_effects: Vec<SideEffect>,
}

impl ControlMessage {
    pub fn new(id: impl Into<String>, offset: i64, side_effects: Vec<SideEffect>) -> Self {
        Self {
            id: id.into(),
            offset,
            side_effects,
        }
    }

    /// Encode as JSON bytes.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode from JSON bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_control_message_wire_names() {
        let message = ControlMessage::new(
            "k1",
            7,
            vec![SideEffect::new("notify", json!({"to": "ops"}))],
        );
        let value: Value = serde_json::from_slice(&message.encode().unwrap()).unwrap();
        assert_eq!(value["id"], "k1");
        assert_eq!(value["offset"], 7);
        assert_eq!(value["sideEffects"][0]["name"], "notify");
    }

    #[test]
    fn test_decode_without_side_effects() {
        let message = ControlMessage::decode(br#"{"id":"k0","offset":0}"#).unwrap();
        assert_eq!(message.id, "k0");
        assert!(message.side_effects.is_empty());
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(ControlMessage::decode(b"not json").is_err());
    }

    #[test]
    fn test_item_from_record() {
        let record = Record {
            topic: "events".to_string(),
            partition: 0,
            offset: 3,
            key: "k3".to_string(),
            value: b"payload".to_vec(),
        };
        let item = Item::from_record(&record);
        assert_eq!(item.key, "k3");
        assert_eq!(item.offset, 3);
        assert_eq!(item.payload, b"payload");
    }
}

//! Wire protocol for channel messages.
//!
//! Every transport frame carries one JSON object with exactly two fields:
//!
//! ```text
//! {"type": "menuItems", "data": [ ... ]}
//! ```
//!
//! `data` is omitted on the wire when it is null, so a heartbeat request is
//! simply `{"type":"ping"}`. The server answers with a `pong` message, which
//! the dispatcher consumes without involving any handler.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ChannelError, Result};

/// Reserved message type sent by the heartbeat timer.
pub const HEARTBEAT_REQUEST: &str = "ping";

/// Reserved message type the server sends in reply to a heartbeat.
pub const HEARTBEAT_REPLY: &str = "pong";

/// Normalize a message type for case-insensitive matching.
pub fn normalize_type(message_type: &str) -> String {
    message_type.to_lowercase()
}

/// A message received from the server.
///
/// `message_type` keeps the sender's original casing; matching against
/// registered handlers uses [`normalized_type`](Self::normalized_type).
#[derive(Clone, Debug, PartialEq)]
pub struct InboundMessage {
    /// The message type as sent by the server.
    pub message_type: String,
    /// The message payload. `Value::Null` when the server sent no data.
    pub data: Value,
}

impl InboundMessage {
    /// Create an inbound message.
    pub fn new(message_type: impl Into<String>, data: Value) -> Self {
        Self {
            message_type: message_type.into(),
            data,
        }
    }

    /// The lowercase form of the message type.
    pub fn normalized_type(&self) -> String {
        normalize_type(&self.message_type)
    }

    /// Whether this is the server's heartbeat reply.
    pub fn is_heartbeat_reply(&self) -> bool {
        self.normalized_type() == HEARTBEAT_REPLY
    }

    /// Deserialize the payload into a concrete type.
    pub fn data_as<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone()).map_err(|e| ChannelError::Decode(e.to_string()))
    }
}

/// A message to be sent to the server.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutboundMessage {
    /// The message type.
    #[serde(rename = "type")]
    pub message_type: String,
    /// The message payload. Omitted from the frame when null.
    #[serde(skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl OutboundMessage {
    /// Create an outbound message.
    pub fn new(message_type: impl Into<String>, data: Value) -> Self {
        Self {
            message_type: message_type.into(),
            data,
        }
    }

    /// The heartbeat request message.
    pub fn heartbeat() -> Self {
        Self::new(HEARTBEAT_REQUEST, Value::Null)
    }

    /// Serialize into a text frame.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ChannelError::Encode(e.to_string()))
    }
}

/// Result of decoding a text frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    /// A well-formed message with a `type`.
    Message(InboundMessage),
    /// A JSON object without a `type` field.
    Untyped,
}

/// Raw frame layout. `type` must be a string when present.
#[derive(Deserialize)]
struct Frame {
    #[serde(rename = "type", default)]
    message_type: Option<String>,
    #[serde(default)]
    data: Value,
}

/// Decode a text frame.
///
/// Fails with [`ChannelError::Decode`] when the payload is not JSON, is not
/// an object, or carries a non-string `type`.
pub fn decode(payload: &str) -> Result<Decoded> {
    let frame: Frame =
        serde_json::from_str(payload).map_err(|e| ChannelError::Decode(e.to_string()))?;
    Ok(match frame.message_type {
        Some(message_type) => Decoded::Message(InboundMessage {
            message_type,
            data: frame.data,
        }),
        None => Decoded::Untyped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_heartbeat_omits_data() {
        let frame = OutboundMessage::heartbeat().encode().unwrap();
        assert_eq!(frame, r#"{"type":"ping"}"#);
    }

    #[test]
    fn test_outbound_with_data() {
        let msg = OutboundMessage::new("Login", json!({"user": "jam", "ids": [1, 2]}));
        let value: Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(value["type"], "Login");
        assert_eq!(value["data"]["ids"][1], 2);
        assert_eq!(value.as_object().unwrap().len(), 2);
    }

    #[test]
    fn test_decode_message_keeps_original_case() {
        let decoded = decode(r#"{"type":"MenuItems","data":[{"Path":"/"}]}"#).unwrap();
        match decoded {
            Decoded::Message(msg) => {
                assert_eq!(msg.message_type, "MenuItems");
                assert_eq!(msg.normalized_type(), "menuitems");
                assert_eq!(msg.data[0]["Path"], "/");
            }
            Decoded::Untyped => panic!("expected a message"),
        }
    }

    #[test]
    fn test_decode_missing_data_is_null() {
        match decode(r#"{"type":"Reauth"}"#).unwrap() {
            Decoded::Message(msg) => assert!(msg.data.is_null()),
            Decoded::Untyped => panic!("expected a message"),
        }
    }

    #[test]
    fn test_decode_untyped_object() {
        assert_eq!(decode(r#"{"data":5}"#).unwrap(), Decoded::Untyped);
    }

    #[test]
    fn test_decode_rejects_bad_payloads() {
        for payload in ["not json", "[1,2]", "42", r#"{"type":7}"#, ""] {
            assert!(
                matches!(decode(payload), Err(ChannelError::Decode(_))),
                "payload {payload:?} should fail"
            );
        }
    }

    #[test]
    fn test_heartbeat_reply_any_case() {
        assert!(InboundMessage::new("PONG", Value::Null).is_heartbeat_reply());
        assert!(InboundMessage::new("pong", Value::Null).is_heartbeat_reply());
        assert!(!InboundMessage::new("ping", Value::Null).is_heartbeat_reply());
    }

    #[test]
    fn test_data_as() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Item {
            #[serde(rename = "Display")]
            display: String,
        }
        let msg = InboundMessage::new("item", json!({"Display": "Home"}));
        let item: Item = msg.data_as().unwrap();
        assert_eq!(item.display, "Home");
        assert!(msg.data_as::<Vec<u8>>().is_err());
    }
}

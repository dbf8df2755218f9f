//! Wire envelope shared by every hub conversation.
//!
//! Each frame on the message bus is one JSON envelope: the command name,
//! the caller-chosen transaction id, the logical name of the sending
//! server, and a free-form JSON object payload. State blobs travel inside
//! payloads as base64 strings so the envelope stays valid JSON end to end.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use nexus_event_system::{Location, PlayerId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One frame on the message bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Command identifier, e.g. `"login_request"`
    pub command: String,
    /// Caller-chosen id correlating every frame of one conversation
    pub transaction_id: String,
    /// Logical name of the server that sent this frame
    pub source_server: String,
    /// Command-specific payload
    #[serde(default)]
    pub payload: Map<String, Value>,
}

/// Errors raised while reading fields out of an envelope payload.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("Missing payload field: {0}")]
    MissingField(&'static str),
    #[error("Payload field {0} has the wrong type")]
    WrongType(&'static str),
    #[error("Payload field {0} is not valid base64: {1}")]
    BadBase64(&'static str, base64::DecodeError),
    #[error("Payload field {0} is not a valid player id: {1}")]
    BadPlayerId(&'static str, uuid::Error),
}

impl Envelope {
    pub fn new(
        command: impl Into<String>,
        transaction_id: impl Into<String>,
        source_server: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            transaction_id: transaction_id.into(),
            source_server: source_server.into(),
            payload: Map::new(),
        }
    }

    /// Builds a reply envelope for the same conversation.
    ///
    /// Keeps the transaction id so the caller can pair the reply with its
    /// pending request; the source becomes the hub's own name.
    pub fn reply(&self, command: impl Into<String>, hub_name: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            transaction_id: self.transaction_id.clone(),
            source_server: hub_name.into(),
            payload: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Stores a binary blob as a base64 payload field.
    pub fn with_blob(mut self, key: impl Into<String>, data: &[u8]) -> Self {
        self.payload
            .insert(key.into(), Value::String(BASE64.encode(data)));
        self
    }

    pub fn with_location(mut self, key: impl Into<String>, location: &Location) -> Self {
        let value = serde_json::json!({
            "world": location.world,
            "x": location.x,
            "y": location.y,
            "z": location.z,
        });
        self.payload.insert(key.into(), value);
        self
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    // ========================================================================
    // Typed payload accessors
    // ========================================================================

    pub fn str_field(&self, key: &'static str) -> Result<&str, PayloadError> {
        self.payload
            .get(key)
            .ok_or(PayloadError::MissingField(key))?
            .as_str()
            .ok_or(PayloadError::WrongType(key))
    }

    pub fn opt_str_field(&self, key: &'static str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }

    pub fn bool_field(&self, key: &'static str) -> Result<bool, PayloadError> {
        self.payload
            .get(key)
            .ok_or(PayloadError::MissingField(key))?
            .as_bool()
            .ok_or(PayloadError::WrongType(key))
    }

    pub fn player_field(&self, key: &'static str) -> Result<PlayerId, PayloadError> {
        self.str_field(key)?
            .parse()
            .map_err(|e| PayloadError::BadPlayerId(key, e))
    }

    /// Decodes a base64 payload field back into bytes.
    pub fn blob_field(&self, key: &'static str) -> Result<Vec<u8>, PayloadError> {
        let encoded = self.str_field(key)?;
        BASE64
            .decode(encoded)
            .map_err(|e| PayloadError::BadBase64(key, e))
    }

    pub fn location_field(&self, key: &'static str) -> Result<Location, PayloadError> {
        let value = self
            .payload
            .get(key)
            .ok_or(PayloadError::MissingField(key))?;
        let world = value
            .get("world")
            .and_then(Value::as_str)
            .ok_or(PayloadError::WrongType(key))?
            .to_string();
        let coord = |axis: &str| {
            value
                .get(axis)
                .and_then(Value::as_f64)
                .ok_or(PayloadError::WrongType(key))
        };
        Ok(Location {
            world,
            x: coord("x")?,
            y: coord("y")?,
            z: coord("z")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_through_json() {
        let envelope = Envelope::new("prepare_login", "tx-17", "world-3")
            .with_field("player", "c6a7b5d0-3f2e-4a6b-9c1d-0e8f7a6b5c4d")
            .with_blob("data", b"player state");

        let bytes = envelope.encode().unwrap();
        let decoded = Envelope::decode(&bytes).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(decoded.blob_field("data").unwrap(), b"player state");
    }

    #[test]
    fn reply_keeps_the_transaction_id() {
        let request = Envelope::new("location_query", "tx-9", "proxy-1");
        let reply = request.reply("location_result", "nexus");
        assert_eq!(reply.transaction_id, "tx-9");
        assert_eq!(reply.source_server, "nexus");
        assert_eq!(reply.command, "location_result");
    }

    #[test]
    fn location_field_round_trips() {
        let location = Location {
            world: "overworld".to_string(),
            x: 12.5,
            y: 64.0,
            z: -3.25,
        };
        let envelope =
            Envelope::new("commit_save", "tx-1", "world-1").with_location("location", &location);
        assert_eq!(envelope.location_field("location").unwrap(), location);
    }

    #[test]
    fn missing_and_mistyped_fields_are_reported() {
        let envelope = Envelope::new("prepare_login", "tx-2", "world-1").with_field("player", 42);
        assert!(matches!(
            envelope.str_field("absent"),
            Err(PayloadError::MissingField("absent"))
        ));
        assert!(matches!(
            envelope.str_field("player"),
            Err(PayloadError::WrongType("player"))
        ));
    }

    #[test]
    fn empty_blob_encodes_to_empty_string() {
        let envelope = Envelope::new("prepare_result", "tx-3", "nexus").with_blob("data", b"");
        assert_eq!(envelope.str_field("data").unwrap(), "");
        assert!(envelope.blob_field("data").unwrap().is_empty());
    }
}

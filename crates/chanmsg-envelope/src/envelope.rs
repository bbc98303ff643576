use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EnvelopeError, Result};
use crate::id::MessageId;
use crate::opcode::Opcode;

/// Default maximum encoded envelope size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// A message as exchanged between two endpoints.
///
/// Wire format (JSON):
/// ```text
/// { "id": "<message id>", "opcode": "messenger::message", "payload": <any> }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique id of this envelope.
    pub id: MessageId,
    /// Routing opcode.
    pub opcode: Opcode,
    /// Opaque application data; for ACK envelopes, the acknowledged id.
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Build an envelope with a freshly generated id.
    pub fn new(payload: impl Into<Value>, opcode: Opcode) -> Self {
        Self {
            id: MessageId::generate(),
            opcode,
            payload: payload.into(),
        }
    }

    /// Application message with the default opcode.
    pub fn message(payload: impl Into<Value>) -> Self {
        Self::new(payload, Opcode::Message)
    }

    /// Handshake envelope.
    pub fn connect() -> Self {
        Self::new(Value::Null, Opcode::Connect)
    }

    /// Teardown envelope.
    pub fn close() -> Self {
        Self::new(Value::Null, Opcode::Close)
    }

    /// Acknowledgment of `acked`.
    pub fn ack(acked: &MessageId) -> Self {
        Self::new(acked.as_str(), Opcode::Ack)
    }

    /// The id named by an ACK envelope's payload.
    pub fn acked_id(&self) -> Result<MessageId> {
        match &self.payload {
            Value::String(id) if !id.is_empty() => Ok(MessageId::from(id.as_str())),
            other => Err(EnvelopeError::InvalidAck(other.to_string())),
        }
    }
}

/// Encode an envelope into its wire form.
pub fn encode_envelope(envelope: &Envelope) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(envelope)?))
}

/// Decode an envelope from its wire form.
///
/// Data larger than `max_size` is rejected before it is parsed.
pub fn decode_envelope(data: &[u8], max_size: usize) -> Result<Envelope> {
    if data.len() > max_size {
        return Err(EnvelopeError::PayloadTooLarge {
            size: data.len(),
            max: max_size,
        });
    }
    Ok(serde_json::from_slice(data)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn wire_shape_matches_protocol() {
        let envelope = Envelope {
            id: MessageId::from("m-1"),
            opcode: Opcode::Message,
            payload: json!({ "x": 1 }),
        };
        let wire = encode_envelope(&envelope).unwrap();
        let value: Value = serde_json::from_slice(&wire).unwrap();
        assert_eq!(
            value,
            json!({ "id": "m-1", "opcode": "messenger::message", "payload": { "x": 1 } })
        );
    }

    #[test]
    fn decodes_application_opcode() {
        let wire = br#"{"id":"m-2","opcode":"chat::typing","payload":true}"#;
        let envelope = decode_envelope(wire, DEFAULT_MAX_PAYLOAD).unwrap();
        assert_eq!(envelope.opcode, Opcode::Other("chat::typing".to_string()));
        assert_eq!(envelope.payload, json!(true));
    }

    #[test]
    fn missing_payload_decodes_as_null() {
        let wire = br#"{"id":"m-3","opcode":"messenger::connect"}"#;
        let envelope = decode_envelope(wire, DEFAULT_MAX_PAYLOAD).unwrap();
        assert_eq!(envelope.opcode, Opcode::Connect);
        assert!(envelope.payload.is_null());
    }

    #[test]
    fn missing_id_is_malformed() {
        let wire = br#"{"opcode":"messenger::message","payload":1}"#;
        let result = decode_envelope(wire, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(EnvelopeError::Json(_))));
    }

    #[test]
    fn oversized_data_is_rejected_before_parsing() {
        let result = decode_envelope(b"not even json", 4);
        assert!(matches!(
            result,
            Err(EnvelopeError::PayloadTooLarge { size: 13, max: 4 })
        ));
    }

    #[test]
    fn ack_names_acknowledged_id() {
        let original = Envelope::message("hi");
        let ack = Envelope::ack(&original.id);
        assert_eq!(ack.opcode, Opcode::Ack);
        assert_ne!(ack.id, original.id);
        assert_eq!(ack.acked_id().unwrap(), original.id);
    }

    #[test]
    fn ack_with_non_string_payload_is_invalid() {
        let bogus = Envelope::new(json!(42), Opcode::Ack);
        assert!(matches!(bogus.acked_id(), Err(EnvelopeError::InvalidAck(_))));
    }

    #[test]
    fn control_constructors() {
        assert_eq!(Envelope::connect().opcode, Opcode::Connect);
        assert_eq!(Envelope::close().opcode, Opcode::Close);
        assert!(Envelope::connect().payload.is_null());
    }
}

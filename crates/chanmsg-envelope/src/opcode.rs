//! Built-in opcodes.
//!
//! Opcodes in the `messenger::` namespace are reserved for the protocol.
//! Any other string is an application-defined opcode and is routed like
//! [`MESSAGE`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix shared by every protocol opcode.
pub const NAMESPACE: &str = "messenger::";

/// Handshake: carries the transferred private port.
pub const CONNECT: &str = "messenger::connect";

/// Orderly teardown of the private channel.
pub const CLOSE: &str = "messenger::close";

/// Acknowledgment; payload is the id of the acknowledged message.
pub const ACK: &str = "messenger::ack";

/// Application message (the default opcode).
pub const MESSAGE: &str = "messenger::message";

/// Message opcode as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Opcode {
    Connect,
    Close,
    Ack,
    #[default]
    Message,
    /// Application-defined opcode.
    Other(String),
}

impl Opcode {
    /// Wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Connect => CONNECT,
            Self::Close => CLOSE,
            Self::Ack => ACK,
            Self::Message => MESSAGE,
            Self::Other(name) => name,
        }
    }

    /// Returns true for the opcodes the protocol handles itself.
    pub fn is_control(&self) -> bool {
        matches!(self, Self::Connect | Self::Close | Self::Ack)
    }

    /// Returns true if the opcode lives in the reserved namespace.
    pub fn is_reserved(&self) -> bool {
        self.as_str().starts_with(NAMESPACE)
    }
}

impl From<&str> for Opcode {
    fn from(value: &str) -> Self {
        match value {
            CONNECT => Self::Connect,
            CLOSE => Self::Close,
            ACK => Self::Ack,
            MESSAGE => Self::Message,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for Opcode {
    fn from(value: String) -> Self {
        match value.as_str() {
            CONNECT | CLOSE | ACK | MESSAGE => Self::from(value.as_str()),
            _ => Self::Other(value),
        }
    }
}

impl From<Opcode> for String {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Other(name) => name,
            builtin => builtin.as_str().to_string(),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_strings_map_to_variants() {
        assert_eq!(Opcode::from(CONNECT), Opcode::Connect);
        assert_eq!(Opcode::from(CLOSE.to_string()), Opcode::Close);
        assert_eq!(Opcode::from(ACK), Opcode::Ack);
        assert_eq!(Opcode::from(MESSAGE), Opcode::Message);
        assert_eq!(Opcode::default(), Opcode::Message);
    }

    #[test]
    fn application_opcode_is_other() {
        let op = Opcode::from("chat::typing");
        assert_eq!(op, Opcode::Other("chat::typing".to_string()));
        assert!(!op.is_reserved());
        assert!(!op.is_control());
        assert_eq!(op.to_string(), "chat::typing");
    }

    #[test]
    fn control_opcodes() {
        assert!(Opcode::Connect.is_control());
        assert!(Opcode::Close.is_control());
        assert!(Opcode::Ack.is_control());
        assert!(!Opcode::Message.is_control());
        assert!(Opcode::Message.is_reserved());
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&Opcode::Ack).unwrap();
        assert_eq!(json, "\"messenger::ack\"");
        let op: Opcode = serde_json::from_str("\"messenger::close\"").unwrap();
        assert_eq!(op, Opcode::Close);
    }
}

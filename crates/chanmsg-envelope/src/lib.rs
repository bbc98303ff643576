//! Wire envelope for chanmsg endpoints.
//!
//! Every message exchanged between two endpoints is an [`Envelope`]:
//! - A globally unique [`MessageId`]
//! - An [`Opcode`] from the `messenger::` namespace (or an application opcode)
//! - An opaque JSON payload
//!
//! Envelopes travel as JSON text; [`encode_envelope`] and [`decode_envelope`]
//! are the only two places that know that.

pub mod envelope;
pub mod error;
pub mod id;
pub mod opcode;

pub use envelope::{decode_envelope, encode_envelope, Envelope, DEFAULT_MAX_PAYLOAD};
pub use error::{EnvelopeError, Result};
pub use id::MessageId;
pub use opcode::{Opcode, ACK, CLOSE, CONNECT, MESSAGE, NAMESPACE};

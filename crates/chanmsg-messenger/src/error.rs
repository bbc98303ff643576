use std::time::Duration;

use bytes::Bytes;
use chanmsg_envelope::{EnvelopeError, MessageId};

/// Errors that can occur in messenger operations.
#[derive(Debug, thiserror::Error)]
pub enum MessengerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] chanmsg_transport::TransportError),

    /// Envelope encoding error.
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// `close()` called on an endpoint that is not connected.
    #[error("cannot close connection: not connected")]
    NotConnected,

    /// `connect()` called on an endpoint that already has a private port.
    #[error("already connected")]
    AlreadyConnected,

    /// The endpoint has been closed and cannot be reused.
    #[error("endpoint is closed")]
    Closed,

    /// No acknowledgment arrived within the configured window.
    #[error("ACK not received")]
    AckTimeout { id: MessageId, timeout: Duration },

    /// The endpoint was dropped while the acknowledgment was pending.
    #[error("endpoint dropped before acknowledgment")]
    EndpointDropped,

    /// An acknowledgment handle was polled again after it completed.
    #[error("acknowledgment handle polled after completion")]
    Consumed,
}

pub type Result<T> = std::result::Result<T, MessengerError>;

/// Inbound delivery failure handed to the registered error handler.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The transport could not deserialize the message.
    #[error("message could not be deserialized ({} bytes)", .data.len())]
    MessageError { data: Bytes },

    /// The data arrived but is not a usable envelope.
    #[error("undecodable envelope: {source}")]
    Malformed { data: Bytes, source: EnvelopeError },
}

impl DeliveryError {
    /// Raw data of the failed delivery.
    pub fn data(&self) -> &Bytes {
        match self {
            Self::MessageError { data } | Self::Malformed { data, .. } => data,
        }
    }
}

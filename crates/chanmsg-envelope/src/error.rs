/// Errors that can occur during envelope encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The data is not a well-formed envelope.
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),

    /// The encoded envelope exceeds the configured maximum size.
    #[error("envelope too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An ACK envelope whose payload is not the acknowledged message id.
    #[error("ack payload is not a message id: {0}")]
    InvalidAck(String),
}

pub type Result<T> = std::result::Result<T, EnvelopeError>;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The port has been closed locally.
    #[error("message port {0} is closed")]
    PortClosed(u64),

    /// The port's inbound queue already has a subscriber.
    #[error("message port {0} already has a subscriber")]
    AlreadySubscribed(u64),

    /// The target origin is not `*` and not a usable origin string.
    #[error("invalid target origin: {0:?}")]
    InvalidOrigin(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;

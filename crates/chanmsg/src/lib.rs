//! Point-to-point messaging between two execution contexts.
//!
//! chanmsg connects two endpoints over a private pair of entangled ports,
//! negotiated through a one-shot broadcast handshake, and exchanges JSON
//! envelopes over it with optional acknowledgments.
//!
//! # Crate Structure
//!
//! - [`transport`]: message ports, channels and the in-process broadcast context
//! - [`envelope`]: wire envelope, opcodes and message ids
//! - [`messenger`]: the endpoint itself (handshake, buffering, acknowledgments)

/// Re-export transport types.
pub mod transport {
    pub use chanmsg_transport::*;
}

/// Re-export envelope types.
pub mod envelope {
    pub use chanmsg_envelope::*;
}

/// Re-export messenger types.
pub mod messenger {
    pub use chanmsg_messenger::*;
}

pub use chanmsg_messenger::{Messenger, MessengerConfig};

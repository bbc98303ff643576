//! Message transports consumed by chanmsg endpoints.
//!
//! Provides the two host primitives a messenger is built on:
//! - [`MessageChannel`]: a pair of entangled [`MessagePort`]s, where a message
//!   posted on one end is delivered to the subscriber of the other end
//! - [`BroadcastTarget`] / [`EventSource`]: a context that accepts one-shot
//!   posts (optionally transferring ports) and fans inbound events out to its
//!   subscribers; [`HostContext`] is the in-process implementation
//!
//! This is the lowest layer of chanmsg. Delivery is always asynchronous: every
//! subscription is drained by its own Tokio task.

pub mod context;
pub mod error;
pub mod port;
pub mod subscription;
pub mod traits;

pub use context::{HostContext, ANY_ORIGIN};
pub use error::{Result, TransportError};
pub use port::{MessageChannel, MessagePort};
pub use subscription::Subscription;
pub use traits::{BroadcastTarget, EventHandler, EventSource, MessageEvent, PortEvent};

use std::sync::Arc;

use bytes::Bytes;

use crate::error::Result;
use crate::port::MessagePort;
use crate::subscription::Subscription;

/// Callback invoked for every inbound event of a subscription.
///
/// Handlers run on the subscription's pump task, one event at a time.
pub type EventHandler = Arc<dyn Fn(PortEvent) + Send + Sync>;

/// An inbound message together with any ports transferred alongside it.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    /// Serialized message data (JSON).
    pub data: Bytes,
    /// Ports transferred with the message, in transfer order.
    pub ports: Vec<MessagePort>,
}

/// Event delivered to a subscriber.
#[derive(Debug, Clone)]
pub enum PortEvent {
    /// A message that arrived intact.
    Message(MessageEvent),
    /// A message whose data could not be deserialized on arrival.
    MessageError(MessageEvent),
}

impl PortEvent {
    /// Classify raw data as it arrives at the receiving side.
    ///
    /// Only JSON-serializable data can cross a transport; anything else is
    /// surfaced on the error channel instead of the message channel.
    pub fn arrived(data: Bytes, ports: Vec<MessagePort>) -> Self {
        let event = MessageEvent { data, ports };
        match serde_json::from_slice::<serde::de::IgnoredAny>(&event.data) {
            Ok(_) => Self::Message(event),
            Err(_) => Self::MessageError(event),
        }
    }

    /// The underlying event regardless of channel.
    pub fn event(&self) -> &MessageEvent {
        match self {
            Self::Message(event) | Self::MessageError(event) => event,
        }
    }

    /// True when the event arrived on the error channel.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::MessageError(_))
    }
}

/// A context that accepts one-shot posted messages.
///
/// `target_origin` constrains delivery: `"*"` matches any receiving context,
/// any other value must equal the receiver's origin or the post is dropped.
pub trait BroadcastTarget: Send + Sync {
    /// Post `data` to this context, transferring ownership of `transfer`.
    fn post_message(&self, data: Bytes, target_origin: &str, transfer: Vec<MessagePort>)
        -> Result<()>;
}

/// A context whose inbound events can be observed.
pub trait EventSource: Send + Sync {
    /// Register `handler` for every subsequent inbound event.
    ///
    /// Delivery stops when the returned [`Subscription`] is cancelled or dropped.
    fn subscribe(&self, handler: EventHandler) -> Result<Subscription>;
}

impl<T: BroadcastTarget + ?Sized> BroadcastTarget for Arc<T> {
    fn post_message(
        &self,
        data: Bytes,
        target_origin: &str,
        transfer: Vec<MessagePort>,
    ) -> Result<()> {
        (**self).post_message(data, target_origin, transfer)
    }
}

impl<T: EventSource + ?Sized> EventSource for Arc<T> {
    fn subscribe(&self, handler: EventHandler) -> Result<Subscription> {
        (**self).subscribe(handler)
    }
}

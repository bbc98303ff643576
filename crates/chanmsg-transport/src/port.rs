use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::AbortHandle;
use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::subscription::{lock, spawn_pump, Subscription};
use crate::traits::{EventHandler, PortEvent};

static NEXT_PORT_ID: AtomicU64 = AtomicU64::new(1);

/// A two-ended private channel.
///
/// Writing to either port delivers to the subscriber of the other port.
/// Messages posted before the receiving side subscribes are queued and
/// delivered, in order, once it does.
#[derive(Debug)]
pub struct MessageChannel {
    /// The end usually kept by the creator.
    pub port1: MessagePort,
    /// The end usually transferred to the remote context.
    pub port2: MessagePort,
}

impl MessageChannel {
    /// Create a pair of entangled ports.
    pub fn new() -> Self {
        let (tx1, rx1) = mpsc::unbounded_channel();
        let (tx2, rx2) = mpsc::unbounded_channel();
        Self {
            port1: MessagePort::entangled(tx2, rx1),
            port2: MessagePort::entangled(tx1, rx2),
        }
    }

    /// Split into `(port1, port2)`.
    pub fn into_ports(self) -> (MessagePort, MessagePort) {
        (self.port1, self.port2)
    }
}

impl Default for MessageChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// One end of a [`MessageChannel`].
///
/// Cloning yields another handle to the same end, which is how a port is
/// carried inside a transferred [`crate::MessageEvent`].
#[derive(Clone)]
pub struct MessagePort {
    inner: Arc<PortInner>,
}

struct PortInner {
    id: u64,
    outbound: Mutex<Option<UnboundedSender<PortEvent>>>,
    inbound: Mutex<Option<UnboundedReceiver<PortEvent>>>,
    pump: Mutex<Option<AbortHandle>>,
    closed: AtomicBool,
}

impl MessagePort {
    fn entangled(outbound: UnboundedSender<PortEvent>, inbound: UnboundedReceiver<PortEvent>) -> Self {
        Self {
            inner: Arc::new(PortInner {
                id: NEXT_PORT_ID.fetch_add(1, Ordering::Relaxed),
                outbound: Mutex::new(Some(outbound)),
                inbound: Mutex::new(Some(inbound)),
                pump: Mutex::new(None),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Process-unique port identifier, for logging.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Post `data` to the entangled port.
    ///
    /// Posting to a port whose other end has been closed is not an error; the
    /// message is silently discarded, matching the host semantics.
    pub fn post_message(&self, data: impl Into<Bytes>) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::PortClosed(self.inner.id));
        }

        let outbound = lock(&self.inner.outbound);
        let Some(tx) = outbound.as_ref() else {
            return Err(TransportError::PortClosed(self.inner.id));
        };
        if tx.send(PortEvent::arrived(data.into(), Vec::new())).is_err() {
            trace!(port = self.inner.id, "entangled port closed; message discarded");
        }
        Ok(())
    }

    /// Start delivering inbound events to `handler`.
    ///
    /// A port has a single inbound queue, so it accepts one subscriber.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn subscribe(&self, handler: EventHandler) -> Result<Subscription> {
        if self.is_closed() {
            return Err(TransportError::PortClosed(self.inner.id));
        }

        let rx = lock(&self.inner.inbound)
            .take()
            .ok_or(TransportError::AlreadySubscribed(self.inner.id))?;
        let pump = spawn_pump(rx, move |event| handler(event));
        *lock(&self.inner.pump) = Some(pump.clone());

        debug!(port = self.inner.id, "message port started");
        Ok(Subscription::from_abort(pump))
    }

    /// Disentangle this port. Idempotent.
    ///
    /// Stops local delivery and lets the entangled port's subscriber drain
    /// whatever was already queued for it.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        lock(&self.inner.outbound).take();
        lock(&self.inner.inbound).take();
        if let Some(pump) = lock(&self.inner.pump).take() {
            pump.abort();
        }
        debug!(port = self.inner.id, "message port closed");
    }

    /// True once [`MessagePort::close`] has been called on any handle.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for MessagePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagePort")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::*;

    fn collector() -> (EventHandler, mpsc::UnboundedReceiver<PortEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler: EventHandler = Arc::new(move |event| {
            let _ = tx.send(event);
        });
        (handler, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn delivers_in_post_order() {
        let (left, right) = MessageChannel::new().into_ports();
        let (handler, mut rx) = collector();
        let _sub = right.subscribe(handler).unwrap();

        left.post_message(&b"1"[..]).unwrap();
        left.post_message(&b"2"[..]).unwrap();
        left.post_message(&b"3"[..]).unwrap();

        for expected in [b"1", b"2", b"3"] {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.event().data.as_ref(), expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn queues_until_subscribed() {
        let (left, right) = MessageChannel::new().into_ports();
        left.post_message(&b"\"early\""[..]).unwrap();

        let (handler, mut rx) = collector();
        let _sub = right.subscribe(handler).unwrap();

        let event = rx.recv().await.unwrap();
        assert!(!event.is_error());
        assert_eq!(event.event().data.as_ref(), b"\"early\"");
    }

    #[tokio::test(start_paused = true)]
    async fn second_subscriber_is_rejected() {
        let (_left, right) = MessageChannel::new().into_ports();
        let (handler, _rx) = collector();
        let _sub = right.subscribe(handler.clone()).unwrap();

        let err = right.subscribe(handler).unwrap_err();
        assert!(matches!(err, TransportError::AlreadySubscribed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn post_after_close_fails() {
        let (left, _right) = MessageChannel::new().into_ports();
        left.close();
        assert!(left.is_closed());
        assert!(matches!(
            left.post_message(&b"1"[..]),
            Err(TransportError::PortClosed(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn post_to_closed_peer_is_discarded() {
        let (left, right) = MessageChannel::new().into_ports();
        right.close();
        left.post_message(&b"1"[..]).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn close_lets_peer_drain_queued_messages() {
        let (left, right) = MessageChannel::new().into_ports();
        let (handler, mut rx) = collector();
        let _sub = right.subscribe(handler).unwrap();

        left.post_message(&b"\"last\""[..]).unwrap();
        left.close();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event().data.as_ref(), b"\"last\"");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_subscription_stops_delivery() {
        let (left, right) = MessageChannel::new().into_ports();
        let (handler, mut rx) = collector();
        let sub = right.subscribe(handler).unwrap();
        sub.cancel();
        tokio::task::yield_now().await;

        left.post_message(&b"1"[..]).unwrap();
        let received = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(matches!(received, Ok(None) | Err(_)));
    }

    #[test]
    fn ports_have_distinct_ids() {
        let (left, right) = MessageChannel::new().into_ports();
        assert_ne!(left.id(), right.id());
        assert_eq!(left.clone().id(), left.id());
    }
}

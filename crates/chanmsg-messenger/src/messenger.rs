use std::fmt;
use std::sync::Arc;

use chanmsg_envelope::{encode_envelope, Envelope, Opcode};
use chanmsg_transport::{BroadcastTarget, EventSource, MessageChannel};
use serde_json::Value;
use tracing::debug;

use crate::ack::{self, AckHandle, CloseHandle, WaiterKind};
use crate::config::MessengerConfig;
use crate::connection::{self, ConnectionState};
use crate::dispatch;
use crate::error::{DeliveryError, MessengerError, Result};
use crate::state::{Listener, Shared};
use crate::stream::MessageStream;

/// A point-to-point messaging endpoint.
///
/// Cloning is cheap and every clone drives the same endpoint. The endpoint
/// lives until its last clone is dropped; pending acknowledgments then fail
/// with [`MessengerError::EndpointDropped`].
///
/// Operations that arm timers or start transport delivery must run inside a
/// Tokio runtime.
#[derive(Clone)]
pub struct Messenger {
    shared: Arc<Shared>,
}

impl Messenger {
    /// Endpoint with the default configuration (no acknowledgments).
    pub fn new() -> Self {
        Self::with_config(MessengerConfig::default())
    }

    pub fn with_config(config: MessengerConfig) -> Self {
        Self {
            shared: Arc::new(Shared::new(config)),
        }
    }

    pub fn config(&self) -> &MessengerConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().connection.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Envelopes waiting for a port to be bound.
    pub fn buffered_len(&self) -> usize {
        self.shared.lock().outbound.len()
    }

    /// Envelopes awaiting acknowledgment.
    pub fn pending_acks(&self) -> usize {
        self.shared.lock().acks.len()
    }

    /// Open a private channel to `target`.
    ///
    /// Posts a CONNECT envelope to `target` addressed to `origin`, transferring
    /// one half of a fresh [`MessageChannel`], and binds the other half right
    /// away. Anything buffered so far is flushed before this returns.
    ///
    /// The returned handle resolves with the CONNECT envelope once the remote
    /// side acknowledges it (immediately when acknowledgments are disabled).
    pub fn connect<T>(&self, target: &T, origin: &str) -> Result<AckHandle>
    where
        T: BroadcastTarget + ?Sized,
    {
        let mut state = self.shared.lock();
        match state.connection.state() {
            ConnectionState::Disconnected => {}
            ConnectionState::Connected => return Err(MessengerError::AlreadyConnected),
            ConnectionState::Closed => return Err(MessengerError::Closed),
        }

        let envelope = Envelope::connect();
        let (local, remote) = MessageChannel::new().into_ports();
        target.post_message(encode_envelope(&envelope)?, origin, vec![remote])?;
        connection::bind_port(&self.shared, &mut state, local)?;
        debug!(id = %envelope.id, origin, "connect sent");

        Ok(ack::track(
            &self.shared,
            &mut state,
            &envelope,
            WaiterKind::Send,
        ))
    }

    /// Close the private channel.
    ///
    /// Fails with [`MessengerError::NotConnected`] unless connected. Sends
    /// CLOSE; the port is released once CLOSE is acknowledged, or right away
    /// when acknowledgments are disabled. If the acknowledgment times out the
    /// endpoint stays connected and the handle fails.
    pub fn close(&self) -> Result<CloseHandle> {
        let mut state = self.shared.lock();
        if state.connection.state() != ConnectionState::Connected {
            return Err(MessengerError::NotConnected);
        }

        let envelope = Envelope::close();
        debug!(id = %envelope.id, "close requested");
        let handle =
            dispatch::send_envelope(&self.shared, &mut state, envelope, WaiterKind::Close);
        if !self.shared.config.ack {
            connection::release_port(&mut state);
        }
        Ok(CloseHandle::new(handle))
    }

    /// Send an application message with the default MESSAGE opcode.
    pub fn send(&self, payload: impl Into<Value>) -> AckHandle {
        self.send_with_opcode(payload, Opcode::Message)
    }

    /// Send `payload` tagged with `opcode`.
    ///
    /// Goes straight to the port when connected and is buffered otherwise.
    /// After close the handle is already failed with [`MessengerError::Closed`].
    pub fn send_with_opcode(
        &self,
        payload: impl Into<Value>,
        opcode: impl Into<Opcode>,
    ) -> AckHandle {
        let envelope = Envelope::new(payload, opcode.into());
        let mut state = self.shared.lock();
        dispatch::send_envelope(&self.shared, &mut state, envelope, WaiterKind::Send)
    }

    /// Accept a connection offered through `source`.
    ///
    /// Subscribes to every inbound event of `source`; the first CONNECT that
    /// carries a port binds it. The subscription is cancelled at close.
    pub fn wait_for_connection<S>(&self, source: &S) -> Result<()>
    where
        S: EventSource + ?Sized,
    {
        if self.state() == ConnectionState::Closed {
            return Err(MessengerError::Closed);
        }

        let subscription = source.subscribe(dispatch::inbound_handler(&self.shared))?;
        let mut state = self.shared.lock();
        if state.connection.state() == ConnectionState::Closed {
            subscription.cancel();
            return Err(MessengerError::Closed);
        }
        state.connection.watch(subscription);
        debug!("waiting for connection");
        Ok(())
    }

    /// Register a listener for inbound application messages.
    ///
    /// Listeners run in registration order and all see the same envelope.
    /// Registering on a closed endpoint is a no-op.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.add_listener(Listener::Callback(Arc::new(handler)));
    }

    /// Set the handler for inbound delivery failures, replacing any previous one.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&DeliveryError) + Send + Sync + 'static,
    {
        self.shared.lock().error_handler = Some(Arc::new(handler));
    }

    /// Stream of inbound application messages.
    ///
    /// Dropping the stream unregisters it the next time a message arrives or
    /// a listener is added.
    pub fn subscribe(&self) -> MessageStream {
        let (tx, stream) = MessageStream::channel();
        self.add_listener(Listener::Stream(tx));
        stream
    }

    fn add_listener(&self, listener: Listener) {
        let mut state = self.shared.lock();
        if state.connection.state() == ConnectionState::Closed {
            debug!("listener not registered; endpoint closed");
            return;
        }
        state.add_listener(listener);
    }
}

impl Default for Messenger {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Messenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("Messenger")
            .field("state", &state.connection.state())
            .field("buffered", &state.outbound.len())
            .field("pending_acks", &state.acks.len())
            .field("listeners", &state.listeners.len())
            .field("config", &self.shared.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chanmsg_envelope::decode_envelope;
    use chanmsg_transport::{HostContext, MessagePort, PortEvent, ANY_ORIGIN};
    use futures_util::FutureExt;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::*;

    fn acking(timeout_ms: u64) -> Messenger {
        Messenger::with_config(
            MessengerConfig::default()
                .with_ack(true)
                .with_timeout(Duration::from_millis(timeout_ms)),
        )
    }

    /// Capture the CONNECT posted to `frame` and return it with its port.
    async fn accept_raw(frame: &HostContext) -> (Envelope, MessagePort) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = frame
            .subscribe(Arc::new(move |event: PortEvent| {
                let _ = tx.send(event);
            }))
            .expect("frame context should accept a listener");
        let PortEvent::Message(event) = rx.recv().await.expect("a CONNECT should be posted") else {
            panic!("expected a message event");
        };
        let envelope = decode_envelope(&event.data, usize::MAX).expect("CONNECT should decode");
        let port = event.ports.into_iter().next().expect("CONNECT should carry a port");
        (envelope, port)
    }

    fn collect_port(port: &MessagePort) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        port.subscribe(Arc::new(move |event: PortEvent| {
            let envelope =
                decode_envelope(&event.event().data, usize::MAX).expect("envelope should decode");
            let _ = tx.send(envelope);
        }))
        .expect("port should accept a listener")
        .detach();
        rx
    }

    #[tokio::test]
    async fn close_before_connect_fails() {
        let messenger = Messenger::new();
        let err = messenger.close().expect_err("close should fail");
        assert!(matches!(err, MessengerError::NotConnected));
        assert_eq!(err.to_string(), "cannot close connection: not connected");
        assert_eq!(messenger.state(), ConnectionState::Disconnected);
        assert_eq!(messenger.buffered_len(), 0);
    }

    #[tokio::test]
    async fn send_while_disconnected_buffers() {
        let messenger = Messenger::new();
        let first = messenger.send("a");
        let second = messenger.send_with_opcode(json!({ "n": 2 }), "app::custom");

        assert_eq!(messenger.buffered_len(), 2);
        assert_eq!(messenger.pending_acks(), 0);
        let first = first.now_or_never().expect("should resolve at once");
        assert_eq!(first.expect("send should succeed").payload, json!("a"));
        let second = second
            .now_or_never()
            .expect("should resolve at once")
            .expect("send should succeed");
        assert_eq!(second.opcode, Opcode::Other("app::custom".into()));
    }

    #[tokio::test]
    async fn connect_flushes_buffer_in_order() {
        let frame = HostContext::new("https://frame.example");
        let messenger = Messenger::new();
        let _ = messenger.send(1);
        let _ = messenger.send(2);
        let _ = messenger.send(3);

        let connect = messenger
            .connect(&frame, ANY_ORIGIN)
            .expect("connect should succeed");
        assert!(messenger.is_connected());
        assert_eq!(messenger.buffered_len(), 0);

        let (handshake, port) = accept_raw(&frame).await;
        assert_eq!(handshake.opcode, Opcode::Connect);
        assert_eq!(connect.await.expect("connect should resolve").id, handshake.id);

        let mut rx = collect_port(&port);
        for expected in 1..=3 {
            let envelope = rx.recv().await.expect("buffered message should arrive");
            assert_eq!(envelope.payload, json!(expected));
        }
        let _ = messenger.send(4);
        assert_eq!(rx.recv().await.expect("message should arrive").payload, json!(4));
    }

    #[tokio::test]
    async fn connect_twice_fails() {
        let frame = HostContext::new("https://frame.example");
        let messenger = Messenger::new();
        let _ = messenger
            .connect(&frame, ANY_ORIGIN)
            .expect("connect should succeed");
        assert!(matches!(
            messenger.connect(&frame, ANY_ORIGIN),
            Err(MessengerError::AlreadyConnected)
        ));
    }

    #[tokio::test]
    async fn connect_rejects_empty_origin() {
        let frame = HostContext::new("https://frame.example");
        let messenger = Messenger::new();
        let err = messenger
            .connect(&frame, "")
            .expect_err("empty origin should be rejected");
        assert!(matches!(err, MessengerError::Transport(_)));
        assert_eq!(messenger.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn close_without_ack_is_immediate_and_terminal() {
        let frame = HostContext::new("https://frame.example");
        let messenger = Messenger::new();
        let _ = messenger
            .connect(&frame, ANY_ORIGIN)
            .expect("connect should succeed");
        let (_, port) = accept_raw(&frame).await;
        let mut rx = collect_port(&port);

        let close = messenger.close().expect("close should be sent");
        let close_id = close.id().clone();
        assert_eq!(messenger.state(), ConnectionState::Closed);
        assert_eq!(close.await.expect("close should resolve"), close_id);

        let sent = rx.recv().await.expect("CLOSE should arrive");
        assert_eq!(sent.opcode, Opcode::Close);
        assert_eq!(sent.id, close_id);

        assert!(matches!(
            messenger.send("late").await,
            Err(MessengerError::Closed)
        ));
        assert_eq!(messenger.buffered_len(), 0);
        assert!(matches!(
            messenger.connect(&frame, ANY_ORIGIN),
            Err(MessengerError::Closed)
        ));
        assert!(matches!(messenger.close(), Err(MessengerError::NotConnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn close_ack_timeout_stays_connected() {
        let frame = HostContext::new("https://frame.example");
        let messenger = acking(100);
        let _ = messenger
            .connect(&frame, ANY_ORIGIN)
            .expect("connect should succeed");

        let err = messenger
            .close()
            .expect("close should be sent")
            .await
            .expect_err("close should time out");
        assert!(matches!(err, MessengerError::AckTimeout { .. }));
        assert!(messenger.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn buffered_sends_time_out_without_connection() {
        let messenger = acking(100);
        let handle = messenger.send(json!({ "x": 1 }));
        assert_eq!(messenger.pending_acks(), 1);

        let err = handle.await.expect_err("send should time out");
        assert_eq!(err.to_string(), "ACK not received");
        assert_eq!(messenger.pending_acks(), 0);
    }

    #[tokio::test]
    async fn subscribe_after_close_ends_immediately() {
        let frame = HostContext::new("https://frame.example");
        let messenger = Messenger::new();
        let _ = messenger
            .connect(&frame, ANY_ORIGIN)
            .expect("connect should succeed");
        let _ = messenger.close().expect("close should be sent");

        let mut stream = messenger.subscribe();
        assert_eq!(stream.next_envelope().await, None);
    }

    #[tokio::test]
    async fn dropped_stream_is_unregistered() {
        let frame = HostContext::new("https://frame.example");
        let messenger = Messenger::new();
        let _ = messenger
            .connect(&frame, ANY_ORIGIN)
            .expect("connect should succeed");
        let (_, port) = accept_raw(&frame).await;
        let listeners = |messenger: &Messenger| messenger.shared.lock().listeners.len();

        drop(messenger.subscribe());
        let mut live = messenger.subscribe();
        assert_eq!(listeners(&messenger), 1);

        drop(messenger.subscribe());
        assert_eq!(listeners(&messenger), 2);
        let hello = Envelope::new("hello", Opcode::Message);
        port.post_message(encode_envelope(&hello).expect("envelope should encode"))
            .expect("port should be open");
        let received = live.next_envelope().await.expect("live stream should yield");
        assert_eq!(received.id, hello.id);
        assert_eq!(listeners(&messenger), 1);
    }

    #[test]
    fn debug_reports_state() {
        let messenger = Messenger::new();
        let rendered = format!("{messenger:?}");
        assert!(rendered.contains("Disconnected"));
        assert!(rendered.contains("buffered: 0"));
    }
}

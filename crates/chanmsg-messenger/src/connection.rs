use std::sync::Arc;

use chanmsg_transport::{MessagePort, Subscription};
use tracing::{debug, warn};

use crate::dispatch;
use crate::error::Result;
use crate::state::{EndpointState, Shared};

/// Lifecycle of an endpoint.
///
/// `Disconnected → Connected → Closed`; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No private port yet. Sends are buffered.
    Disconnected,
    /// Private port bound. Sends go straight to the port.
    Connected,
    /// Port released. The endpoint cannot be reused.
    Closed,
}

/// Transport resources owned by one endpoint.
pub(crate) struct Connection {
    state: ConnectionState,
    port: Option<MessagePort>,
    port_subscription: Option<Subscription>,
    context_subscriptions: Vec<Subscription>,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            port: None,
            port_subscription: None,
            context_subscriptions: Vec::new(),
        }
    }
}

impl Connection {
    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    /// The bound private port. Always `Some` while connected.
    pub(crate) fn port(&self) -> Option<&MessagePort> {
        self.port.as_ref()
    }

    /// Keep a broadcast-context subscription alive until close.
    pub(crate) fn watch(&mut self, subscription: Subscription) {
        self.context_subscriptions.push(subscription);
    }
}

/// Bind `port` as the endpoint's private channel and flush the outbound buffer.
///
/// Used by both sides: the initiator binds its own half right after posting
/// CONNECT, the passive side binds the half delivered with CONNECT.
pub(crate) fn bind_port(
    shared: &Arc<Shared>,
    state: &mut EndpointState,
    port: MessagePort,
) -> Result<()> {
    let subscription = port.subscribe(dispatch::inbound_handler(shared))?;

    debug!(
        port = port.id(),
        buffered = state.outbound.len(),
        "private port bound"
    );
    let connection = &mut state.connection;
    connection.port = Some(port);
    connection.port_subscription = Some(subscription);
    connection.state = ConnectionState::Connected;

    flush(state);
    Ok(())
}

fn flush(state: &mut EndpointState) {
    let Some(port) = state.connection.port.clone() else {
        return;
    };
    while let Some(envelope) = state.outbound.pop_front() {
        if let Err(err) = dispatch::transmit(&port, &envelope) {
            warn!(id = %envelope.id, error = %err, "failed to flush buffered envelope");
        }
    }
}

/// Release the private port and enter the terminal state.
///
/// Reached from the local `close()` path once CLOSE is acknowledged (or
/// immediately without acknowledgments), and from the passive path when a
/// CLOSE arrives. Listeners and context subscriptions go with it.
pub(crate) fn release_port(state: &mut EndpointState) {
    let connection = &mut state.connection;
    if let Some(port) = connection.port.take() {
        port.close();
        debug!(port = port.id(), "private port released");
    }
    connection.port_subscription.take();
    connection.context_subscriptions.clear();
    connection.state = ConnectionState::Closed;
    state.listeners.clear();
}

//! Outbound transport selection and inbound routing by opcode.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chanmsg_envelope::{decode_envelope, encode_envelope, Envelope, MessageId, Opcode};
use chanmsg_transport::{EventHandler, MessageEvent, MessagePort, PortEvent};
use tracing::{debug, error, trace, warn};

use crate::ack::{self, AckHandle, WaiterKind};
use crate::connection::{self, ConnectionState};
use crate::error::{DeliveryError, MessengerError, Result};
use crate::state::{EndpointState, Listener, Shared};

/// Encode and write one envelope to a port.
pub(crate) fn transmit(port: &MessagePort, envelope: &Envelope) -> Result<()> {
    port.post_message(encode_envelope(envelope)?)?;
    trace!(id = %envelope.id, opcode = %envelope.opcode, port = port.id(), "envelope sent");
    Ok(())
}

/// Send over the bound port, or buffer until one is bound.
pub(crate) fn send_envelope(
    shared: &Arc<Shared>,
    state: &mut EndpointState,
    envelope: Envelope,
    kind: WaiterKind,
) -> AckHandle {
    match state.connection.state() {
        ConnectionState::Closed => {
            return AckHandle::failed(envelope.id, MessengerError::Closed);
        }
        ConnectionState::Connected => {
            let sent = match state.connection.port() {
                Some(port) => transmit(port, &envelope),
                None => Err(MessengerError::NotConnected),
            };
            if let Err(err) = sent {
                return AckHandle::failed(envelope.id, err);
            }
        }
        ConnectionState::Disconnected => {
            trace!(id = %envelope.id, opcode = %envelope.opcode, "envelope buffered");
            state.outbound.push_back(envelope.clone());
        }
    }
    ack::track(shared, state, &envelope, kind)
}

/// Emit an ACK for `id` when acknowledgments are enabled.
fn acknowledge(shared: &Arc<Shared>, state: &mut EndpointState, id: &MessageId) {
    if !shared.config.ack {
        return;
    }
    // ACK handles are always resolved on creation.
    let _ = send_envelope(shared, state, Envelope::ack(id), WaiterKind::Send);
}

/// Handler that feeds transport events into this endpoint.
pub(crate) fn inbound_handler(shared: &Arc<Shared>) -> EventHandler {
    let weak = Arc::downgrade(shared);
    Arc::new(move |event| {
        if let Some(shared) = weak.upgrade() {
            handle_event(&shared, event);
        }
    })
}

pub(crate) fn handle_event(shared: &Arc<Shared>, event: PortEvent) {
    let event = match event {
        PortEvent::Message(event) => event,
        PortEvent::MessageError(event) => {
            report(shared, DeliveryError::MessageError { data: event.data });
            return;
        }
    };

    let envelope = match decode_envelope(&event.data, shared.config.max_payload_size) {
        Ok(envelope) => envelope,
        Err(source) => {
            report(
                shared,
                DeliveryError::Malformed {
                    data: event.data,
                    source,
                },
            );
            return;
        }
    };

    trace!(id = %envelope.id, opcode = %envelope.opcode, "envelope received");
    match envelope.opcode {
        Opcode::Connect => handle_connect(shared, &envelope, event),
        Opcode::Close => handle_close(shared, &envelope),
        Opcode::Ack => handle_ack(shared, &envelope, event),
        _ => handle_message(shared, envelope),
    }
}

fn handle_connect(shared: &Arc<Shared>, envelope: &Envelope, event: MessageEvent) {
    // Every listener on a context receives the same transferred ports, so a
    // refused offer is only dropped; it may still be bound by another endpoint.
    let Some(port) = event.ports.into_iter().next() else {
        warn!(id = %envelope.id, "CONNECT without a transferred port; ignored");
        return;
    };

    let mut state = shared.lock();
    if state.connection.state() != ConnectionState::Disconnected {
        warn!(
            id = %envelope.id,
            port = port.id(),
            state = ?state.connection.state(),
            "unexpected CONNECT; offered port left for other listeners"
        );
        return;
    }

    if let Err(err) = connection::bind_port(shared, &mut state, port) {
        warn!(id = %envelope.id, error = %err, "failed to bind offered port");
        return;
    }
    debug!(id = %envelope.id, "connected by remote handshake");
    acknowledge(shared, &mut state, &envelope.id);
}

fn handle_close(shared: &Arc<Shared>, envelope: &Envelope) {
    let mut state = shared.lock();
    if state.connection.state() != ConnectionState::Connected {
        warn!(id = %envelope.id, "CLOSE while not connected; ignored");
        return;
    }
    // The ACK must leave before the port does.
    acknowledge(shared, &mut state, &envelope.id);
    connection::release_port(&mut state);
    debug!(id = %envelope.id, "closed by remote");
}

fn handle_ack(shared: &Arc<Shared>, envelope: &Envelope, event: MessageEvent) {
    let acked = match envelope.acked_id() {
        Ok(id) => id,
        Err(source) => {
            report(
                shared,
                DeliveryError::Malformed {
                    data: event.data,
                    source,
                },
            );
            return;
        }
    };

    let mut state = shared.lock();
    match state.acks.resolve(&acked) {
        Some(WaiterKind::Close) => {
            connection::release_port(&mut state);
            debug!(id = %acked, "close acknowledged");
        }
        Some(WaiterKind::Send) => trace!(id = %acked, "acknowledged"),
        None => trace!(id = %acked, "ACK for unknown or expired message; ignored"),
    }
}

fn handle_message(shared: &Arc<Shared>, envelope: Envelope) {
    let listeners: Vec<Listener> = {
        let mut state = shared.lock();
        acknowledge(shared, &mut state, &envelope.id);
        state.listeners.retain(Listener::is_live);
        state.listeners.clone()
    };

    for listener in &listeners {
        if catch_unwind(AssertUnwindSafe(|| listener.deliver(&envelope))).is_err() {
            error!(id = %envelope.id, opcode = %envelope.opcode, "message listener panicked");
        }
    }
}

fn report(shared: &Arc<Shared>, err: DeliveryError) {
    let handler = shared.lock().error_handler.clone();
    match handler {
        Some(handler) => handler(&err),
        None => trace!(error = %err, "delivery error dropped; no error handler"),
    }
}

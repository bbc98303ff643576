//! Acknowledgment tracking.
//!
//! Every acknowledgment-expecting envelope gets exactly one waiter, keyed by
//! its id, and one timer task. Whichever of {ACK received, timer fired} comes
//! first removes the waiter and completes the handle; the other becomes a no-op.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use chanmsg_envelope::{Envelope, MessageId, Opcode};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

use crate::error::{MessengerError, Result};
use crate::state::{EndpointState, Shared};

/// What completing a waiter means for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaiterKind {
    Send,
    /// The CLOSE envelope: an ACK releases the private port.
    Close,
}

struct Waiter {
    envelope: Envelope,
    kind: WaiterKind,
    tx: oneshot::Sender<Result<Envelope>>,
    timer: AbortHandle,
}

#[derive(Default)]
pub(crate) struct AckTracker {
    waiters: HashMap<MessageId, Waiter>,
}

impl AckTracker {
    fn register(
        &mut self,
        envelope: Envelope,
        kind: WaiterKind,
        timer: AbortHandle,
    ) -> oneshot::Receiver<Result<Envelope>> {
        let (tx, rx) = oneshot::channel();
        let id = envelope.id.clone();
        let waiter = Waiter {
            envelope,
            kind,
            tx,
            timer,
        };
        if let Some(stale) = self.waiters.insert(id, waiter) {
            stale.timer.abort();
        }
        rx
    }

    /// Complete the waiter for `id` successfully.
    ///
    /// Returns `None` when no waiter is pending (unknown id, already timed out,
    /// or already acknowledged).
    pub(crate) fn resolve(&mut self, id: &MessageId) -> Option<WaiterKind> {
        let waiter = self.waiters.remove(id)?;
        waiter.timer.abort();
        let _ = waiter.tx.send(Ok(waiter.envelope));
        Some(waiter.kind)
    }

    /// Fail the waiter for `id` with a timeout. Returns false if it was gone.
    fn expire(&mut self, id: &MessageId, timeout: Duration) -> bool {
        let Some(waiter) = self.waiters.remove(id) else {
            return false;
        };
        let _ = waiter.tx.send(Err(MessengerError::AckTimeout {
            id: id.clone(),
            timeout,
        }));
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }
}

impl Drop for AckTracker {
    fn drop(&mut self) {
        for waiter in self.waiters.values() {
            waiter.timer.abort();
        }
    }
}

/// Produce the acknowledgment handle for an envelope that was just sent or
/// buffered.
///
/// With acknowledgments disabled, or for ACK envelopes themselves, the handle
/// is already resolved and nothing is tracked.
///
/// # Panics
///
/// Arming the timer panics outside a Tokio runtime.
pub(crate) fn track(
    shared: &Arc<Shared>,
    state: &mut EndpointState,
    envelope: &Envelope,
    kind: WaiterKind,
) -> AckHandle {
    if !shared.config.ack || envelope.opcode == Opcode::Ack {
        return AckHandle::ready(envelope.id.clone(), Ok(envelope.clone()));
    }

    let timeout = shared.config.timeout;
    let timer = arm_timer(Arc::downgrade(shared), envelope.id.clone(), timeout);
    let rx = state.acks.register(envelope.clone(), kind, timer);
    trace!(id = %envelope.id, ?timeout, "awaiting acknowledgment");
    AckHandle::pending(envelope.id.clone(), rx)
}

fn arm_timer(shared: Weak<Shared>, id: MessageId, timeout: Duration) -> AbortHandle {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        let Some(shared) = shared.upgrade() else {
            return;
        };
        if shared.lock().acks.expire(&id, timeout) {
            debug!(id = %id, ?timeout, "acknowledgment timed out");
        }
    })
    .abort_handle()
}

/// Resolves once the envelope is acknowledged, or fails on timeout.
///
/// The output is the envelope that was sent. Dropping the handle does not
/// cancel tracking; the waiter still completes (or expires) on its own.
#[must_use = "an AckHandle does nothing unless awaited"]
#[derive(Debug)]
pub struct AckHandle {
    id: MessageId,
    inner: HandleInner,
}

#[derive(Debug)]
enum HandleInner {
    Ready(Option<Result<Envelope>>),
    Pending(oneshot::Receiver<Result<Envelope>>),
}

impl AckHandle {
    pub(crate) fn ready(id: MessageId, result: Result<Envelope>) -> Self {
        Self {
            id,
            inner: HandleInner::Ready(Some(result)),
        }
    }

    pub(crate) fn failed(id: MessageId, error: MessengerError) -> Self {
        Self::ready(id, Err(error))
    }

    fn pending(id: MessageId, rx: oneshot::Receiver<Result<Envelope>>) -> Self {
        Self {
            id,
            inner: HandleInner::Pending(rx),
        }
    }

    /// Id of the envelope this handle tracks.
    pub fn id(&self) -> &MessageId {
        &self.id
    }
}

impl Future for AckHandle {
    type Output = Result<Envelope>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.inner {
            HandleInner::Ready(result) => {
                Poll::Ready(result.take().unwrap_or(Err(MessengerError::Consumed)))
            }
            HandleInner::Pending(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(_)) => Poll::Ready(Err(MessengerError::EndpointDropped)),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

/// Resolves with the CLOSE envelope's id once the close cycle completes.
#[must_use = "a CloseHandle does nothing unless awaited"]
#[derive(Debug)]
pub struct CloseHandle {
    inner: AckHandle,
}

impl CloseHandle {
    pub(crate) fn new(inner: AckHandle) -> Self {
        Self { inner }
    }

    /// Id of the CLOSE envelope.
    pub fn id(&self) -> &MessageId {
        self.inner.id()
    }
}

impl Future for CloseHandle {
    type Output = Result<MessageId>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner)
            .poll(cx)
            .map(|result| result.map(|envelope| envelope.id))
    }
}

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::AbortHandle;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::port::MessagePort;
use crate::subscription::{dispatch_all, lock, spawn_pump, Subscription};
use crate::traits::{BroadcastTarget, EventHandler, EventSource, PortEvent};

/// Target origin that matches every receiving context.
pub const ANY_ORIGIN: &str = "*";

type Listeners = Arc<Mutex<Vec<(u64, EventHandler)>>>;

/// In-process execution context reachable through one-shot posts.
///
/// Plays the role of a host window or embedded frame: anyone holding it can
/// post a message (transferring ports along with it), and any number of
/// listeners can subscribe to what arrives. Events posted before the first
/// listener subscribes are held and delivered once it does.
#[derive(Clone)]
pub struct HostContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    origin: String,
    tx: UnboundedSender<PortEvent>,
    rx: Mutex<Option<UnboundedReceiver<PortEvent>>>,
    listeners: Listeners,
    next_listener: AtomicU64,
    pump: Mutex<Option<AbortHandle>>,
}

impl HostContext {
    /// Create a context identified by `origin` (e.g. `https://app.example`).
    pub fn new(origin: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ContextInner {
                origin: origin.into(),
                tx,
                rx: Mutex::new(Some(rx)),
                listeners: Arc::new(Mutex::new(Vec::new())),
                next_listener: AtomicU64::new(1),
                pump: Mutex::new(None),
            }),
        }
    }

    /// The origin this context receives under.
    pub fn origin(&self) -> &str {
        &self.inner.origin
    }

    /// Number of currently registered listeners.
    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners).len()
    }

    fn accepts(&self, target_origin: &str) -> bool {
        target_origin == ANY_ORIGIN || target_origin == self.inner.origin
    }

    fn ensure_pump(&self) {
        let mut pump = lock(&self.inner.pump);
        if pump.is_some() {
            return;
        }
        let Some(rx) = lock(&self.inner.rx).take() else {
            return;
        };
        let listeners = self.inner.listeners.clone();
        *pump = Some(spawn_pump(rx, move |event| {
            let snapshot: Vec<EventHandler> = lock(&listeners)
                .iter()
                .map(|(_, handler)| handler.clone())
                .collect();
            dispatch_all(&snapshot, event);
        }));
    }
}

impl BroadcastTarget for HostContext {
    fn post_message(
        &self,
        data: Bytes,
        target_origin: &str,
        transfer: Vec<MessagePort>,
    ) -> Result<()> {
        if target_origin.is_empty() {
            return Err(TransportError::InvalidOrigin(target_origin.to_string()));
        }

        if !self.accepts(target_origin) {
            debug!(
                origin = %self.inner.origin,
                target_origin,
                "target origin mismatch; message dropped"
            );
            for port in transfer {
                port.close();
            }
            return Ok(());
        }

        // The receiver lives as long as `inner`, so this only fails mid-drop.
        let _ = self.inner.tx.send(PortEvent::arrived(data, transfer));
        Ok(())
    }
}

impl EventSource for HostContext {
    fn subscribe(&self, handler: EventHandler) -> Result<Subscription> {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.listeners).push((id, handler));
        self.ensure_pump();

        debug!(origin = %self.inner.origin, listener = id, "context listener added");
        let listeners = Arc::downgrade(&self.inner.listeners);
        Ok(Subscription::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                lock(&listeners).retain(|(existing, _)| *existing != id);
            }
        }))
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        if let Some(pump) = lock(&self.pump).take() {
            pump.abort();
        }
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostContext")
            .field("origin", &self.inner.origin)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

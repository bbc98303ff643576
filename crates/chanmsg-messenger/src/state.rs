use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chanmsg_envelope::Envelope;
use tokio::sync::mpsc::UnboundedSender;

use crate::ack::AckTracker;
use crate::config::MessengerConfig;
use crate::connection::Connection;
use crate::error::DeliveryError;

/// Global message listener.
pub type MessageHandler = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Handler for inbound delivery failures.
pub type ErrorHandler = Arc<dyn Fn(&DeliveryError) + Send + Sync>;

/// A registered consumer of inbound application messages.
#[derive(Clone)]
pub(crate) enum Listener {
    Callback(MessageHandler),
    /// Feeds a [`MessageStream`](crate::MessageStream); dead once the stream is dropped.
    Stream(UnboundedSender<Envelope>),
}

impl Listener {
    pub(crate) fn deliver(&self, envelope: &Envelope) {
        match self {
            Self::Callback(handler) => handler(envelope),
            Self::Stream(tx) => {
                let _ = tx.send(envelope.clone());
            }
        }
    }

    pub(crate) fn is_live(&self) -> bool {
        match self {
            Self::Callback(_) => true,
            Self::Stream(tx) => !tx.is_closed(),
        }
    }
}

/// State shared by every handle of one endpoint.
///
/// Transport pumps and ack timers only hold a `Weak` to this, so the endpoint
/// goes away with its last `Messenger` handle.
pub(crate) struct Shared {
    pub(crate) config: MessengerConfig,
    state: Mutex<EndpointState>,
}

impl Shared {
    pub(crate) fn new(config: MessengerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(EndpointState::default()),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, EndpointState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Default)]
pub(crate) struct EndpointState {
    pub(crate) connection: Connection,
    /// Envelopes accepted before the port was bound, oldest first.
    pub(crate) outbound: VecDeque<Envelope>,
    pub(crate) listeners: Vec<Listener>,
    pub(crate) acks: AckTracker,
    pub(crate) error_handler: Option<ErrorHandler>,
}

impl EndpointState {
    /// Register a listener, dropping streams nobody reads any more.
    pub(crate) fn add_listener(&mut self, listener: Listener) {
        self.listeners.retain(Listener::is_live);
        self.listeners.push(listener);
    }
}

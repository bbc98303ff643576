use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::AbortHandle;

use crate::traits::{EventHandler, PortEvent};

type CancelFn = Box<dyn FnOnce() + Send>;

/// Handle for a registered event handler.
///
/// Cancelling (or dropping) the subscription stops delivery to its handler.
/// Cancellation is idempotent and safe to trigger from inside the handler.
pub struct Subscription {
    cancel: Option<CancelFn>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub(crate) fn from_abort(handle: AbortHandle) -> Self {
        Self::new(move || handle.abort())
    }

    /// Stop delivering events to this subscription's handler.
    pub fn cancel(mut self) {
        self.run_cancel();
    }

    /// Keep the handler registered for the lifetime of the source.
    pub fn detach(mut self) {
        self.cancel = None;
    }

    /// True until the subscription is cancelled or detached.
    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Drain `rx` on a dedicated task, handing each event to `handler`.
///
/// # Panics
///
/// Panics when called outside a Tokio runtime.
pub(crate) fn spawn_pump(
    mut rx: UnboundedReceiver<PortEvent>,
    handler: impl Fn(PortEvent) + Send + 'static,
) -> AbortHandle {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            handler(event);
        }
    })
    .abort_handle()
}

pub(crate) fn dispatch_all(handlers: &[EventHandler], event: PortEvent) {
    for handler in handlers {
        handler(event.clone());
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn cancel_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sub = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(sub.is_active());
        sub.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_cancels() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        {
            let _sub = Subscription::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn detach_skips_cancel() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let sub = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        sub.detach();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}

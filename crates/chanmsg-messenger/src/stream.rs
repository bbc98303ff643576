use std::pin::Pin;
use std::task::{Context, Poll};

use chanmsg_envelope::Envelope;
use futures_core::Stream;
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Inbound application envelopes as a [`Stream`].
///
/// Created by [`Messenger::subscribe`](crate::Messenger::subscribe). Yields
/// every envelope the listeners see, in delivery order, and ends once the
/// endpoint is closed or dropped.
#[derive(Debug)]
pub struct MessageStream {
    rx: UnboundedReceiver<Envelope>,
}

impl MessageStream {
    pub(crate) fn channel() -> (mpsc::UnboundedSender<Envelope>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Receive the next envelope, or `None` once the stream has ended.
    pub async fn next_envelope(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}

impl Stream for MessageStream {
    type Item = Envelope;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Envelope>> {
        self.rx.poll_recv(cx)
    }
}

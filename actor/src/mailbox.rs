//! Unbounded ingress queue shared by producers, the consumer, and shutdown.

use async_lock::Mutex;
use futures::{channel::mpsc, StreamExt};

/// Unbounded FIFO of opaque messages.
///
/// Producers append concurrently without suspending; removal is single
/// consumer. The receiving half sits behind a mutex because the consuming
/// side changes hands at runtime: consumer tasks come and go, and shutdown
/// takes over the queue to recover whatever is left.
pub(crate) struct Mailbox<M> {
    tx: mpsc::UnboundedSender<M>,
    rx: Mutex<mpsc::UnboundedReceiver<M>>,
}

impl<M> Mailbox<M> {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::unbounded();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Append a message to the tail.
    ///
    /// Always succeeds while the mailbox is open; once closed, the message is
    /// handed back to the caller.
    pub(crate) fn deposit(&self, msg: M) -> Result<(), M> {
        self.tx.unbounded_send(msg).map_err(|err| err.into_inner())
    }

    /// Remove the head, suspending until a message arrives.
    ///
    /// Resolves to `None` once the mailbox is closed and drained.
    pub(crate) async fn next(&self) -> Option<M> {
        let mut rx = self.rx.lock().await;
        rx.next().await
    }

    /// Hand every immediately available message to `each`, then close.
    ///
    /// The receiver is held for the whole sequence: a consumer racing this
    /// call either dequeues before the drain starts or observes end-of-stream
    /// afterward, never a stall. Messages appended concurrently with the
    /// drain may be missed; `deposit` fails only from the close onward.
    pub(crate) async fn close(&self, mut each: impl FnMut(M)) {
        let mut rx = self.rx.lock().await;
        while let Ok(Some(msg)) = rx.try_next() {
            each(msg);
        }
        rx.close();
    }
}

impl<M> std::fmt::Debug for Mailbox<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mailbox").finish_non_exhaustive()
    }
}

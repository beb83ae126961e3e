//! One-time shutdown broadcasts shared by many tasks.

use futures::{channel::oneshot, future::Shared, FutureExt};
use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

/// A cheaply cloneable termination cause.
///
/// `None` in the surrounding APIs means the scope stopped gracefully; `Some`
/// carries the error that brought it down.
pub type Fault = Arc<dyn std::error::Error + Send + Sync>;

/// A one-time broadcast that can be awaited by many tasks, resolving to the
/// cause the scope stopped with.
///
/// Each open [Signal] tracks its lifecycle: the corresponding
/// [Scope::stop](crate::Scope::stop) completion resolves only once every
/// outstanding clone has been dropped, which is how tasks acknowledge that
/// they finished their cleanup.
///
/// _Note: Polling the same [Signal] after it has resolved will panic. When
/// waiting on a reference to one in a loop, ensure it is either fused or not
/// polled again after it has yielded a result._
#[derive(Clone)]
pub enum Signal {
    /// A signal that will resolve when the signaler marks it as resolved.
    Open(Receiver),
    /// A signal that has already resolved with a known cause.
    Resolved(Option<Fault>),
}

impl Future for Signal {
    type Output = Option<Fault>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut *self {
            Signal::Open(live) => match Pin::new(&mut live.inner).poll(cx) {
                // A dropped signaler is indistinguishable from a graceful stop.
                Poll::Ready(cause) => Poll::Ready(cause.unwrap_or(None)),
                Poll::Pending => Poll::Pending,
            },
            Signal::Resolved(cause) => Poll::Ready(cause.clone()),
        }
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::Open(_) => f.debug_struct("Signal::Open").finish_non_exhaustive(),
            Signal::Resolved(cause) => f
                .debug_struct("Signal::Resolved")
                .field("cause", cause)
                .finish(),
        }
    }
}

/// An open [Signal] with completion tracking.
#[derive(Clone)]
pub struct Receiver {
    inner: Shared<oneshot::Receiver<Option<Fault>>>,
    _guard: Arc<Guard>,
}

/// A guard used to coordinate the resolution of a [Signal].
struct Guard {
    tx: Option<oneshot::Sender<()>>,
}

impl Guard {
    fn new(completion_tx: oneshot::Sender<()>) -> Self {
        Self {
            tx: Some(completion_tx),
        }
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Coordinates a one-time signal across many tasks.
pub struct Signaler {
    tx: oneshot::Sender<Option<Fault>>,
    completion_rx: oneshot::Receiver<()>,
}

impl Signaler {
    /// Create a new [Signaler].
    ///
    /// Returns a [Signaler] and a [Signal] that will resolve when
    /// [Signaler::signal] is called.
    pub fn new() -> (Self, Signal) {
        let (tx, rx) = oneshot::channel();
        let (completion_tx, completion_rx) = oneshot::channel();

        let signaler = Self { tx, completion_rx };
        let signal = Signal::Open(Receiver {
            inner: rx.shared(),
            _guard: Arc::new(Guard::new(completion_tx)),
        });

        (signaler, signal)
    }

    /// Resolve all [Signal]s associated with this [Signaler].
    ///
    /// Returns a receiver that resolves once every outstanding [Signal] clone
    /// has been dropped.
    pub fn signal(self, cause: Option<Fault>) -> oneshot::Receiver<()> {
        let _ = self.tx.send(cause);
        self.completion_rx
    }
}

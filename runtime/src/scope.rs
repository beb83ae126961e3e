use crate::signal::{Fault, Signal, Signaler};
use async_lock::Mutex;
use futures::{channel::oneshot, future::Shared, FutureExt};
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::task::JoinHandle;
use tracing::debug;

/// A cheaply cloneable execution scope.
///
/// A scope bundles a spawner with a one-time, cause-carrying shutdown
/// broadcast. Tasks spawned on a scope are never forcibly aborted: they are
/// expected to watch [Scope::stopped] (or probe [Scope::is_stopped] at loop
/// boundaries) and wind down cooperatively.
///
/// # Stopping
///
/// [Scope::stop] is idempotent and safe to call concurrently from any task or
/// thread. The first call decides the cause every [Signal] resolves with;
/// later calls observe the same completion. The future returned by `stop`
/// resolves once every outstanding [Signal] clone has been dropped, i.e. once
/// all watching tasks have acknowledged the shutdown.
///
/// # Example
///
/// ```
/// use mailroom_runtime::Scope;
///
/// let runtime = tokio::runtime::Runtime::new().expect("runtime should build");
/// runtime.block_on(async {
///     let scope = Scope::new();
///     scope.spawn({
///         let scope = scope.clone();
///         async move {
///             let cause = scope.stopped().await;
///             assert!(cause.is_none());
///         }
///     });
///     scope.stop(None).await;
/// });
/// ```
#[derive(Clone)]
pub struct Scope {
    inner: Arc<Inner>,
    runtime: tokio::runtime::Handle,
}

struct Inner {
    stopped: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
}

enum Lifecycle {
    /// Stop has not been called yet.
    Running {
        // We must use an Option here because we need to move the signaler out
        // of the Running state when stopping.
        signaler: Option<Signaler>,
        signal: Signal,
    },
    /// Stop has been called and completion is pending or resolved.
    Stopped {
        cause: Option<Fault>,
        completion: Shared<oneshot::Receiver<()>>,
    },
}

impl Scope {
    /// Create a new [Scope] on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime context. Use
    /// [Scope::with_handle] to bind an explicit runtime.
    pub fn new() -> Self {
        Self::with_handle(tokio::runtime::Handle::current())
    }

    /// Create a new [Scope] bound to the given runtime handle.
    pub fn with_handle(runtime: tokio::runtime::Handle) -> Self {
        let (signaler, signal) = Signaler::new();
        Self {
            inner: Arc::new(Inner {
                stopped: AtomicBool::new(false),
                lifecycle: Mutex::new(Lifecycle::Running {
                    signaler: Some(signaler),
                    signal,
                }),
            }),
            runtime,
        }
    }

    /// Spawn a task on the scope's runtime.
    ///
    /// The task starts running immediately even if the caller never awaits
    /// the returned handle. Spawning never suspends, so it is safe from
    /// contexts that must not block.
    pub fn spawn<F>(&self, task: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.runtime.spawn(task)
    }

    /// Signal every watcher that the scope has terminated.
    ///
    /// The first call wins: its `cause` is what all [Signal]s resolve with,
    /// and what later calls silently defer to. The returned future resolves
    /// once every outstanding [Signal] has been dropped.
    pub fn stop(&self, cause: Option<Fault>) -> impl Future<Output = ()> + Send {
        let completion = {
            let mut lifecycle = self.inner.lifecycle.lock_blocking();
            match &mut *lifecycle {
                Lifecycle::Running { signaler, .. } => {
                    // Take the signaler out of the Option (it is always
                    // populated in Running).
                    let signaler = signaler.take().expect("signaler populated while running");
                    self.inner.stopped.store(true, Ordering::SeqCst);
                    debug!(?cause, "scope stopping");

                    let completion = signaler.signal(cause.clone()).shared();
                    *lifecycle = Lifecycle::Stopped {
                        cause,
                        completion: completion.clone(),
                    };
                    completion
                }
                Lifecycle::Stopped { completion, .. } => completion.clone(),
            }
        };
        completion.map(|_| ())
    }

    /// Returns a [Signal] that resolves once [Scope::stop] has been called.
    ///
    /// If the scope has already stopped, the signal resolves immediately with
    /// the original cause.
    pub fn stopped(&self) -> Signal {
        match &*self.inner.lifecycle.lock_blocking() {
            Lifecycle::Running { signal, .. } => signal.clone(),
            Lifecycle::Stopped { cause, .. } => Signal::Resolved(cause.clone()),
        }
    }

    /// Whether [Scope::stop] has been called.
    ///
    /// This never suspends and is safe to probe on every iteration of a hot
    /// loop.
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

//! The dispatch primitive: submission, the consumer loop, and shutdown.
//!
//! # Overview
//!
//! Producers and the consumer coordinate through a single atomic counter
//! instead of a lock. Submitting appends to the mailbox and bumps the
//! counter; the previous value alone decides what happens next. A submitter
//! that moved the counter off zero spawns a fresh consumer task, everyone
//! else leaves the running consumer to pick their message up, and a negative
//! value means the owning scope already terminated. The consumer retires one
//! message per iteration and exits the moment the counter drains back to
//! zero; a concurrent submission between its dequeue and its decrement keeps
//! the counter positive, so no message can be stranded by an exiting
//! consumer.
//!
//! Shutdown is driven by the scope: a monitor task awaits the termination
//! signal, fires the completion hook once, pins the counter to its sealed
//! sentinel, and recovers everything still queued through the undelivered
//! hook before closing the mailbox.

mod pending;

#[cfg(test)]
mod tests;

use crate::mailbox::Mailbox;
use async_lock::Mutex;
use futures::{future::BoxFuture, FutureExt};
use mailroom_runtime::{Fault, Scope};
use pending::{Admit, Pending, Settle};
use std::{future::Future, sync::Arc};
use thiserror::Error;
use tracing::{debug, error, trace};

/// An error surfaced out of a consume handler.
///
/// Anything but success is treated as fatal to the owning scope: the
/// dispatcher never retries and never swallows handler failures.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// An error that can occur when submitting a message to a dispatcher.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    /// The owning scope terminated; the message will not be handled.
    #[error("dispatcher closed")]
    Closed,
}

type Consume<M> = Box<dyn Fn(M) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync>;
type Undelivered<M> = Box<dyn Fn(M, Option<Fault>) + Send + Sync>;
type Complete = Box<dyn FnOnce(Option<Fault>) + Send>;

struct State<M> {
    scope: Scope,
    mailbox: Mailbox<M>,
    pending: Pending,
    consume: Consume<M>,
    undelivered: Undelivered<M>,
    complete: Mutex<Option<Complete>>,
}

/// Configures a [Dispatcher] before binding it to its scope.
///
/// The consume handler is the one required piece; the completion and
/// undelivered hooks default to no-ops.
pub struct Builder<M> {
    scope: Scope,
    undelivered: Undelivered<M>,
    complete: Complete,
}

impl<M: Send + 'static> Builder<M> {
    /// Start building a dispatcher bound to `scope`.
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            undelivered: Box::new(|_, _| {}),
            complete: Box::new(|_| {}),
        }
    }

    /// Invoked exactly once when the owning scope terminates, before any
    /// queued messages are recovered.
    pub fn on_complete<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(Option<Fault>) + Send + 'static,
    {
        self.complete = Box::new(hook);
        self
    }

    /// Invoked for every message that will never reach the consume handler,
    /// in queue order, with the cause the scope stopped with.
    pub fn on_undelivered<F>(mut self, hook: F) -> Self
    where
        F: Fn(M, Option<Fault>) + Send + Sync + 'static,
    {
        self.undelivered = Box::new(hook);
        self
    }

    /// Finish construction with the consume handler.
    ///
    /// The handler runs serially: the next message is not dequeued until the
    /// returned future fully resolves. An error resolves the scope with that
    /// fault and stops consumption (see [HandlerError]).
    pub fn build<F, Fut>(self, consume: F) -> Dispatcher<M>
    where
        F: Fn(M) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let state = Arc::new(State {
            scope: self.scope,
            mailbox: Mailbox::new(),
            pending: Pending::new(),
            consume: Box::new(move |msg| consume(msg).boxed()),
            undelivered: self.undelivered,
            complete: Mutex::new(Some(self.complete)),
        });

        // Bind cleanup to the scope's lifetime, whatever the cause.
        let signal = state.scope.stopped();
        let monitor = state.clone();
        state.scope.spawn(async move {
            let cause = signal.await;
            finalize(monitor, cause).await;
        });

        Dispatcher { state }
    }
}

/// Handle used by producers to submit messages.
///
/// Cloning is cheap; clones share the same mailbox, counter, and handlers.
pub struct Dispatcher<M> {
    state: Arc<State<M>>,
}

impl<M> Clone for Dispatcher<M> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<M> std::fmt::Debug for Dispatcher<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl<M: Send + 'static> Dispatcher<M> {
    /// Submit a message for serial consumption.
    ///
    /// Never suspends and never blocks, so it is safe from any task or
    /// thread. Messages from one producer are handled in submission order;
    /// across producers, order follows the counter's single global sequence.
    ///
    /// Fails with [SubmitError::Closed] once the owning scope has terminated.
    /// A submission racing the shutdown drain itself may be reported as
    /// accepted yet reach neither the consume handler nor the undelivered
    /// hook; callers that need certainty must not race scope termination.
    ///
    /// # Panics
    ///
    /// Panics if the counter reads as terminated while the scope is still
    /// live, which would mean the dispatcher's accounting has been corrupted.
    pub fn submit(&self, msg: M) -> Result<(), SubmitError> {
        // Append before counting so the consumer elected by this increment
        // always finds the message already queued.
        if self.state.mailbox.deposit(msg).is_err() {
            return Err(SubmitError::Closed);
        }
        match self.state.pending.admit() {
            Admit::First => {
                self.spawn_consumer();
                Ok(())
            }
            Admit::Queued => Ok(()),
            Admit::Sealed => {
                assert!(
                    self.state.scope.is_stopped(),
                    "pending counter sealed while the scope is live"
                );
                Err(SubmitError::Closed)
            }
        }
    }

    fn spawn_consumer(&self) {
        trace!("consumer spawned");
        let state = self.state.clone();
        self.state.scope.spawn(consumer(state));
    }
}

/// Consumer loop: drains the mailbox one message at a time until the counter
/// reports idle or the scope goes inactive.
///
/// Exits without settling when the scope stopped or the mailbox closed;
/// whatever is still queued stays accounted for and is recovered by
/// [finalize].
async fn consumer<M: Send + 'static>(state: Arc<State<M>>) {
    loop {
        if state.scope.is_stopped() {
            debug!("shutdown");
            return;
        }
        let Some(msg) = state.mailbox.next().await else {
            return;
        };
        if let Err(err) = (state.consume)(msg).await {
            error!(?err, "consume handler failed");
            let _ = state.scope.stop(Some(Arc::from(err)));
            return;
        }
        match state.pending.settle() {
            Settle::Busy => continue,
            Settle::Idle | Settle::Sealed => return,
        }
    }
}

/// Runs once when the owning scope terminates: fire the completion hook,
/// seal the counter, recover queued messages, close the mailbox.
async fn finalize<M: Send + 'static>(state: Arc<State<M>>, cause: Option<Fault>) {
    let Some(complete) = state.complete.lock().await.take() else {
        return;
    };
    complete(cause.clone());
    state.pending.seal();

    let mut orphans = 0usize;
    state
        .mailbox
        .close(|msg| {
            (state.undelivered)(msg, cause.clone());
            orphans += 1;
        })
        .await;
    if orphans > 0 {
        debug!(orphans, "recovered undelivered messages");
    }
}

//! Serial dispatch of concurrently submitted messages.
//!
//! # Overview
//!
//! A [Dispatcher] lets any number of producers submit messages from any task
//! or thread while guaranteeing they are handled one at a time, in submission
//! order, by at most one consumer. The consumer is not a long-lived task: it
//! is spawned on demand by whichever submitter finds the dispatcher idle, and
//! it exits as soon as the backlog is drained. Shutdown is owned entirely by
//! the [Scope](mailroom_runtime::Scope) the dispatcher is bound to: when the
//! scope stops, a one-shot completion hook fires, anything still queued is
//! handed to the undelivered hook, and further submissions fail.
//!
//! # Example
//!
//! ```
//! use mailroom_actor::Builder;
//! use mailroom_runtime::Scope;
//!
//! let runtime = tokio::runtime::Runtime::new().expect("runtime should build");
//! runtime.block_on(async {
//!     let scope = Scope::new();
//!     let dispatcher = Builder::new(scope.clone())
//!         .on_undelivered(|msg: u32, _cause| println!("never handled: {msg}"))
//!         .build(|msg: u32| async move {
//!             println!("handled: {msg}");
//!             Ok(())
//!         });
//!
//!     dispatcher.submit(1).expect("dispatcher open");
//!     dispatcher.submit(2).expect("dispatcher open");
//!
//!     // Termination is scope-driven: stopping hands anything still queued
//!     // to the undelivered hook and closes the dispatcher for good.
//!     scope.stop(None).await;
//!     assert!(dispatcher.submit(3).is_err());
//! });
//! ```

pub mod dispatch;
mod mailbox;

pub use dispatch::{Builder, Dispatcher, HandlerError, SubmitError};

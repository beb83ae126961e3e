//! Execution scopes with cooperative, cause-carrying shutdown.
//!
//! # Overview
//!
//! This crate provides the lifecycle primitive long-lived tasks bind to: a
//! [Scope] that spawns work onto a tokio runtime and broadcasts a one-time
//! termination [Signal] carrying an optional [Fault]. Shutdown is entirely
//! cooperative; nothing is forcibly aborted. Tasks either await
//! [Scope::stopped] or probe [Scope::is_stopped] at iteration boundaries and
//! wind down on their own, holding their [Signal] until cleanup is done so
//! that [Scope::stop] can report full quiescence to its caller.

mod scope;
pub mod signal;

pub use scope::Scope;
pub use signal::{Fault, Signal};

//! The shared counter coordinating producers and the consumer.

use std::sync::atomic::{AtomicI64, Ordering};

/// Value the counter is pinned to once the owning scope has terminated.
const SEALED: i64 = i64::MIN;

/// What a submitter must do after its message was counted.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Admit {
    /// The dispatcher was idle; the submitter must spawn the consumer.
    First,
    /// A consumer is running (or about to start) and will drain this message.
    Queued,
    /// The scope has terminated; delivery cannot be guaranteed.
    Sealed,
}

/// What the consumer must do after retiring one message.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Settle {
    /// The backlog is drained; the consumer must exit.
    Idle,
    /// More messages are accounted for; keep going.
    Busy,
    /// The counter was sealed mid-flight; shutdown owns cleanup now.
    Sealed,
}

/// Counts messages appended but not yet fully handled, and doubles as the
/// lifecycle latch via the [SEALED] sentinel.
///
/// While non-negative, the value equals appends minus retirements. The same
/// atomic answers both coordination questions without a lock: a producer that
/// moves it 0 -> 1 knows it alone must start the consumer, and a consumer
/// that moves it 1 -> 0 knows it may stop. A concurrent append between
/// dequeue and retire keeps the value above zero, so the consumer cannot exit
/// with work still queued.
pub(crate) struct Pending(AtomicI64);

impl Pending {
    pub(crate) fn new() -> Self {
        Self(AtomicI64::new(0))
    }

    /// Count one appended message, reporting what the submitter must do.
    pub(crate) fn admit(&self) -> Admit {
        let prev = self.0.fetch_add(1, Ordering::SeqCst);
        if prev == 0 {
            Admit::First
        } else if prev > 0 {
            Admit::Queued
        } else {
            Admit::Sealed
        }
    }

    /// Retire one handled message.
    ///
    /// Never decrements a sealed counter: the sentinel must stay negative,
    /// and whoever sealed it owns the remaining cleanup.
    pub(crate) fn settle(&self) -> Settle {
        let mut current = self.0.load(Ordering::SeqCst);
        loop {
            if current < 0 {
                return Settle::Sealed;
            }
            debug_assert!(current > 0, "settle without a matching admit");
            match self
                .0
                .compare_exchange(current, current - 1, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => {
                    return if current == 1 {
                        Settle::Idle
                    } else {
                        Settle::Busy
                    }
                }
                Err(observed) => current = observed,
            }
        }
    }

    /// Pin the counter to the sealed sentinel.
    ///
    /// Unconditional overwrite: this runs at most once, strictly after the
    /// owning scope went inactive.
    pub(crate) fn seal(&self) {
        self.0.store(SEALED, Ordering::SeqCst);
    }
}

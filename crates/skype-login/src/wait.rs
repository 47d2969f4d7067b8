//! Blocking poll-with-timeout primitive used by every stage of the login flow.
//!
//! The target's windowing surface exposes no usable completion notification,
//! so waits are deliberately synchronous: evaluate a predicate, sleep a fixed
//! interval, repeat.

use std::thread;
use std::time::Duration;

use crate::cancel::CancelToken;

/// Result of one bounded poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The predicate returned `true`.
    Satisfied,
    /// The retry budget ran out before the predicate became true.
    TimedOut,
    /// The cancellation token latched between predicate evaluations.
    Cancelled,
}

impl PollOutcome {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, PollOutcome::Satisfied)
    }
}

/// Evaluates `predicate` every `interval` until it returns `true`, the
/// timeout elapses, or `cancel` latches.
///
/// The retry count is `timeout / interval` with integer division: the final
/// partial interval is never attempted, so the effective timeout can be
/// slightly shorter than requested. Transient "not ready" conditions inside
/// the predicate must be reported as `false`, not propagated.
pub fn poll_until(
    timeout: Duration,
    interval: Duration,
    cancel: &CancelToken,
    mut predicate: impl FnMut() -> bool,
) -> PollOutcome {
    let retries = timeout.as_millis() / interval.as_millis().max(1);
    for _ in 0..retries {
        if cancel.is_cancelled() {
            return PollOutcome::Cancelled;
        }
        if predicate() {
            return PollOutcome::Satisfied;
        }
        thread::sleep(interval);
    }
    if cancel.is_cancelled() {
        PollOutcome::Cancelled
    } else {
        PollOutcome::TimedOut
    }
}

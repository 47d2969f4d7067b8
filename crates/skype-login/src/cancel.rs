//! Two-phase cancellation shared between the login flow and the exit watcher.
//!
//! The token starts disarmed: a process exit observed while disarmed is a
//! restart condition, not a cancellation, so [`CancelToken::cancel`] is a
//! no-op until the state machine arms the token. Once armed, the first
//! `cancel` call latches the token; the latch is one-shot and is what every
//! poll loop checks between predicate evaluations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    armed: AtomicBool,
    cancelled: AtomicBool,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the token. From this point a process exit cancels the attempt.
    pub fn arm(&self) {
        self.inner.armed.store(true, Ordering::SeqCst);
    }

    /// Disarms the token once the flow has completed or failed.
    pub fn disarm(&self) {
        self.inner.armed.store(false, Ordering::SeqCst);
    }

    pub fn is_armed(&self) -> bool {
        self.inner.armed.load(Ordering::SeqCst)
    }

    /// Requests cancellation. Honored only while armed; returns whether this
    /// call latched the token.
    pub fn cancel(&self) -> bool {
        if !self.is_armed() {
            return false;
        }
        !self.inner.cancelled.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }
}

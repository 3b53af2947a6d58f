// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Cooperative cancellation.
//!
//! AtomicBool flag plus a wake list. Workers poll `is_cancelled()` at their
//! own boundaries; a `Select` run with a token is woken as soon as the token
//! fires and reports `Cancelled` instead of hanging.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::signal::{Signal, Watchers};

/// Outcome of a wait that was interrupted by its cancellation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Cancellation token shared between a coordinator and its workers.
#[derive(Default)]
pub struct CancelToken {
    flag: AtomicBool,
    watchers: Mutex<Watchers>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cancellation flag and wake every wait registered on it.
    pub fn cancel(&self) {
        if !self.flag.swap(true, Ordering::AcqRel) {
            tracing::debug!("cancellation requested");
            self.watchers.lock().notify_all();
        }
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub(crate) fn watch(&self, signal: &Arc<Signal>) {
        self.watchers.lock().register(signal);
    }

    pub(crate) fn unwatch(&self, signal: &Arc<Signal>) {
        self.watchers.lock().unregister(signal);
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_clear() {
        assert!(!CancelToken::new().is_cancelled());
    }

    #[test]
    fn cancel_is_sticky() {
        let t = CancelToken::new();
        t.cancel();
        t.cancel();
        assert!(t.is_cancelled());
    }

    #[test]
    fn cancel_notifies_watchers() {
        let t = CancelToken::new();
        let s = Signal::new();
        t.watch(&s);
        let seen = s.epoch();
        t.cancel();
        assert_ne!(s.epoch(), seen);
        t.unwatch(&s);
    }
}

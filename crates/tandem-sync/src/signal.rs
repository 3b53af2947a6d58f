// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Wake signal shared between a blocked waiter and the primitives it watches.
//!
//! A waiter reads the epoch, re-checks its condition, then sleeps until the
//! epoch moves. Anything that changes watched state bumps the epoch, so a
//! change between the check and the sleep is never lost.
//!
//! A `Claim` is the one-shot token a blocked select parks on its channels:
//! whichever counterpart claims it first completes that arm, and every
//! other entry sharing the token goes stale.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

pub(crate) struct Signal {
    epoch: Mutex<u64>,
    cvar: Condvar,
}

impl Signal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            epoch: Mutex::new(0),
            cvar: Condvar::new(),
        })
    }

    pub fn epoch(&self) -> u64 {
        *self.epoch.lock()
    }

    pub fn notify(&self) {
        let mut epoch = self.epoch.lock();
        *epoch = epoch.wrapping_add(1);
        self.cvar.notify_all();
    }

    /// Sleep until the epoch differs from `seen`.
    ///
    /// Returns `false` only if `deadline` passed with the epoch unchanged.
    pub fn wait_past(&self, seen: u64, deadline: Option<Instant>) -> bool {
        let mut epoch = self.epoch.lock();
        while *epoch == seen {
            match deadline {
                Some(deadline) => {
                    if self.cvar.wait_until(&mut epoch, deadline).timed_out() {
                        return *epoch != seen;
                    }
                }
                None => self.cvar.wait(&mut epoch),
            }
        }
        true
    }
}

/// Signals registered against one primitive. Dead entries are pruned lazily.
#[derive(Default)]
pub(crate) struct Watchers {
    list: Vec<Weak<Signal>>,
}

impl Watchers {
    pub fn register(&mut self, signal: &Arc<Signal>) {
        self.list.push(Arc::downgrade(signal));
    }

    pub fn unregister(&mut self, signal: &Arc<Signal>) {
        let target = Arc::as_ptr(signal);
        self.list.retain(|w| w.as_ptr() != target && w.strong_count() > 0);
    }

    pub fn notify_all(&mut self) {
        self.list.retain(|w| match w.upgrade() {
            Some(signal) => {
                signal.notify();
                true
            }
            None => false,
        });
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.list.len()
    }
}

const OPEN: usize = usize::MAX;
const WITHDRAWN: usize = usize::MAX - 1;

/// One round of a blocked select. Open until a counterpart claims one of
/// its arms or the select withdraws it.
pub(crate) struct Claim {
    state: AtomicUsize,
    signal: Arc<Signal>,
}

impl Claim {
    pub fn new(signal: Arc<Signal>) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicUsize::new(OPEN),
            signal,
        })
    }

    pub fn is_open(&self) -> bool {
        self.state.load(Ordering::Acquire) == OPEN
    }

    /// Win the round for `arm`. Only the first claim succeeds; it wakes the
    /// select.
    pub fn try_claim(&self, arm: usize) -> bool {
        let won = self
            .state
            .compare_exchange(OPEN, arm, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.signal.notify();
        }
        won
    }

    /// Close the round from the select's side. Returns the arm a
    /// counterpart claimed first, if any.
    pub fn withdraw(&self) -> Option<usize> {
        match self
            .state
            .compare_exchange(OPEN, WITHDRAWN, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) | Err(WITHDRAWN) => None,
            Err(arm) => Some(arm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn notify_moves_epoch() {
        let s = Signal::new();
        let seen = s.epoch();
        s.notify();
        assert!(s.wait_past(seen, None));
    }

    #[test]
    fn wait_past_times_out() {
        let s = Signal::new();
        let seen = s.epoch();
        let deadline = Instant::now() + Duration::from_millis(10);
        assert!(!s.wait_past(seen, Some(deadline)));
    }

    #[test]
    fn watchers_prune_dropped_signals() {
        let mut w = Watchers::default();
        let a = Signal::new();
        let b = Signal::new();
        w.register(&a);
        w.register(&b);
        drop(b);
        w.notify_all();
        assert_eq!(w.len(), 1);
        w.unregister(&a);
        assert_eq!(w.len(), 0);
    }

    #[test]
    fn claim_is_one_shot() {
        let s = Signal::new();
        let seen = s.epoch();
        let c = Claim::new(s.clone());
        assert!(c.try_claim(2));
        assert!(!c.try_claim(0));
        assert!(!c.is_open());
        assert_ne!(s.epoch(), seen);
        assert_eq!(c.withdraw(), Some(2));
    }

    #[test]
    fn withdrawn_claim_rejects_counterparts() {
        let c = Claim::new(Signal::new());
        assert_eq!(c.withdraw(), None);
        assert!(!c.try_claim(1));
        assert_eq!(c.withdraw(), None);
    }

    #[test]
    fn notify_wakes_sleeper() {
        let s = Signal::new();
        let seen = s.epoch();
        let s2 = s.clone();
        let h = std::thread::spawn(move || s2.wait_past(seen, None));
        std::thread::sleep(Duration::from_millis(10));
        s.notify();
        assert!(h.join().unwrap());
    }
}

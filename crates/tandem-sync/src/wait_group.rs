// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Completion-counting join barrier.
//!
//! `add(n)` before starting n workers, `done()` as each finishes, `wait()`
//! until the count is back to zero. All concurrent waiters are released
//! together. The group may be reused once every waiter of the previous
//! round has returned.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::spawn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitGroupError {
    /// `add` would take the counter below zero.
    #[error("negative wait group counter: {counter} + ({delta})")]
    Negative { counter: usize, delta: isize },
    /// `add` started a new round while waiters of the last one were still
    /// being released.
    #[error("wait group reused before previous wait returned")]
    ReusedBeforeWaitReturned,
}

#[derive(Default)]
struct State {
    counter: usize,
    /// Threads inside `wait`, including released ones not yet returned.
    waiters: usize,
    /// Bumped each time the counter reaches zero.
    generation: u64,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    cvar: Condvar,
}

/// Join barrier handle. Clones share the same counter.
#[derive(Clone, Default)]
pub struct WaitGroup {
    inner: Arc<Inner>,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adjust the counter by `delta`. A rejected call leaves it unchanged.
    pub fn add(&self, delta: isize) -> Result<(), WaitGroupError> {
        let mut s = self.inner.state.lock();
        let next = (s.counter as isize).checked_add(delta).filter(|n| *n >= 0);
        let Some(next) = next else {
            tracing::warn!(counter = s.counter, delta, "negative wait group counter");
            return Err(WaitGroupError::Negative {
                counter: s.counter,
                delta,
            });
        };
        if s.counter == 0 && delta > 0 && s.waiters > 0 {
            tracing::warn!(waiters = s.waiters, "wait group reused before wait returned");
            return Err(WaitGroupError::ReusedBeforeWaitReturned);
        }

        s.counter = next as usize;
        if s.counter == 0 && delta != 0 {
            s.generation += 1;
            tracing::trace!(waiters = s.waiters, "wait group released");
            self.inner.cvar.notify_all();
        }
        Ok(())
    }

    /// Mark one worker finished. Same as `add(-1)`.
    pub fn done(&self) -> Result<(), WaitGroupError> {
        self.add(-1)
    }

    /// Block until the counter is zero. Returns at once if it already is.
    pub fn wait(&self) {
        let mut s = self.inner.state.lock();
        if s.counter == 0 {
            return;
        }
        s.waiters += 1;
        let gen = s.generation;
        while s.generation == gen {
            self.inner.cvar.wait(&mut s);
        }
        s.waiters -= 1;
    }

    /// Like `wait`, giving up after `timeout`. Returns `true` if released.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut s = self.inner.state.lock();
        if s.counter == 0 {
            return true;
        }
        s.waiters += 1;
        let gen = s.generation;
        while s.generation == gen {
            if self.inner.cvar.wait_until(&mut s, deadline).timed_out() {
                break;
            }
        }
        s.waiters -= 1;
        s.generation != gen
    }

    pub fn count(&self) -> usize {
        self.inner.state.lock().counter
    }

    /// Count a new worker in and start it. `done` runs when `f` returns or
    /// unwinds.
    pub fn go<F>(&self, f: F) -> Result<(), WaitGroupError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.add(1)?;
        let done = DoneOnDrop(self.clone());
        spawn::spawn(move || {
            let _done = done;
            f();
        })
        .detach();
        Ok(())
    }
}

impl std::fmt::Debug for WaitGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitGroup")
            .field("count", &self.count())
            .finish()
    }
}

struct DoneOnDrop(WaitGroup);

impl Drop for DoneOnDrop {
    fn drop(&mut self) {
        if let Err(err) = self.0.done() {
            tracing::warn!(%err, "worker started by `go` could not mark itself done");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn wait_on_zero_returns_immediately() {
        let wg = WaitGroup::new();
        wg.wait();
        assert!(wg.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn add_then_done_releases_waiter() {
        let wg = WaitGroup::new();
        wg.add(5).unwrap();
        for _ in 0..5 {
            let wg = wg.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(5));
                wg.done().unwrap();
            });
        }
        wg.wait();
        assert_eq!(wg.count(), 0);
    }

    #[test]
    fn negative_counter_rejected() {
        let wg = WaitGroup::new();
        assert_eq!(
            wg.done(),
            Err(WaitGroupError::Negative {
                counter: 0,
                delta: -1
            })
        );
        wg.add(2).unwrap();
        assert!(wg.add(-3).is_err());
        assert_eq!(wg.count(), 2);
    }

    #[test]
    fn multiple_waiters_released_together() {
        let wg = WaitGroup::new();
        wg.add(1).unwrap();
        let released = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];
        for _ in 0..4 {
            let wg = wg.clone();
            let released = released.clone();
            handles.push(thread::spawn(move || {
                wg.wait();
                released.fetch_add(1, Ordering::SeqCst);
            }));
        }
        thread::sleep(Duration::from_millis(20));
        assert_eq!(released.load(Ordering::SeqCst), 0);
        wg.done().unwrap();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(released.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn wait_timeout_expires() {
        let wg = WaitGroup::new();
        wg.add(1).unwrap();
        assert!(!wg.wait_timeout(Duration::from_millis(10)));
        wg.done().unwrap();
        assert!(wg.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn reusable_after_drain() {
        let wg = WaitGroup::new();
        wg.add(1).unwrap();
        wg.done().unwrap();
        wg.wait();
        wg.add(1).unwrap();
        wg.done().unwrap();
        wg.wait();
    }

    #[test]
    fn go_survives_worker_that_marks_done_itself() {
        let wg = WaitGroup::new();
        let inner = wg.clone();
        wg.go(move || inner.done().unwrap()).unwrap();
        wg.wait();
        // The worker's own done already drained the counter; the automatic
        // one is rejected instead of wrapping below zero.
        thread::sleep(Duration::from_millis(20));
        assert_eq!(wg.count(), 0);
        wg.add(1).unwrap();
        assert_eq!(wg.count(), 1);
    }

    #[test]
    fn go_counts_panicking_worker_done() {
        let wg = WaitGroup::new();
        let hits = Arc::new(AtomicUsize::new(0));
        for i in 0..8 {
            let hits = hits.clone();
            wg.go(move || {
                if i == 3 {
                    panic!("worker failure");
                }
                hits.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }
        wg.wait();
        assert_eq!(hits.load(Ordering::SeqCst), 7);
    }
}

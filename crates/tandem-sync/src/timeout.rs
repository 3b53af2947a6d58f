// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Sleep, timer channels and bounded waits.
//!
//! Timers are a thread plus a one-slot channel, so they compose with
//! `Select` like any other receiver.

use std::time::Duration;

use thiserror::Error;

use crate::channel::{self, Receiver, RecvTimeoutError};

/// Sleep the current thread for the given duration.
pub fn sleep(duration: Duration) {
    std::thread::sleep(duration);
}

/// Create a one-shot timer that fires after `duration`.
///
/// Returns a `Receiver<()>` that receives `()` after the delay and is then
/// closed. Dropping the receiver cancels the timer (the thread finishes but
/// its send fails silently).
pub fn after(duration: Duration) -> Receiver<()> {
    let (tx, rx) = channel::buffered(1);
    std::thread::spawn(move || {
        std::thread::sleep(duration);
        let _ = tx.send(());
    });
    rx
}

/// Error from `with_timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimeoutError {
    #[error("operation timed out")]
    Elapsed,
    /// The closure panicked before producing a value.
    #[error("operation panicked")]
    Abandoned,
}

/// Run a closure with a timeout. Returns `Err(Elapsed)` if the closure
/// doesn't complete within `duration`; the closure keeps running detached.
pub fn with_timeout<T, F>(duration: Duration, f: F) -> Result<T, TimeoutError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = channel::buffered(1);
    std::thread::spawn(move || {
        let result = f();
        let _ = tx.send(result);
    });

    match rx.recv_timeout(duration) {
        Ok(val) => Ok(val),
        Err(RecvTimeoutError::Timeout) => Err(TimeoutError::Elapsed),
        // Sender dropped during unwind.
        Err(RecvTimeoutError::Closed) => Err(TimeoutError::Abandoned),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::Select;

    #[test]
    fn sleep_short() {
        let start = std::time::Instant::now();
        sleep(Duration::from_millis(10));
        assert!(start.elapsed() >= Duration::from_millis(9));
    }

    #[test]
    fn after_fires_once_then_closes() {
        let rx = after(Duration::from_millis(10));
        assert_eq!(rx.recv(), Some(()));
        assert_eq!(rx.recv(), None);
    }

    #[test]
    fn timer_in_select() {
        let (_tx, idle) = channel::rendezvous::<u32>();
        let timer = after(Duration::from_millis(10));
        let fired = Select::new()
            .recv(&idle, |_| false)
            .recv(&timer, |_| true)
            .run();
        assert!(fired);
    }

    #[test]
    fn timeout_completes() {
        let result = with_timeout(Duration::from_secs(1), || 42);
        assert_eq!(result, Ok(42));
    }

    #[test]
    fn timeout_expires() {
        let result = with_timeout(Duration::from_millis(10), || {
            std::thread::sleep(Duration::from_secs(10));
            42
        });
        assert_eq!(result, Err(TimeoutError::Elapsed));
    }

    #[test]
    fn timeout_reports_panic() {
        let result = with_timeout(Duration::from_secs(1), || -> i32 { panic!("nope") });
        assert_eq!(result, Err(TimeoutError::Abandoned));
    }
}

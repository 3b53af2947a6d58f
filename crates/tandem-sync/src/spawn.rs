// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Spawn/join/detach/cancel for OS-thread workers.
//!
//! `spawn` starts a thread and returns an affine `TaskHandle` that must be
//! joined, detached, or cancelled. Each task carries its own `CancelToken`,
//! reachable from inside the task via `cancelled()` and `current_token()`.

use std::cell::RefCell;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use thiserror::Error;

use crate::cancel::CancelToken;

/// Error returned by `join()` when the task failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    /// Task panicked with the given message.
    #[error("task panicked: {0}")]
    Panicked(String),
    /// Task was cancelled and did not finish normally.
    #[error("task was cancelled")]
    Cancelled,
}

/// Affine task handle.
///
/// Must be consumed via `join()`, `detach()`, or `cancel()`.
pub struct TaskHandle<T> {
    handle: Option<JoinHandle<Result<T, String>>>,
    cancel_token: Arc<CancelToken>,
}

impl<T> TaskHandle<T> {
    /// Wait for the task to complete, returning its result.
    pub fn join(mut self) -> Result<T, JoinError> {
        match self.handle.take() {
            Some(jh) => collect(jh).map_err(JoinError::Panicked),
            None => Err(JoinError::Panicked("handle already consumed".to_string())),
        }
    }

    /// Fire-and-forget. The thread keeps running on its own.
    pub fn detach(mut self) {
        self.handle.take();
    }

    /// Request cooperative cancellation, then wait for exit.
    pub fn cancel(mut self) -> Result<T, JoinError> {
        self.cancel_token.cancel();
        match self.handle.take() {
            Some(jh) => collect(jh).map_err(|_| JoinError::Cancelled),
            None => Err(JoinError::Cancelled),
        }
    }

    /// The task's cancellation token.
    pub fn token(&self) -> &Arc<CancelToken> {
        &self.cancel_token
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |jh| jh.is_finished())
    }
}

fn collect<T>(jh: JoinHandle<Result<T, String>>) -> Result<T, String> {
    match jh.join() {
        Ok(res) => res,
        Err(_) => Err("thread panicked".to_string()),
    }
}

impl<T> Drop for TaskHandle<T> {
    fn drop(&mut self) {
        if self.handle.is_some() && !thread::panicking() {
            panic!("TaskHandle dropped without being joined, detached, or cancelled");
        }
    }
}

/// Spawn a new task on an OS thread.
pub fn spawn<T, F>(f: F) -> TaskHandle<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let cancel_token = Arc::new(CancelToken::new());
    let token_clone = cancel_token.clone();

    let handle = thread::spawn(move || {
        CANCEL_TOKEN.with(|cell| {
            *cell.borrow_mut() = Some(token_clone);
        });
        // Catch panics and convert to Result
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)).map_err(|e| {
            let msg = if let Some(s) = e.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = e.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            tracing::debug!(panic = %msg, "task panicked");
            msg
        })
    });

    TaskHandle {
        handle: Some(handle),
        cancel_token,
    }
}

/// Spawn `n` workers over one shared read-only context.
///
/// Worker `i` runs `f(i, &ctx)`. Mutable state belongs in the context
/// behind a `Mutex`/`RwMutex`, never in globals.
pub fn spawn_workers<C, T, F>(n: usize, ctx: Arc<C>, f: F) -> Vec<TaskHandle<T>>
where
    C: Send + Sync + 'static,
    T: Send + 'static,
    F: Fn(usize, &C) -> T + Send + Sync + 'static,
{
    let f = Arc::new(f);
    (0..n)
        .map(|i| {
            let ctx = ctx.clone();
            let f = f.clone();
            spawn(move || f(i, &ctx))
        })
        .collect()
}

/// Join every handle, in order. Stops at the first failure; the remaining
/// handles are still joined so none is leaked.
pub fn join_all<T>(handles: Vec<TaskHandle<T>>) -> Result<Vec<T>, JoinError> {
    let mut out = Vec::with_capacity(handles.len());
    let mut first_err = None;
    for h in handles {
        match h.join() {
            Ok(v) => out.push(v),
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(out),
    }
}

/// Check if the current task has been cancelled.
pub fn cancelled() -> bool {
    CANCEL_TOKEN.with(|cell| {
        cell.borrow()
            .as_ref()
            .is_some_and(|t| t.is_cancelled())
    })
}

/// The current task's token, if running inside `spawn`.
pub fn current_token() -> Option<Arc<CancelToken>> {
    CANCEL_TOKEN.with(|cell| cell.borrow().clone())
}

thread_local! {
    static CANCEL_TOKEN: RefCell<Option<Arc<CancelToken>>> = const { RefCell::new(None) };
}

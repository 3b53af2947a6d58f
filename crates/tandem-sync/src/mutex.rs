// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Mutex with FIFO hand-off.
//!
//! Ticket lock: each `lock` draws a ticket and waits until it is served,
//! so waiters acquire in arrival order and none starves. Unlocking is the
//! guard's drop, which rules out double unlock and unlock-without-lock.

use std::cell::UnsafeCell;
use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex as ParkingMutex};

struct Tickets {
    next: u64,
    serving: u64,
    /// Tickets whose holders gave up waiting; skipped when serving.
    abandoned: BTreeSet<u64>,
}

impl Tickets {
    fn draw(&mut self) -> u64 {
        let ticket = self.next;
        self.next += 1;
        ticket
    }

    fn advance(&mut self) {
        self.serving += 1;
        while self.abandoned.remove(&self.serving) {
            self.serving += 1;
        }
    }

    fn is_locked(&self) -> bool {
        self.serving != self.next
    }
}

/// Exclusive-access wrapper around `T`.
pub struct Mutex<T: ?Sized> {
    tickets: ParkingMutex<Tickets>,
    cvar: Condvar,
    data: UnsafeCell<T>,
}

// Safety: access to `data` is serialized by the ticket protocol.
unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Create a new unlocked mutex wrapping `value`.
    pub fn new(value: T) -> Self {
        Self {
            tickets: ParkingMutex::new(Tickets {
                next: 0,
                serving: 0,
                abandoned: BTreeSet::new(),
            }),
            cvar: Condvar::new(),
            data: UnsafeCell::new(value),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> Mutex<T> {
    /// Block until the lock is ours. Waiters are served in arrival order.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        let mut t = self.tickets.lock();
        let ticket = t.draw();
        while t.serving != ticket {
            self.cvar.wait(&mut t);
        }
        MutexGuard { lock: self }
    }

    /// Acquire only if the lock is free and nobody is queued.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        let mut t = self.tickets.lock();
        if t.is_locked() {
            return None;
        }
        t.draw();
        Some(MutexGuard { lock: self })
    }

    /// Wait at most `timeout` for the lock. On timeout the ticket is
    /// abandoned and the queue moves past it.
    pub fn lock_timeout(&self, timeout: Duration) -> Option<MutexGuard<'_, T>> {
        let deadline = Instant::now() + timeout;
        let mut t = self.tickets.lock();
        let ticket = t.draw();
        while t.serving != ticket {
            if self.cvar.wait_until(&mut t, deadline).timed_out() && t.serving != ticket {
                t.abandoned.insert(ticket);
                tracing::trace!(ticket, "mutex wait timed out");
                return None;
            }
        }
        Some(MutexGuard { lock: self })
    }

    /// Run `f` with exclusive access.
    pub fn with_lock<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    pub fn is_locked(&self) -> bool {
        self.tickets.lock().is_locked()
    }

    /// Direct access through `&mut self`; no locking needed.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    fn unlock(&self) {
        let mut t = self.tickets.lock();
        t.advance();
        self.cvar.notify_all();
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Mutex");
        match self.try_lock() {
            Some(guard) => d.field("data", &&*guard),
            None => d.field("data", &format_args!("<locked>")),
        };
        d.finish()
    }
}

/// Held lock. Dropping it unlocks and serves the next ticket.
#[must_use = "dropping the guard unlocks the mutex immediately"]
pub struct MutexGuard<'a, T: ?Sized> {
    lock: &'a Mutex<T>,
}

unsafe impl<T: ?Sized + Sync> Sync for MutexGuard<'_, T> {}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the guard proves the ticket is being served.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for MutexGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

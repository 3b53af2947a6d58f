// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Reader/writer lock.
//!
//! Many readers or one writer. A waiting writer blocks new readers, so a
//! steady stream of reads cannot starve writes. Readers that were already
//! queued when a writer releases are let in before the next writer, so a
//! stream of writes cannot starve reads either. Writers queue in FIFO order.

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};

use parking_lot::{Condvar, Mutex as ParkingMutex};

/// Snapshot of the lock's occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RwState {
    pub readers: usize,
    pub writer_active: bool,
}

#[derive(Default)]
struct State {
    readers: usize,
    writer_active: bool,
    writers_waiting: usize,
    readers_waiting: usize,
    /// Queued readers admitted ahead of waiting writers by the last write release.
    passed_readers: usize,
    /// Bumped on every write release.
    write_gen: u64,
    next_writer: u64,
    serving_writer: u64,
}

impl State {
    fn can_read_fast(&self) -> bool {
        !self.writer_active && self.writers_waiting == 0
    }

    fn can_write_now(&self) -> bool {
        !self.writer_active && self.readers == 0 && self.passed_readers == 0
    }
}

/// Read-heavy shared state. Multiple readers concurrent, exclusive writer.
pub struct RwMutex<T: ?Sized> {
    state: ParkingMutex<State>,
    cvar: Condvar,
    data: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Send for RwMutex<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for RwMutex<T> {}

impl<T> RwMutex<T> {
    /// Create a new shared value.
    pub fn new(value: T) -> Self {
        Self {
            state: ParkingMutex::new(State::default()),
            cvar: Condvar::new(),
            data: UnsafeCell::new(value),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> RwMutex<T> {
    /// Shared access. Blocks while a writer holds or waits for the lock.
    pub fn read(&self) -> ReadGuard<'_, T> {
        let mut s = self.state.lock();
        if s.can_read_fast() {
            s.readers += 1;
            return ReadGuard { lock: self };
        }

        s.readers_waiting += 1;
        let gen = s.write_gen;
        while s.writer_active || (s.writers_waiting > 0 && s.write_gen == gen) {
            self.cvar.wait(&mut s);
        }
        s.readers_waiting -= 1;
        if s.write_gen != gen {
            s.passed_readers = s.passed_readers.saturating_sub(1);
        }
        s.readers += 1;
        ReadGuard { lock: self }
    }

    /// Exclusive access. Blocks until all readers and earlier writers finish.
    pub fn write(&self) -> WriteGuard<'_, T> {
        let mut s = self.state.lock();
        s.writers_waiting += 1;
        let ticket = s.next_writer;
        s.next_writer += 1;
        while !(s.can_write_now() && s.serving_writer == ticket) {
            self.cvar.wait(&mut s);
        }
        s.writers_waiting -= 1;
        s.writer_active = true;
        WriteGuard { lock: self }
    }

    /// Try shared access without blocking.
    pub fn try_read(&self) -> Option<ReadGuard<'_, T>> {
        let mut s = self.state.lock();
        if !s.can_read_fast() {
            return None;
        }
        s.readers += 1;
        Some(ReadGuard { lock: self })
    }

    /// Try exclusive access without blocking.
    pub fn try_write(&self) -> Option<WriteGuard<'_, T>> {
        let mut s = self.state.lock();
        if !s.can_write_now() || s.writers_waiting > 0 {
            return None;
        }
        s.next_writer += 1;
        s.writer_active = true;
        Some(WriteGuard { lock: self })
    }

    /// Run `f` with shared access.
    pub fn with_read<R, F: FnOnce(&T) -> R>(&self, f: F) -> R {
        let guard = self.read();
        f(&guard)
    }

    /// Run `f` with exclusive access.
    pub fn with_write<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> R {
        let mut guard = self.write();
        f(&mut guard)
    }

    pub fn state(&self) -> RwState {
        let s = self.state.lock();
        RwState {
            readers: s.readers,
            writer_active: s.writer_active,
        }
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    fn read_unlock(&self) {
        let mut s = self.state.lock();
        s.readers -= 1;
        if s.readers == 0 {
            self.cvar.notify_all();
        }
    }

    fn write_unlock(&self) {
        let mut s = self.state.lock();
        s.writer_active = false;
        s.serving_writer += 1;
        s.write_gen += 1;
        s.passed_readers = s.readers_waiting;
        self.cvar.notify_all();
    }
}

impl<T: Default> Default for RwMutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for RwMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("RwMutex");
        match self.try_read() {
            Some(guard) => d.field("data", &&*guard),
            None => d.field("data", &format_args!("<locked>")),
        };
        d.finish()
    }
}

#[must_use = "dropping the guard releases the read lock immediately"]
pub struct ReadGuard<'a, T: ?Sized> {
    lock: &'a RwMutex<T>,
}

impl<T: ?Sized> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: readers > 0 excludes any writer.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.read_unlock();
    }
}

#[must_use = "dropping the guard releases the write lock immediately"]
pub struct WriteGuard<'a, T: ?Sized> {
    lock: &'a RwMutex<T>,
}

unsafe impl<T: ?Sized + Sync> Sync for WriteGuard<'_, T> {}

impl<T: ?Sized> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // Safety: writer_active excludes readers and other writers.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.write_unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn read_concurrent() {
        let s = Arc::new(RwMutex::new(42));
        let mut handles = vec![];
        for _ in 0..10 {
            let s = s.clone();
            handles.push(thread::spawn(move || {
                s.with_read(|v| assert_eq!(*v, 42));
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn readers_share() {
        let s = RwMutex::new(1);
        let a = s.read();
        let b = s.read();
        assert_eq!(*a + *b, 2);
        assert_eq!(
            s.state(),
            RwState {
                readers: 2,
                writer_active: false
            }
        );
        assert!(s.try_write().is_none());
    }

    #[test]
    fn write_exclusive() {
        let s = RwMutex::new(0);
        s.with_write(|v| *v = 42);
        assert_eq!(s.with_read(|v| *v), 42);
        let w = s.write();
        assert!(s.try_read().is_none());
        assert!(s.state().writer_active);
        drop(w);
        assert_eq!(s.state().readers, 0);
    }

    #[test]
    fn waiting_writer_blocks_new_readers() {
        let s = Arc::new(RwMutex::new(0));
        let r = s.read();
        let s2 = s.clone();
        let writer = thread::spawn(move || s2.with_write(|v| *v += 1));
        while s.state.lock().writers_waiting == 0 {
            thread::yield_now();
        }
        assert!(s.try_read().is_none());
        drop(r);
        writer.join().unwrap();
        assert_eq!(s.with_read(|v| *v), 1);
    }

    #[test]
    fn queued_readers_go_before_next_writer() {
        let s = Arc::new(RwMutex::new(Vec::new()));
        let w = s.write();

        let s_r = s.clone();
        let reader = thread::spawn(move || s_r.with_read(|v| v.len()));
        while s.state.lock().readers_waiting == 0 {
            thread::yield_now();
        }
        let s_w = s.clone();
        let writer = thread::spawn(move || s_w.with_write(|v| v.push("second")));
        while s.state.lock().writers_waiting == 0 {
            thread::yield_now();
        }

        drop(w);
        // The reader queued before the second writer sees the vec untouched.
        assert_eq!(reader.join().unwrap(), 0);
        writer.join().unwrap();
        assert_eq!(s.with_read(|v| v.clone()), vec!["second"]);
    }

    #[test]
    fn concurrent_read_write() {
        let s = Arc::new(RwMutex::new(0));
        let mut handles = vec![];
        for i in 0..10 {
            let s = s.clone();
            handles.push(thread::spawn(move || {
                if i % 2 == 0 {
                    s.with_write(|v| *v += 1);
                } else {
                    s.with_read(|v| {
                        let _ = *v;
                        thread::sleep(Duration::from_millis(1));
                    });
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        // 5 writers, each adding 1
        assert_eq!(s.with_read(|v| *v), 5);
    }
}

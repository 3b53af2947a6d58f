// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Channels: bounded FIFO queues with an explicit, one-shot close.
//!
//! Capacity 0 is a rendezvous channel: `send` returns only once a receiver
//! has taken the value. Capacity `n > 0` buffers up to `n` values and blocks
//! senders while the buffer is full.
//!
//! Both halves are cloneable. `Sender::close` may be called once; dropping
//! the last sender closes the channel implicitly, dropping the last receiver
//! disconnects it. After close, buffered values stay receivable until
//! drained, then `recv` returns `None` without blocking.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::signal::{Claim, Signal, Watchers};

/// Error from a blocking send. The unsent value is handed back.
#[derive(Error)]
pub enum SendError<T> {
    /// The channel was closed before the value was taken.
    #[error("send on closed channel")]
    Closed(T),
    /// Every receiver was dropped.
    #[error("send on channel with no receivers")]
    Disconnected(T),
}

#[derive(Error)]
pub enum TrySendError<T> {
    /// Buffer is full, or no receiver is waiting on a rendezvous channel.
    #[error("channel full")]
    Full(T),
    #[error("send on closed channel")]
    Closed(T),
    #[error("send on channel with no receivers")]
    Disconnected(T),
}

#[derive(Error)]
pub enum SendTimeoutError<T> {
    #[error("send timed out")]
    Timeout(T),
    #[error("send on closed channel")]
    Closed(T),
    #[error("send on channel with no receivers")]
    Disconnected(T),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TryRecvError {
    /// No value available right now.
    #[error("channel empty")]
    Empty,
    /// Closed and drained.
    #[error("channel closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecvTimeoutError {
    #[error("receive timed out")]
    Timeout,
    #[error("channel closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CloseError {
    #[error("close of closed channel")]
    AlreadyClosed,
}

macro_rules! value_error_impls {
    ($ty:ident { $($variant:ident),+ }) => {
        impl<T> $ty<T> {
            /// Recover the value that was not sent.
            pub fn into_inner(self) -> T {
                match self {
                    $($ty::$variant(v) => v,)+
                }
            }
        }

        // Manual so that `T` need not be `Debug`.
        impl<T> fmt::Debug for $ty<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $($ty::$variant(_) => f.write_str(concat!(stringify!($variant), "(..)")),)+
                }
            }
        }
    };
}

value_error_impls!(SendError { Closed, Disconnected });
value_error_impls!(TrySendError { Full, Closed, Disconnected });
value_error_impls!(SendTimeoutError { Timeout, Closed, Disconnected });

/// Create a channel holding up to `cap` values. `cap == 0` is a rendezvous.
pub fn bounded<T>(cap: usize) -> (Sender<T>, Receiver<T>) {
    let chan = Arc::new(Chan {
        state: Mutex::new(State {
            buf: VecDeque::new(),
            cap,
            closed: false,
            next_waiter: 0,
            sendq: VecDeque::new(),
            recvq: VecDeque::new(),
            handoff: HashMap::new(),
            senders: 1,
            receivers: 1,
            watchers: Watchers::default(),
        }),
        cvar: Condvar::new(),
    });
    (
        Sender {
            chan: chan.clone(),
        },
        Receiver { chan },
    )
}

/// Create a buffered channel with capacity `n`.
pub fn buffered<T>(n: usize) -> (Sender<T>, Receiver<T>) {
    bounded(n)
}

/// Create an unbuffered (rendezvous) channel.
pub fn rendezvous<T>() -> (Sender<T>, Receiver<T>) {
    bounded(0)
}

/// A parked sender or receiver. Select entries share one `Claim` per round
/// and must win it before a hand-off goes through them.
struct Waiter {
    id: u64,
    select: Option<(Arc<Claim>, usize)>,
}

impl Waiter {
    fn plain(id: u64) -> Self {
        Self { id, select: None }
    }

    fn select(id: u64, claim: &Arc<Claim>, arm: usize) -> Self {
        Self {
            id,
            select: Some((claim.clone(), arm)),
        }
    }

    /// Reserve this waiter for a hand-off. Plain waiters always accept.
    fn claim(&self) -> bool {
        match &self.select {
            None => true,
            Some((claim, arm)) => claim.try_claim(*arm),
        }
    }

    /// Whether a hand-off could go through this waiter, ignoring entries
    /// that belong to `own`.
    fn claimable_by(&self, own: &Arc<Claim>) -> bool {
        match &self.select {
            None => true,
            Some((claim, _)) => !Arc::ptr_eq(claim, own) && claim.is_open(),
        }
    }
}

struct State<T> {
    buf: VecDeque<T>,
    cap: usize,
    closed: bool,
    next_waiter: u64,
    /// Senders parked with their value while the buffer is full.
    sendq: VecDeque<(Waiter, T)>,
    /// Receivers parked waiting for a direct hand-off. Stale select entries
    /// are dropped as they are reached.
    recvq: VecDeque<Waiter>,
    handoff: HashMap<u64, T>,
    senders: usize,
    receivers: usize,
    watchers: Watchers,
}

impl<T> State<T> {
    fn waiter_id(&mut self) -> u64 {
        let id = self.next_waiter;
        self.next_waiter += 1;
        id
    }

    /// Non-blocking send path shared by every send flavour.
    fn offer(&mut self, val: T) -> Result<(), TrySendError<T>> {
        if self.closed {
            return Err(TrySendError::Closed(val));
        }
        if self.receivers == 0 {
            return Err(TrySendError::Disconnected(val));
        }
        while let Some(waiter) = self.recvq.pop_front() {
            if waiter.claim() {
                self.handoff.insert(waiter.id, val);
                return Ok(());
            }
        }
        if self.buf.len() < self.cap {
            self.buf.push_back(val);
            return Ok(());
        }
        Err(TrySendError::Full(val))
    }

    /// Non-blocking receive path. Parked senders are not drained once the
    /// channel is closed; they reclaim their values and fail.
    fn take(&mut self) -> Result<T, TryRecvError> {
        if let Some(val) = self.buf.pop_front() {
            if !self.closed {
                if let Some(parked) = self.claim_sender() {
                    self.buf.push_back(parked);
                }
            }
            return Ok(val);
        }
        if self.closed {
            return Err(TryRecvError::Closed);
        }
        self.claim_sender().ok_or(TryRecvError::Empty)
    }

    /// Take the value of the first parked sender that accepts the claim.
    /// Stale select entries stay queued until their owner reclaims them.
    fn claim_sender(&mut self) -> Option<T> {
        let pos = self.sendq.iter().position(|(w, _)| w.claim())?;
        self.sendq.remove(pos).map(|(_, val)| val)
    }

    /// A receive would complete now, not counting entries of `own`.
    fn recv_ready(&self, own: &Arc<Claim>) -> bool {
        self.closed
            || !self.buf.is_empty()
            || self.sendq.iter().any(|(w, _)| w.claimable_by(own))
    }

    /// A send would complete now, not counting entries of `own`.
    fn send_ready(&self, own: &Arc<Claim>) -> bool {
        self.closed
            || self.receivers == 0
            || self.buf.len() < self.cap
            || self.recvq.iter().any(|w| w.claimable_by(own))
    }

    fn is_parked(&self, id: u64) -> bool {
        self.sendq.iter().any(|(w, _)| w.id == id)
    }

    fn reclaim(&mut self, id: u64) -> Option<T> {
        let pos = self.sendq.iter().position(|(w, _)| w.id == id)?;
        self.sendq.remove(pos).map(|(_, val)| val)
    }
}

struct Chan<T> {
    state: Mutex<State<T>>,
    cvar: Condvar,
}

impl<T> Chan<T> {
    fn wake(&self, state: &mut State<T>) {
        self.cvar.notify_all();
        state.watchers.notify_all();
    }

    fn try_send(&self, val: T) -> Result<(), TrySendError<T>> {
        let mut st = self.state.lock();
        let res = st.offer(val);
        if res.is_ok() {
            self.wake(&mut st);
        }
        res
    }

    fn send_until(&self, val: T, deadline: Option<Instant>) -> Result<(), SendTimeoutError<T>> {
        let mut st = self.state.lock();
        let val = match st.offer(val) {
            Ok(()) => {
                self.wake(&mut st);
                return Ok(());
            }
            Err(TrySendError::Full(v)) => v,
            Err(TrySendError::Closed(v)) => return Err(SendTimeoutError::Closed(v)),
            Err(TrySendError::Disconnected(v)) => return Err(SendTimeoutError::Disconnected(v)),
        };

        let id = st.waiter_id();
        st.sendq.push_back((Waiter::plain(id), val));
        // A parked value is receivable on a rendezvous channel.
        self.wake(&mut st);

        let mut expired = false;
        loop {
            if st.closed || st.receivers == 0 || expired {
                return match st.reclaim(id) {
                    None => Ok(()),
                    Some(v) if st.closed => Err(SendTimeoutError::Closed(v)),
                    Some(v) if st.receivers == 0 => Err(SendTimeoutError::Disconnected(v)),
                    Some(v) => Err(SendTimeoutError::Timeout(v)),
                };
            }
            if !st.is_parked(id) {
                return Ok(());
            }
            match deadline {
                Some(deadline) => {
                    expired = self.cvar.wait_until(&mut st, deadline).timed_out();
                }
                None => self.cvar.wait(&mut st),
            }
        }
    }

    fn try_recv(&self) -> Result<T, TryRecvError> {
        let mut st = self.state.lock();
        let res = st.take();
        if res.is_ok() {
            self.wake(&mut st);
        }
        res
    }

    fn recv_until(&self, deadline: Option<Instant>) -> Result<T, RecvTimeoutError> {
        let mut st = self.state.lock();
        match st.take() {
            Ok(val) => {
                self.wake(&mut st);
                return Ok(val);
            }
            Err(TryRecvError::Closed) => return Err(RecvTimeoutError::Closed),
            Err(TryRecvError::Empty) => {}
        }

        let id = st.waiter_id();
        st.recvq.push_back(Waiter::plain(id));
        // A parked receiver makes a rendezvous `try_send` ready.
        self.wake(&mut st);

        let mut expired = false;
        loop {
            if let Some(val) = st.handoff.remove(&id) {
                return Ok(val);
            }
            if st.closed || expired {
                st.recvq.retain(|w| w.id != id);
                return Err(if st.closed {
                    RecvTimeoutError::Closed
                } else {
                    RecvTimeoutError::Timeout
                });
            }
            match deadline {
                Some(deadline) => {
                    expired = self.cvar.wait_until(&mut st, deadline).timed_out();
                }
                None => self.cvar.wait(&mut st),
            }
        }
    }

    fn close(&self) -> Result<(), CloseError> {
        let mut st = self.state.lock();
        if st.closed {
            tracing::warn!("close of closed channel");
            return Err(CloseError::AlreadyClosed);
        }
        st.closed = true;
        tracing::debug!(buffered = st.buf.len(), parked = st.sendq.len(), "channel closed");
        self.wake(&mut st);
        Ok(())
    }

    /// Queue a select's send entry unless a send could complete right now,
    /// in which case the value comes back.
    fn park_send(&self, val: T, claim: &Arc<Claim>, arm: usize) -> Result<u64, T> {
        let mut st = self.state.lock();
        if st.send_ready(claim) {
            return Err(val);
        }
        let id = st.waiter_id();
        st.sendq.push_back((Waiter::select(id, claim, arm), val));
        Ok(id)
    }

    /// Queue a select's receive entry unless a receive could complete now.
    fn park_recv(&self, claim: &Arc<Claim>, arm: usize) -> Option<u64> {
        let mut st = self.state.lock();
        if st.recv_ready(claim) {
            return None;
        }
        let id = st.waiter_id();
        st.recvq.push_back(Waiter::select(id, claim, arm));
        Some(id)
    }

    /// Drop a select's send entry. The value comes back unless a receiver
    /// claimed it.
    fn unpark_send(&self, id: u64) -> Option<T> {
        self.state.lock().reclaim(id)
    }

    /// Drop a select's receive entry, returning a value handed to it.
    fn unpark_recv(&self, id: u64) -> Option<T> {
        let mut st = self.state.lock();
        st.recvq.retain(|w| w.id != id);
        st.handoff.remove(&id)
    }

    fn watch(&self, signal: &Arc<Signal>) {
        self.state.lock().watchers.register(signal);
    }

    fn unwatch(&self, signal: &Arc<Signal>) {
        self.state.lock().watchers.unregister(signal);
    }

    fn len(&self) -> usize {
        self.state.lock().buf.len()
    }

    fn capacity(&self) -> usize {
        self.state.lock().cap
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// Sending half of a channel.
pub struct Sender<T> {
    chan: Arc<Chan<T>>,
}

impl<T> Sender<T> {
    /// Blocking send. On a rendezvous channel, waits for a receiver to take
    /// the value; otherwise waits only while the buffer is full.
    pub fn send(&self, val: T) -> Result<(), SendError<T>> {
        match self.chan.send_until(val, None) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Closed(v)) => Err(SendError::Closed(v)),
            Err(SendTimeoutError::Disconnected(v)) => Err(SendError::Disconnected(v)),
            Err(SendTimeoutError::Timeout(_)) => unreachable!("send without deadline timed out"),
        }
    }

    /// Non-blocking send attempt.
    pub fn try_send(&self, val: T) -> Result<(), TrySendError<T>> {
        self.chan.try_send(val)
    }

    /// Send, giving up after `timeout`.
    pub fn send_timeout(&self, val: T, timeout: Duration) -> Result<(), SendTimeoutError<T>> {
        self.chan.send_until(val, Some(Instant::now() + timeout))
    }

    /// Close the channel. Parked senders fail; receivers drain what is
    /// buffered, then observe the close. A second close is an error.
    pub fn close(&self) -> Result<(), CloseError> {
        self.chan.close()
    }

    pub fn is_closed(&self) -> bool {
        self.chan.is_closed()
    }

    /// Number of buffered values.
    pub fn len(&self) -> usize {
        self.chan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.chan.capacity()
    }

    pub(crate) fn watch(&self, signal: &Arc<Signal>) {
        self.chan.watch(signal);
    }

    pub(crate) fn unwatch(&self, signal: &Arc<Signal>) {
        self.chan.unwatch(signal);
    }

    pub(crate) fn park_select(&self, val: T, claim: &Arc<Claim>, arm: usize) -> Result<u64, T> {
        self.chan.park_send(val, claim, arm)
    }

    pub(crate) fn unpark_select(&self, id: u64) -> Option<T> {
        self.chan.unpark_send(id)
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.chan.state.lock().senders += 1;
        Sender {
            chan: self.chan.clone(),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        let mut st = self.chan.state.lock();
        st.senders -= 1;
        if st.senders == 0 && !st.closed {
            st.closed = true;
            tracing::trace!("last sender dropped, channel closed");
            self.chan.wake(&mut st);
        }
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Receiving half of a channel.
pub struct Receiver<T> {
    chan: Arc<Chan<T>>,
}

impl<T> Receiver<T> {
    /// Blocking receive. `None` once the channel is closed and drained.
    pub fn recv(&self) -> Option<T> {
        match self.chan.recv_until(None) {
            Ok(val) => Some(val),
            Err(RecvTimeoutError::Closed) => None,
            Err(RecvTimeoutError::Timeout) => unreachable!("recv without deadline timed out"),
        }
    }

    /// Non-blocking receive attempt.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        self.chan.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        self.chan.recv_until(Some(Instant::now() + timeout))
    }

    /// Blocking iterator, ends when the channel is closed and drained.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { rx: self }
    }

    /// Iterator over the values available right now.
    pub fn try_iter(&self) -> TryIter<'_, T> {
        TryIter { rx: self }
    }

    pub fn is_closed(&self) -> bool {
        self.chan.is_closed()
    }

    /// Number of buffered values.
    pub fn len(&self) -> usize {
        self.chan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.chan.capacity()
    }

    pub(crate) fn watch(&self, signal: &Arc<Signal>) {
        self.chan.watch(signal);
    }

    pub(crate) fn unwatch(&self, signal: &Arc<Signal>) {
        self.chan.unwatch(signal);
    }

    pub(crate) fn park_select(&self, claim: &Arc<Claim>, arm: usize) -> Option<u64> {
        self.chan.park_recv(claim, arm)
    }

    pub(crate) fn unpark_select(&self, id: u64) -> Option<T> {
        self.chan.unpark_recv(id)
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        self.chan.state.lock().receivers += 1;
        Receiver {
            chan: self.chan.clone(),
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        let mut st = self.chan.state.lock();
        st.receivers -= 1;
        if st.receivers == 0 {
            tracing::trace!(parked = st.sendq.len(), "last receiver dropped");
            self.chan.wake(&mut st);
        }
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}

pub struct Iter<'a, T> {
    rx: &'a Receiver<T>,
}

impl<T> Iterator for Iter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.rx.recv()
    }
}

pub struct TryIter<'a, T> {
    rx: &'a Receiver<T>,
}

impl<T> Iterator for TryIter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

pub struct IntoIter<T> {
    rx: Receiver<T>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.rx.recv()
    }
}

impl<'a, T> IntoIterator for &'a Receiver<T> {
    type Item = T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

impl<T> IntoIterator for Receiver<T> {
    type Item = T;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> IntoIter<T> {
        IntoIter { rx: self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn buffered_send_recv() {
        let (tx, rx) = buffered(10);
        tx.send(42).unwrap();
        assert_eq!(rx.recv(), Some(42));
    }

    #[test]
    fn unbuffered_rendezvous() {
        let (tx, rx) = rendezvous();
        thread::spawn(move || {
            tx.send(99).unwrap();
        });
        assert_eq!(rx.recv(), Some(99));
    }

    #[test]
    fn rendezvous_send_waits_for_receiver() {
        let (tx, rx) = rendezvous::<&str>();
        let h = thread::spawn(move || {
            tx.send("x").unwrap();
            Instant::now()
        });
        thread::sleep(Duration::from_millis(50));
        let received_at = Instant::now();
        assert_eq!(rx.recv(), Some("x"));
        let sent_at = h.join().unwrap();
        assert!(sent_at >= received_at);
    }

    #[test]
    fn rendezvous_try_send_needs_waiting_receiver() {
        let (tx, rx) = rendezvous::<i32>();
        assert!(matches!(tx.try_send(1), Err(TrySendError::Full(1))));
        let h = thread::spawn(move || rx.recv());
        // Spin until the receiver has parked.
        let mut val = 2;
        loop {
            match tx.try_send(val) {
                Ok(()) => break,
                Err(TrySendError::Full(v)) => {
                    val = v;
                    thread::yield_now();
                }
                Err(e) => panic!("unexpected: {:?}", e),
            }
        }
        assert_eq!(h.join().unwrap(), Some(2));
    }

    #[test]
    fn close_drains_then_none() {
        let (tx, rx) = buffered(3);
        tx.send(1).unwrap();
        tx.send(2).unwrap();
        tx.close().unwrap();
        assert_eq!(rx.recv(), Some(1));
        assert_eq!(rx.recv(), Some(2));
        assert_eq!(rx.recv(), None);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));
    }

    #[test]
    fn send_on_closed_fails() {
        let (tx, _rx) = buffered::<i32>(3);
        tx.close().unwrap();
        match tx.send(7) {
            Err(SendError::Closed(v)) => assert_eq!(v, 7),
            other => panic!("expected Closed, got {:?}", other),
        }
    }

    #[test]
    fn double_close_is_error() {
        let (tx, _rx) = rendezvous::<()>();
        assert!(tx.close().is_ok());
        assert_eq!(tx.close(), Err(CloseError::AlreadyClosed));
    }

    #[test]
    fn close_wakes_parked_sender() {
        let (tx, rx) = rendezvous::<i32>();
        let tx2 = tx.clone();
        let h = thread::spawn(move || tx2.send(5));
        thread::sleep(Duration::from_millis(20));
        tx.close().unwrap();
        match h.join().unwrap() {
            Err(SendError::Closed(5)) => {}
            other => panic!("expected Closed(5), got {:?}", other),
        }
        assert_eq!(rx.recv(), None);
    }

    #[test]
    fn close_wakes_parked_receiver() {
        let (tx, rx) = buffered::<i32>(1);
        let h = thread::spawn(move || rx.recv());
        thread::sleep(Duration::from_millis(20));
        tx.close().unwrap();
        assert_eq!(h.join().unwrap(), None);
    }

    #[test]
    fn dropping_senders_closes() {
        let (tx, rx) = buffered::<i32>(10);
        drop(tx);
        assert!(rx.is_closed());
        assert_eq!(rx.recv(), None);
    }

    #[test]
    fn dropping_receivers_disconnects() {
        let (tx, rx) = buffered::<i32>(1);
        drop(rx);
        assert!(matches!(tx.send(1), Err(SendError::Disconnected(1))));
    }

    #[test]
    fn try_recv_empty() {
        let (_tx, rx) = buffered::<i32>(10);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn full_buffer_blocks_until_recv() {
        let (tx, rx) = buffered(1);
        tx.send(1).unwrap();
        assert!(matches!(tx.try_send(2), Err(TrySendError::Full(2))));
        let h = thread::spawn(move || tx.send(2));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(rx.len(), 1);
        assert_eq!(rx.recv(), Some(1));
        h.join().unwrap().unwrap();
        assert_eq!(rx.recv(), Some(2));
    }

    #[test]
    fn recv_timeout_expires() {
        let (_tx, rx) = buffered::<i32>(1);
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Timeout)
        );
    }

    #[test]
    fn send_timeout_returns_value() {
        let (tx, _rx) = rendezvous::<i32>();
        match tx.send_timeout(3, Duration::from_millis(10)) {
            Err(SendTimeoutError::Timeout(v)) => assert_eq!(v, 3),
            other => panic!("expected Timeout, got {:?}", other),
        }
    }

    #[test]
    fn len_and_capacity() {
        let (tx, rx) = buffered(3);
        tx.send("a").unwrap();
        tx.send("b").unwrap();
        assert_eq!(tx.len(), 2);
        assert_eq!(rx.capacity(), 3);
        assert!(!rx.is_empty());
    }

    #[test]
    fn iter_ends_on_close() {
        let (tx, rx) = rendezvous();
        thread::spawn(move || {
            for i in 0..100 {
                tx.send(i).unwrap();
            }
            tx.close().unwrap();
        });
        let got: Vec<i32> = rx.iter().collect();
        assert_eq!(got, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn huge_capacity_allocates_lazily() {
        let (tx, rx) = bounded::<u8>(usize::MAX);
        assert_eq!(tx.capacity(), usize::MAX);
        tx.send(1).unwrap();
        tx.send(2).unwrap();
        assert_eq!(rx.recv(), Some(1));
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn stale_select_entry_is_skipped() {
        let (tx, rx) = rendezvous::<i32>();
        let claim = Claim::new(Signal::new());
        let id = rx.park_select(&claim, 0).unwrap();
        assert_eq!(claim.withdraw(), None);
        // The withdrawn entry cannot take the value.
        assert!(matches!(tx.try_send(1), Err(TrySendError::Full(1))));
        assert_eq!(rx.unpark_select(id), None);
    }

    #[test]
    fn parked_select_entry_takes_hand_off() {
        let (tx, rx) = rendezvous::<i32>();
        let claim = Claim::new(Signal::new());
        let id = rx.park_select(&claim, 3).unwrap();
        tx.try_send(8).unwrap();
        assert_eq!(claim.withdraw(), Some(3));
        assert_eq!(rx.unpark_select(id), Some(8));
    }

    #[test]
    fn select_send_entry_feeds_plain_recv() {
        let (tx, rx) = rendezvous::<i32>();
        let claim = Claim::new(Signal::new());
        let id = tx.park_select(4, &claim, 1).unwrap();
        assert_eq!(rx.try_recv(), Ok(4));
        assert_eq!(claim.withdraw(), Some(1));
        assert_eq!(tx.unpark_select(id), None);
    }

    #[test]
    fn park_refuses_when_ready() {
        let (tx, rx) = buffered::<i32>(1);
        let claim = Claim::new(Signal::new());
        assert_eq!(tx.park_select(5, &claim, 0), Err(5));
        tx.send(6).unwrap();
        assert_eq!(rx.park_select(&claim, 1), None);
    }

    #[test]
    fn multiple_producers() {
        let (tx, rx) = buffered(10);
        let tx2 = tx.clone();
        thread::spawn(move || tx.send(1).unwrap());
        thread::spawn(move || tx2.send(2).unwrap());
        let mut vals: Vec<i32> = rx.iter().collect();
        vals.sort();
        assert_eq!(vals, vec![1, 2]);
    }
}

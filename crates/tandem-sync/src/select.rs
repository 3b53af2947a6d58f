// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Select: wait on several channel operations, run exactly one.
//!
//! Each attempt tries the enabled arms without blocking, in a fresh random
//! order (fair) or in listed order (`biased`). If nothing is ready and there
//! is no default arm, the select parks one entry per arm on its channel,
//! all sharing a one-shot `Claim`, and sleeps. A counterpart (a plain
//! operation or another select) completes the hand-off through whichever
//! entry it reaches first; the claim makes that the only arm that runs.
//! On any other wake-up the select withdraws its entries and tries again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;

use crate::cancel::{CancelToken, Cancelled};
use crate::channel::{Receiver, SendError, Sender, TryRecvError, TrySendError};
use crate::signal::{Claim, Signal};

/// One channel operation plus the action to run if it is chosen.
trait Arm<R> {
    /// Complete the operation and run the action, or `None` if it would block.
    fn try_fire(&mut self) -> Option<R>;
    /// Queue an entry for `claim` as arm `idx`. `false` if the operation
    /// could complete right now instead.
    fn park(&mut self, idx: usize, claim: &Arc<Claim>) -> bool;
    /// Remove the entry queued by `park`, if any.
    fn unpark(&mut self);
    /// Run the action of an arm whose entry won the claim.
    fn complete(&mut self) -> Option<R>;
    fn watch(&self, signal: &Arc<Signal>);
    fn unwatch(&self, signal: &Arc<Signal>);
}

struct RecvArm<'a, T, F> {
    rx: &'a Receiver<T>,
    action: Option<F>,
    parked: Option<u64>,
    handed: Option<T>,
}

impl<T, R, F> Arm<R> for RecvArm<'_, T, F>
where
    F: FnOnce(Option<T>) -> R,
{
    fn try_fire(&mut self) -> Option<R> {
        let val = match self.rx.try_recv() {
            Ok(val) => Some(val),
            Err(TryRecvError::Closed) => None,
            Err(TryRecvError::Empty) => return None,
        };
        self.action.take().map(|f| f(val))
    }

    fn park(&mut self, idx: usize, claim: &Arc<Claim>) -> bool {
        self.parked = self.rx.park_select(claim, idx);
        self.parked.is_some()
    }

    fn unpark(&mut self) {
        if let Some(id) = self.parked.take() {
            self.handed = self.rx.unpark_select(id);
        }
    }

    fn complete(&mut self) -> Option<R> {
        let val = self.handed.take()?;
        self.action.take().map(|f| f(Some(val)))
    }

    fn watch(&self, signal: &Arc<Signal>) {
        self.rx.watch(signal);
    }

    fn unwatch(&self, signal: &Arc<Signal>) {
        self.rx.unwatch(signal);
    }
}

struct SendArm<'a, T, F> {
    tx: &'a Sender<T>,
    val: Option<T>,
    action: Option<F>,
    parked: Option<u64>,
}

impl<T, R, F> Arm<R> for SendArm<'_, T, F>
where
    F: FnOnce(Result<(), SendError<T>>) -> R,
{
    fn try_fire(&mut self) -> Option<R> {
        let val = self.val.take()?;
        let outcome = match self.tx.try_send(val) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(val)) => {
                self.val = Some(val);
                return None;
            }
            Err(TrySendError::Closed(val)) => Err(SendError::Closed(val)),
            Err(TrySendError::Disconnected(val)) => Err(SendError::Disconnected(val)),
        };
        self.action.take().map(|f| f(outcome))
    }

    fn park(&mut self, idx: usize, claim: &Arc<Claim>) -> bool {
        let Some(val) = self.val.take() else {
            return false;
        };
        match self.tx.park_select(val, claim, idx) {
            Ok(id) => {
                self.parked = Some(id);
                true
            }
            Err(val) => {
                self.val = Some(val);
                false
            }
        }
    }

    fn unpark(&mut self) {
        if let Some(id) = self.parked.take() {
            self.val = self.tx.unpark_select(id);
        }
    }

    fn complete(&mut self) -> Option<R> {
        if self.val.is_some() {
            return None;
        }
        self.action.take().map(|f| f(Ok(())))
    }

    fn watch(&self, signal: &Arc<Signal>) {
        self.tx.watch(signal);
    }

    fn unwatch(&self, signal: &Arc<Signal>) {
        self.tx.unwatch(signal);
    }
}

/// Why a bounded select stopped without running an arm.
enum Interrupted {
    TimedOut,
    Cancelled,
}

/// Builder for a multiplexed wait. Every arm produces the same `R`.
///
/// ```ignore
/// let got = Select::new()
///     .recv(&rx1, |v| v.map(|s| format!("one: {s}")))
///     .recv(&rx2, |v| v.map(|s| format!("two: {s}")))
///     .run();
/// ```
pub struct Select<'a, R> {
    arms: Vec<Box<dyn Arm<R> + 'a>>,
    default: Option<Box<dyn FnOnce() -> R + 'a>>,
    biased: bool,
}

impl<'a, R> Select<'a, R> {
    /// Fair select: ready arms are chosen in random order.
    pub fn new() -> Self {
        Self {
            arms: Vec::new(),
            default: None,
            biased: false,
        }
    }

    /// Priority select: arms are tried in the order they were added.
    pub fn biased() -> Self {
        Self {
            biased: true,
            ..Self::new()
        }
    }

    /// Receive arm. The action gets `None` if the channel is closed and drained.
    pub fn recv<T, F>(self, rx: &'a Receiver<T>, action: F) -> Self
    where
        T: 'a,
        F: FnOnce(Option<T>) -> R + 'a,
    {
        self.recv_if(true, rx, action)
    }

    /// Receive arm that only takes part when `enabled`.
    pub fn recv_if<T, F>(mut self, enabled: bool, rx: &'a Receiver<T>, action: F) -> Self
    where
        T: 'a,
        F: FnOnce(Option<T>) -> R + 'a,
    {
        if enabled {
            self.arms.push(Box::new(RecvArm {
                rx,
                action: Some(action),
                parked: None,
                handed: None,
            }));
        }
        self
    }

    /// Send arm. A closed channel makes the arm ready; the action then gets
    /// the value back inside the error.
    pub fn send<T, F>(self, tx: &'a Sender<T>, val: T, action: F) -> Self
    where
        T: 'a,
        F: FnOnce(Result<(), SendError<T>>) -> R + 'a,
    {
        self.send_if(true, tx, val, action)
    }

    /// Send arm that only takes part when `enabled`.
    pub fn send_if<T, F>(mut self, enabled: bool, tx: &'a Sender<T>, val: T, action: F) -> Self
    where
        T: 'a,
        F: FnOnce(Result<(), SendError<T>>) -> R + 'a,
    {
        if enabled {
            self.arms.push(Box::new(SendArm {
                tx,
                val: Some(val),
                action: Some(action),
                parked: None,
            }));
        }
        self
    }

    /// Runs when no arm is ready, instead of blocking.
    pub fn default<F>(mut self, action: F) -> Self
    where
        F: FnOnce() -> R + 'a,
    {
        self.default = Some(Box::new(action));
        self
    }

    /// Block until one arm runs, or run the default.
    ///
    /// Panics if there are no enabled arms and no default: that wait could
    /// never finish.
    pub fn run(self) -> R {
        match self.run_until(None, None) {
            Ok(r) => r,
            Err(_) => unreachable!("select without deadline or token was interrupted"),
        }
    }

    /// Like `run`, but gives up after `timeout`.
    pub fn run_timeout(self, timeout: Duration) -> Option<R> {
        self.run_until(Some(Instant::now() + timeout), None).ok()
    }

    /// Like `run`, but returns `Cancelled` as soon as `token` fires.
    pub fn run_cancellable(self, token: &CancelToken) -> Result<R, Cancelled> {
        self.run_until(None, Some(token)).map_err(|_| Cancelled)
    }

    fn run_until(
        mut self,
        deadline: Option<Instant>,
        token: Option<&CancelToken>,
    ) -> Result<R, Interrupted> {
        if self.arms.is_empty() && self.default.is_none() && deadline.is_none() && token.is_none() {
            panic!("select with no enabled arms and no default would block forever");
        }

        let mut order: Vec<usize> = (0..self.arms.len()).collect();
        if let Some(r) = self.poll_once(&mut order) {
            return Ok(r);
        }
        if let Some(default) = self.default.take() {
            return Ok(default());
        }

        let signal = Signal::new();
        for arm in &self.arms {
            arm.watch(&signal);
        }
        if let Some(token) = token {
            token.watch(&signal);
        }

        let outcome = self.block(&signal, &mut order, deadline, token);

        for arm in &self.arms {
            arm.unwatch(&signal);
        }
        if let Some(token) = token {
            token.unwatch(&signal);
        }
        outcome
    }

    /// Park on every arm, sleep, and retry until an arm runs or the wait is
    /// interrupted. No entry is queued while the arms are polled, so a
    /// counterpart can never complete an arm the poll also completed.
    fn block(
        &mut self,
        signal: &Arc<Signal>,
        order: &mut [usize],
        deadline: Option<Instant>,
        token: Option<&CancelToken>,
    ) -> Result<R, Interrupted> {
        loop {
            let seen = signal.epoch();
            if token.is_some_and(|t| t.is_cancelled()) {
                return Err(Interrupted::Cancelled);
            }
            if let Some(r) = self.poll_once(order) {
                return Ok(r);
            }

            let claim = Claim::new(signal.clone());
            let mut parked_all = true;
            for (idx, arm) in self.arms.iter_mut().enumerate() {
                if !arm.park(idx, &claim) {
                    parked_all = false;
                    break;
                }
            }
            let timed_out = parked_all && !signal.wait_past(seen, deadline);

            let won = claim.withdraw();
            for arm in self.arms.iter_mut() {
                arm.unpark();
            }
            if let Some(idx) = won {
                if let Some(r) = self.arms[idx].complete() {
                    return Ok(r);
                }
            }
            if timed_out {
                return Err(Interrupted::TimedOut);
            }
        }
    }

    fn poll_once(&mut self, order: &mut [usize]) -> Option<R> {
        if !self.biased {
            order.shuffle(&mut rand::thread_rng());
        }
        for &idx in order.iter() {
            if let Some(r) = self.arms[idx].try_fire() {
                return Some(r);
            }
        }
        None
    }
}

/// Result of a select over homogeneous receivers.
#[derive(Debug, PartialEq, Eq)]
pub enum SelectResult<T> {
    /// Received a value from channel at the given index.
    Recv(usize, T),
    /// Default arm fired (non-blocking, all channels empty).
    Default,
    /// All channels closed.
    AllClosed,
}

/// Fair select over multiple receivers.
///
/// Closed channels are skipped; `AllClosed` once every one is closed and
/// drained. `has_default`: return `Default` instead of blocking.
pub fn select_recv<T>(receivers: &[&Receiver<T>], has_default: bool) -> SelectResult<T> {
    select_recv_with(receivers, has_default, false)
}

/// Priority select: evaluates receivers in listed order.
pub fn select_priority_recv<T>(receivers: &[&Receiver<T>], has_default: bool) -> SelectResult<T> {
    select_recv_with(receivers, has_default, true)
}

/// Outcome of one round in `select_recv_with`.
enum Picked<T> {
    Value(usize, T),
    Closed(usize),
    Default,
}

fn select_recv_with<T>(
    receivers: &[&Receiver<T>],
    has_default: bool,
    biased: bool,
) -> SelectResult<T> {
    let mut open = vec![true; receivers.len()];

    loop {
        if !open.iter().any(|o| *o) {
            return SelectResult::AllClosed;
        }

        let mut sel = if biased { Select::biased() } else { Select::new() };
        for (idx, rx) in receivers.iter().enumerate() {
            sel = sel.recv_if(open[idx], *rx, move |val| match val {
                Some(val) => Picked::Value(idx, val),
                None => Picked::Closed(idx),
            });
        }
        if has_default {
            sel = sel.default(|| Picked::Default);
        }

        match sel.run() {
            Picked::Value(idx, val) => return SelectResult::Recv(idx, val),
            Picked::Closed(idx) => open[idx] = false,
            Picked::Default => return SelectResult::Default,
        }
    }
}

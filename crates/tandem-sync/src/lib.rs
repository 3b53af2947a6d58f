// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Tandem coordination primitives.
//!
//! Blocking primitives for OS-thread workers sharing an address space.
//! Every wait parks the thread on a condition variable; nothing spins.
//!
//! Components:
//! - channel: bounded and rendezvous message passing with explicit close
//! - select: wait on several channel operations, fair or biased
//! - mutex/rwmutex: FIFO exclusive lock, reader/writer lock
//! - wait_group: completion-counting join barrier
//! - spawn/cancel: worker lifecycle and cooperative cancellation
//! - timeout: timer channels and bounded waits

pub mod cancel;
pub mod channel;
pub mod mutex;
pub mod rwmutex;
pub mod select;
mod signal;
pub mod spawn;
pub mod timeout;
pub mod wait_group;

pub use cancel::{CancelToken, Cancelled};
pub use channel::{bounded, buffered, rendezvous, Receiver, Sender};
pub use mutex::{Mutex, MutexGuard};
pub use rwmutex::{RwMutex, RwState};
pub use select::{select_priority_recv, select_recv, Select, SelectResult};
pub use spawn::{cancelled, current_token, join_all, spawn, spawn_workers, JoinError, TaskHandle};
pub use wait_group::{WaitGroup, WaitGroupError};

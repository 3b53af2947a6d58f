// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Demonstration scenarios.
//!
//! Each scenario threads its shared state explicitly: a read-only context
//! plus a lock-guarded accumulator, never a global. Each returns a `Report`
//! whose `ok` flag says whether the observed result matched the expected one.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tandem_sync::channel::{self, CloseError, Sender};
use tandem_sync::{
    join_all, spawn, spawn_workers, JoinError, Mutex, RwMutex, Select, WaitGroup, WaitGroupError,
};
use thiserror::Error;

use crate::config::DemoConfig;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Join(#[from] JoinError),
    #[error(transparent)]
    WaitGroup(#[from] WaitGroupError),
    #[error(transparent)]
    Close(#[from] CloseError),
    #[error("channel closed while sending message {0}")]
    Send(usize),
}

/// Outcome of one scenario run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub name: &'static str,
    pub lines: Vec<String>,
    pub ok: bool,
}

impl Report {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            lines: Vec::new(),
            ok: true,
        }
    }

    fn line(&mut self, text: impl Into<String>) {
        self.lines.push(text.into());
    }

    fn expect<T: PartialEq + std::fmt::Display>(&mut self, what: &str, got: T, want: T) {
        if got != want {
            self.ok = false;
        }
        self.line(format!("{}: {} (expected {})", what, got, want));
    }
}

pub const NAMES: [&str; 6] = ["counter", "bank", "buffered", "range", "select", "waitgroup"];

pub fn run(name: &str, config: &DemoConfig) -> Option<Result<Report, ScenarioError>> {
    let report = match name {
        "counter" => counter(config),
        "bank" => bank(config),
        "buffered" => buffered(config),
        "range" => range(config),
        "select" => select_two(config),
        "waitgroup" => waitgroup(config),
        _ => return None,
    };
    Some(report)
}

/// N workers each add 1 to a mutex-guarded counter K times.
pub fn counter(config: &DemoConfig) -> Result<Report, ScenarioError> {
    let mut report = Report::new("counter");
    let increments = config.increments;
    let counter = Arc::new(Mutex::new(0usize));

    let handles = spawn_workers(config.workers, counter.clone(), move |_, counter: &Mutex<usize>| {
        for _ in 0..increments {
            *counter.lock() += 1;
        }
    });
    join_all(handles)?;

    let total = *counter.lock();
    report.expect("counter", total, config.workers * increments);
    Ok(report)
}

/// Balance behind a read/write lock: deposits take the write side, reads
/// the shared side.
#[derive(Debug, Default)]
pub struct BankAccount {
    balance: RwMutex<i64>,
}

impl BankAccount {
    pub fn add_balance(&self, amount: i64) {
        *self.balance.write() += amount;
    }

    pub fn balance(&self) -> i64 {
        *self.balance.read()
    }
}

pub fn bank(config: &DemoConfig) -> Result<Report, ScenarioError> {
    let mut report = Report::new("bank");
    let deposits = config.increments;
    let account = Arc::new(BankAccount::default());

    let handles = spawn_workers(config.workers, account.clone(), move |_, account: &BankAccount| {
        let mut last_seen = 0;
        for _ in 0..deposits {
            account.add_balance(1);
            let seen = account.balance();
            // Deposits only ever grow the balance.
            if seen < last_seen {
                return false;
            }
            last_seen = seen;
        }
        true
    });
    let monotonic = join_all(handles)?.into_iter().all(|ok| ok);

    if !monotonic {
        report.ok = false;
        report.line("balance went backwards");
    }
    report.expect("final balance", account.balance(), (config.workers * deposits) as i64);
    Ok(report)
}

/// Fill a buffered channel, park one more sender on it, then drain.
pub fn buffered(config: &DemoConfig) -> Result<Report, ScenarioError> {
    let mut report = Report::new("buffered");
    let (tx, rx) = channel::buffered::<String>(config.capacity);

    for i in 1..=config.capacity {
        tx.send(format!("message {}", i))
            .map_err(|_| ScenarioError::Send(i))?;
    }

    let overflow = config.capacity + 1;
    let late = tx.clone();
    let parked = spawn(move || late.send(format!("message {}", overflow)));

    // The overflow sender cannot complete until something is received.
    thread_pause();
    let still_parked = !parked.is_finished();
    report.expect("buffered", rx.len(), config.capacity);
    report.expect("capacity", rx.capacity(), config.capacity);

    let mut received = 0;
    for _ in 0..overflow {
        if rx.recv().is_some() {
            received += 1;
        }
    }
    parked.join()?.map_err(|_| ScenarioError::Send(overflow))?;
    tx.close()?;
    if !still_parked {
        report.line("overflow sender finished before any receive");
        report.ok = false;
    }
    report.expect("received", received, overflow);
    Ok(report)
}

fn thread_pause() {
    std::thread::sleep(Duration::from_millis(20));
}

/// Producer sends over a rendezvous channel and closes it; the consumer
/// ranges until the close is observed.
pub fn range(config: &DemoConfig) -> Result<Report, ScenarioError> {
    let mut report = Report::new("range");
    let messages = config.messages;
    let (tx, rx) = channel::rendezvous::<usize>();

    let producer = spawn(move || -> Result<(), ScenarioError> {
        for i in 0..messages {
            tx.send(i).map_err(|_| ScenarioError::Send(i))?;
        }
        tx.close()?;
        Ok(())
    });

    let mut in_order = true;
    let mut count = 0;
    for (expected, got) in rx.iter().enumerate() {
        in_order &= expected == got;
        count += 1;
    }
    producer.join()??;

    if !in_order {
        report.ok = false;
        report.line("values arrived out of order");
    }
    report.expect("received", count, messages);
    Ok(report)
}

/// Two producers, one message each, collected with a blocking select.
pub fn select_two(_config: &DemoConfig) -> Result<Report, ScenarioError> {
    let mut report = Report::new("select");
    let (tx1, rx1) = channel::rendezvous::<&'static str>();
    let (tx2, rx2) = channel::rendezvous::<&'static str>();

    let failed = Arc::new(AtomicUsize::new(0));
    let wg = WaitGroup::new();
    for (tx, msg) in [(tx1, "from first channel"), (tx2, "from second channel")] {
        let failed = failed.clone();
        wg.go(move || produce(&tx, msg, &failed))?;
    }

    let mut counter = 0;
    let mut open = [true, true];
    while counter < 2 && open.iter().any(|o| *o) {
        let picked = Select::new()
            .recv_if(open[0], &rx1, |v| (0, v))
            .recv_if(open[1], &rx2, |v| (1, v))
            .run();
        match picked {
            (idx, Some(msg)) => {
                report.line(format!("channel {}: {}", idx + 1, msg));
                counter += 1;
            }
            (idx, None) => open[idx] = false,
        }
    }
    wg.wait();

    report.expect("selected", counter, 2);
    report.expect("failed sends", failed.load(Ordering::SeqCst), 0);
    Ok(report)
}

fn produce(tx: &Sender<&'static str>, msg: &'static str, failed: &AtomicUsize) {
    if let Err(err) = tx.send(msg) {
        tracing::warn!(%err, msg, "producer could not deliver");
        failed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Workers started through a wait group; the coordinator joins on it.
pub fn waitgroup(config: &DemoConfig) -> Result<Report, ScenarioError> {
    let mut report = Report::new("waitgroup");
    let finished = Arc::new(Mutex::new(0usize));
    let wg = WaitGroup::new();

    for _ in 0..config.workers {
        let finished = finished.clone();
        wg.go(move || {
            *finished.lock() += 1;
        })?;
    }
    wg.wait();

    report.expect("finished", *finished.lock(), config.workers);
    report.expect("pending", wg.count(), 0);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> DemoConfig {
        DemoConfig {
            workers: 8,
            increments: 50,
            capacity: 3,
            messages: 20,
        }
    }

    #[test]
    fn every_name_runs() {
        for name in NAMES {
            let report = run(name, &small()).unwrap().unwrap();
            assert!(report.ok, "{} failed: {:?}", name, report.lines);
        }
    }

    #[test]
    fn unknown_name() {
        assert!(run("nope", &small()).is_none());
    }

    #[test]
    fn counter_reaches_product() {
        let report = counter(&DemoConfig::default()).unwrap();
        assert!(report.ok);
        assert_eq!(report.lines, vec!["counter: 10000 (expected 10000)"]);
    }

    #[test]
    fn producer_counts_failed_send() {
        let (tx, rx) = channel::buffered::<&'static str>(1);
        drop(rx);
        let failed = AtomicUsize::new(0);
        produce(&tx, "lost", &failed);
        assert_eq!(failed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn select_reports_no_failed_sends() {
        let report = select_two(&DemoConfig::default()).unwrap();
        assert!(report.ok, "{:?}", report.lines);
        assert!(report.lines.contains(&"failed sends: 0 (expected 0)".to_string()));
    }

    #[test]
    fn bank_account_accumulates() {
        let account = BankAccount::default();
        account.add_balance(5);
        account.add_balance(-2);
        assert_eq!(account.balance(), 3);
    }
}

//! State shared between the main thread and the flood workers.
//!
//! Workers never share mutable state with each other. The only cross-thread
//! objects are the shutdown flag and per-worker counters, each counter having
//! exactly one writer (its worker).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Granularity of interruptible sleeps.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Cloneable cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal shutdown.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Check if shutdown is signaled.
    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Sleep for `duration`, waking early on shutdown.
    ///
    /// Returns true if shutdown was signaled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_triggered() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

/// Counters updated by one worker.
#[derive(Debug, Default)]
pub struct WorkerStats {
    commands_sent: AtomicU64,
    bytes_sent: AtomicU64,
    passes: AtomicU64,
    connections: AtomicU64,
    connect_failures: AtomicU64,
    write_failures: AtomicU64,
}

impl WorkerStats {
    pub fn record_command(&self, bytes: usize) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_pass(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            passes: self.passes.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`WorkerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub commands_sent: u64,
    pub bytes_sent: u64,
    pub passes: u64,
    pub connections: u64,
    pub connect_failures: u64,
    pub write_failures: u64,
}

impl std::ops::Add for StatsSnapshot {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            commands_sent: self.commands_sent + rhs.commands_sent,
            bytes_sent: self.bytes_sent + rhs.bytes_sent,
            passes: self.passes + rhs.passes,
            connections: self.connections + rhs.connections,
            connect_failures: self.connect_failures + rhs.connect_failures,
            write_failures: self.write_failures + rhs.write_failures,
        }
    }
}

impl std::iter::Sum for StatsSnapshot {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |acc, s| acc + s)
    }
}

//! Connection worker: streams one chunk to the server, forever.
//!
//! ```text
//!              connect ok
//!   DISCONNECTED ---------> CONNECTED ---+
//!     ^    |                   |   ^     | write+flush next command,
//!     |    | connect failed:   |   +-----+ wrap to the first command
//!     |    | wait backoff,     |           after the last one
//!     |    +--> retry          |
//!     +------------------------+
//!         write/flush failed: close socket
//! ```
//!
//! The shutdown signal is checked before each connect attempt, between
//! commands and while waiting out a backoff delay. A write that times out
//! (server stopped reading) counts as a failed write, so a stalled server
//! holds a worker for at most one write timeout. Connection failures stay
//! inside the worker; other workers never notice them.

use crate::backoff::Backoff;
use crate::config::{ReconnectConfig, ResumePolicy};
use crate::partition::Chunk;
use crate::shared::{ShutdownSignal, WorkerStats};
use crate::transport::Connector;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

/// Settings shared by all workers of a flood.
#[derive(Debug, Clone, Default)]
pub struct WorkerConfig {
    pub reconnect: ReconnectConfig,
    pub resume: ResumePolicy,
    /// Seed for backoff jitter; entropy when `None`
    pub jitter_seed: Option<u64>,
}

/// Why a worker returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Shutdown was signaled
    Shutdown,
    /// `max_retries` consecutive connect attempts failed
    RetriesExhausted { failures: u32 },
}

enum WorkerState<S> {
    Disconnected,
    Connected(S),
}

/// Streams one chunk over a self-healing connection.
pub struct ConnectionWorker<C: Connector> {
    name: String,
    chunk: Chunk,
    connector: C,
    resume: ResumePolicy,
    max_retries: Option<u32>,
    backoff: Backoff,
    shutdown: ShutdownSignal,
    stats: Arc<WorkerStats>,
    state: WorkerState<C::Stream>,
    position: usize,
}

impl<C: Connector> ConnectionWorker<C> {
    /// Worker `id` (1-based) of `total`, streaming `chunk` through `connector`.
    pub fn new(
        id: usize,
        total: usize,
        chunk: Chunk,
        connector: C,
        config: &WorkerConfig,
        shutdown: ShutdownSignal,
    ) -> Self {
        let backoff = match config.jitter_seed {
            Some(seed) => Backoff::seeded(&config.reconnect, seed.wrapping_add(id as u64)),
            None => Backoff::new(&config.reconnect),
        };

        Self {
            name: format!("worker {}/{}", id, total),
            chunk,
            connector,
            resume: config.resume,
            max_retries: config.reconnect.max_retries,
            backoff,
            shutdown,
            stats: Arc::new(WorkerStats::default()),
            state: WorkerState::Disconnected,
            position: 0,
        }
    }

    /// Counters for this worker, readable from other threads.
    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Run until shutdown (or until connect retries are exhausted).
    pub fn run(&mut self) -> WorkerExit {
        let range = self.chunk.range();
        log::info!(
            "{}: sending {} commands ({}..{}) to {}",
            self.name,
            self.chunk.len(),
            range.start,
            range.end,
            self.connector.peer()
        );

        if self.chunk.is_empty() {
            log::info!("{}: empty chunk, idling until shutdown", self.name);
            while !self.shutdown.sleep(Duration::from_secs(1)) {}
            return WorkerExit::Shutdown;
        }

        let exit = loop {
            if self.shutdown.is_triggered() {
                break WorkerExit::Shutdown;
            }

            match self.state {
                WorkerState::Disconnected => {
                    if let Some(exit) = self.try_connect() {
                        break exit;
                    }
                }
                WorkerState::Connected(_) => self.send_next(),
            }
        };

        // Drop closes the socket
        self.state = WorkerState::Disconnected;
        log::info!("{}: stopped ({:?})", self.name, exit);
        exit
    }

    /// One connect attempt, waiting out the backoff on failure.
    ///
    /// Returns `Some` when the worker has to stop.
    fn try_connect(&mut self) -> Option<WorkerExit> {
        log::debug!("{}: connecting to {}", self.name, self.connector.peer());

        match self.connector.connect() {
            Ok(stream) => {
                if self.backoff.failures() > 0 {
                    log::info!(
                        "{}: connected to {} after {} failed attempts",
                        self.name,
                        self.connector.peer(),
                        self.backoff.failures()
                    );
                } else {
                    log::info!("{}: connected to {}", self.name, self.connector.peer());
                }
                self.backoff.reset();
                self.stats.record_connection();
                if self.resume == ResumePolicy::Restart {
                    self.position = 0;
                }
                self.state = WorkerState::Connected(stream);
                None
            }
            Err(e) => {
                self.stats.record_connect_failure();
                let delay = self.backoff.next_delay();
                let failures = self.backoff.failures();
                log::warn!(
                    "{}: connect to {} failed (attempt {}): {}",
                    self.name,
                    self.connector.peer(),
                    failures,
                    e
                );

                if let Some(max) = self.max_retries {
                    if failures >= max {
                        log::warn!("{}: giving up after {} failed attempts", self.name, failures);
                        return Some(WorkerExit::RetriesExhausted { failures });
                    }
                }

                if !delay.is_zero() {
                    log::debug!("{}: retrying in {:?}", self.name, delay);
                    if self.shutdown.sleep(delay) {
                        return Some(WorkerExit::Shutdown);
                    }
                }
                None
            }
        }
    }

    /// Write the command at the current position and advance.
    fn send_next(&mut self) {
        let WorkerState::Connected(stream) = &mut self.state else {
            return;
        };
        let Some(command) = self.chunk.commands().get(self.position) else {
            self.position = 0;
            return;
        };

        let result = stream
            .write_all(command.as_bytes())
            .and_then(|()| stream.flush());

        match result {
            Ok(()) => {
                self.stats.record_command(command.len());
                self.position += 1;
                if self.position == self.chunk.len() {
                    self.position = 0;
                    self.stats.record_pass();
                    log::debug!("{}: pass complete", self.name);
                }
            }
            Err(e) if is_stall(&e) => {
                log::warn!(
                    "{}: {} stopped reading, reconnecting",
                    self.name,
                    self.connector.peer()
                );
                self.stats.record_write_failure();
                self.state = WorkerState::Disconnected;
            }
            Err(e) => {
                log::warn!(
                    "{}: write to {} failed, reconnecting: {}",
                    self.name,
                    self.connector.peer(),
                    e
                );
                self.stats.record_write_failure();
                // Drop closes the failed socket before the next connect
                self.state = WorkerState::Disconnected;
            }
        }
    }
}

/// Write timeout expired: the kind differs between platforms.
fn is_stall(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::CommandSequence;
    use crate::command::{encode, PixelSample};
    use crate::transport::MockConnector;

    fn chunk(len: u64) -> Chunk {
        let sequence: CommandSequence = (0..len)
            .filter_map(|i| encode(&PixelSample::new(i, i, [0xff, 0, 0, 0xff])))
            .collect::<Vec<_>>()
            .into();
        let len = sequence.len();
        Chunk::new(sequence, 0..len)
    }

    fn line(i: u64) -> String {
        format!("PX {} {} ff0000ff\n", i, i)
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            reconnect: ReconnectConfig::immediate(),
            resume: ResumePolicy::Restart,
            jitter_seed: Some(1),
        }
    }

    #[test]
    fn test_streams_chunk_repeatedly_in_order() {
        let shutdown = ShutdownSignal::new();
        let connector = MockConnector::new();
        connector.stop_after_writes(7, shutdown.clone());

        let mut worker =
            ConnectionWorker::new(1, 1, chunk(3), connector.clone(), &fast_config(), shutdown);
        assert_eq!(worker.run(), WorkerExit::Shutdown);

        assert_eq!(connector.connection_count(), 1);
        assert_eq!(
            connector.lines(0),
            vec![line(0), line(1), line(2), line(0), line(1), line(2), line(0)]
        );
        let stats = worker.stats().snapshot();
        assert_eq!(stats.commands_sent, 7);
        assert_eq!(stats.passes, 2);
        assert!(connector.is_closed(0));
    }

    #[test]
    fn test_write_failure_restarts_chunk_on_new_connection() {
        let shutdown = ShutdownSignal::new();
        let connector = MockConnector::new();
        // First connection breaks on its third write (index 2)
        connector.fail_writes([Some(2), None]);
        connector.stop_after_writes(2 + 5, shutdown.clone());

        let mut worker =
            ConnectionWorker::new(1, 1, chunk(5), connector.clone(), &fast_config(), shutdown);
        assert_eq!(worker.run(), WorkerExit::Shutdown);

        assert_eq!(connector.connection_count(), 2);
        assert_eq!(connector.lines(0), vec![line(0), line(1)]);
        assert!(connector.is_closed(0));
        assert_eq!(
            connector.lines(1),
            vec![line(0), line(1), line(2), line(3), line(4)]
        );

        let stats = worker.stats().snapshot();
        assert_eq!(stats.write_failures, 1);
        assert_eq!(stats.connections, 2);
    }

    #[test]
    fn test_resume_policy_continues_at_failed_command() {
        let shutdown = ShutdownSignal::new();
        let connector = MockConnector::new();
        connector.fail_writes([Some(2), None]);
        connector.stop_after_writes(2 + 3, shutdown.clone());

        let config = WorkerConfig {
            resume: ResumePolicy::Resume,
            ..fast_config()
        };
        let mut worker = ConnectionWorker::new(1, 1, chunk(5), connector.clone(), &config, shutdown);
        worker.run();

        assert_eq!(connector.lines(0), vec![line(0), line(1)]);
        let resumed: Vec<u64> = connector
            .commands(1)
            .unwrap()
            .iter()
            .map(|cmd| cmd.x)
            .collect();
        assert_eq!(resumed, vec![2, 3, 4]);
    }

    #[test]
    fn test_connect_failures_are_retried() {
        let shutdown = ShutdownSignal::new();
        let connector = MockConnector::new();
        connector.fail_connects(3);
        connector.stop_after_writes(2, shutdown.clone());

        let mut worker =
            ConnectionWorker::new(1, 1, chunk(2), connector.clone(), &fast_config(), shutdown);
        assert_eq!(worker.run(), WorkerExit::Shutdown);

        assert_eq!(connector.connect_attempts(), 4);
        assert_eq!(connector.connection_count(), 1);
        assert_eq!(worker.stats().snapshot().connect_failures, 3);
    }

    #[test]
    fn test_gives_up_after_max_retries() {
        let connector = MockConnector::new();
        connector.fail_connects(100);

        let mut config = fast_config();
        config.reconnect.max_retries = Some(4);
        let mut worker =
            ConnectionWorker::new(1, 1, chunk(2), connector.clone(), &config, ShutdownSignal::new());

        assert_eq!(worker.run(), WorkerExit::RetriesExhausted { failures: 4 });
        assert_eq!(connector.connect_attempts(), 4);
    }

    #[test]
    fn test_shutdown_interrupts_backoff() {
        let shutdown = ShutdownSignal::new();
        let connector = MockConnector::new();
        connector.fail_connects(usize::MAX);

        let mut config = fast_config();
        config.reconnect = ReconnectConfig {
            initial_backoff_ms: 60_000,
            max_backoff_ms: 60_000,
            multiplier: 1.0,
            jitter: 0.0,
            max_retries: None,
        };
        let mut worker =
            ConnectionWorker::new(1, 1, chunk(2), connector.clone(), &config, shutdown.clone());

        let trigger = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            shutdown.trigger();
        });
        let start = std::time::Instant::now();
        assert_eq!(worker.run(), WorkerExit::Shutdown);
        assert!(start.elapsed() < Duration::from_secs(30));
        assert_eq!(connector.connect_attempts(), 1);
        trigger.join().unwrap();
    }

    /// Accepts connections whose writes always time out.
    #[derive(Clone, Default)]
    struct StalledConnector {
        connects: Arc<std::sync::atomic::AtomicUsize>,
    }

    struct StalledStream;

    impl Write for StalledStream {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            std::thread::sleep(Duration::from_millis(5));
            Err(io::Error::new(io::ErrorKind::WouldBlock, "write timed out"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Connector for StalledConnector {
        type Stream = StalledStream;

        fn connect(&mut self) -> crate::error::Result<StalledStream> {
            self.connects
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            Ok(StalledStream)
        }

        fn peer(&self) -> String {
            "stalled".to_string()
        }
    }

    #[test]
    fn test_stalled_server_does_not_block_shutdown() {
        let shutdown = ShutdownSignal::new();
        let connector = StalledConnector::default();
        let connects = Arc::clone(&connector.connects);
        let mut worker =
            ConnectionWorker::new(1, 1, chunk(3), connector, &fast_config(), shutdown.clone());
        let stats = worker.stats();

        let handle = std::thread::spawn(move || worker.run());
        std::thread::sleep(Duration::from_millis(100));
        shutdown.trigger();

        assert_eq!(handle.join().unwrap(), WorkerExit::Shutdown);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.commands_sent, 0);
        assert!(snapshot.write_failures >= 1);
        // Every timed-out write drops the connection and opens a new one
        assert_eq!(
            connects.load(std::sync::atomic::Ordering::Relaxed) as u64,
            snapshot.connections
        );
    }

    #[test]
    fn test_empty_chunk_never_connects() {
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();
        let connector = MockConnector::new();

        let mut worker =
            ConnectionWorker::new(1, 1, chunk(0), connector.clone(), &fast_config(), shutdown);
        assert_eq!(worker.run(), WorkerExit::Shutdown);
        assert_eq!(connector.connect_attempts(), 0);
    }
}

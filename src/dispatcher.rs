//! Worker pool startup and lifetime.
//!
//! [`dispatch`] partitions the command sequence, starts one named thread per
//! chunk and returns immediately. The returned [`FloodHandle`] is the only way
//! to stop the workers again: it signals shutdown and joins them, either
//! explicitly through [`FloodHandle::stop`] or when dropped.

use crate::builder::CommandSequence;
use crate::error::Result;
use crate::partition::partition;
use crate::shared::{ShutdownSignal, StatsSnapshot, WorkerStats};
use crate::transport::Connector;
use crate::worker::{ConnectionWorker, WorkerConfig, WorkerExit};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Running flood: worker threads plus their counters.
pub struct FloodHandle {
    workers: Vec<JoinHandle<WorkerExit>>,
    stats: Vec<Arc<WorkerStats>>,
    shutdown: ShutdownSignal,
}

/// Start one worker per chunk of `sequence` and return without waiting.
///
/// Each worker gets its own clone of `connector`. An empty sequence starts no
/// workers.
pub fn dispatch<C>(
    sequence: &CommandSequence,
    connector: C,
    workers: usize,
    config: &WorkerConfig,
    shutdown: ShutdownSignal,
) -> Result<FloodHandle>
where
    C: Connector + Clone + 'static,
    C::Stream: 'static,
{
    let chunks = partition(sequence, workers)?;
    if chunks.is_empty() {
        log::warn!("No commands to send, not starting any workers");
    } else if chunks.len() < workers {
        log::info!(
            "{} commands fill only {} of {} requested workers",
            sequence.len(),
            chunks.len(),
            workers
        );
    }
    log::info!("Sending pixels using {} workers ...", chunks.len());

    let total = chunks.len();
    let mut handle = FloodHandle {
        workers: Vec::with_capacity(total),
        stats: Vec::with_capacity(total),
        shutdown: shutdown.clone(),
    };

    for (i, chunk) in chunks.into_iter().enumerate() {
        let id = i + 1;
        let mut worker = ConnectionWorker::new(
            id,
            total,
            chunk,
            connector.clone(),
            config,
            shutdown.clone(),
        );
        handle.stats.push(worker.stats());

        // On spawn failure `handle` is dropped, which stops the workers
        // already started
        let thread = thread::Builder::new()
            .name(format!("flood-worker-{}", id))
            .spawn(move || worker.run())?;
        handle.workers.push(thread);
    }

    Ok(handle)
}

impl FloodHandle {
    /// Number of worker threads started
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Counters summed over all workers
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.iter().map(|s| s.snapshot()).sum()
    }

    /// Counters per worker, in chunk order
    pub fn worker_stats(&self) -> Vec<StatsSnapshot> {
        self.stats.iter().map(|s| s.snapshot()).collect()
    }

    /// True once every worker thread has returned
    pub fn is_finished(&self) -> bool {
        self.workers.iter().all(JoinHandle::is_finished)
    }

    /// Signal shutdown and wait for all workers
    pub fn stop(mut self) -> Vec<WorkerExit> {
        self.shutdown_and_join()
    }

    fn shutdown_and_join(&mut self) -> Vec<WorkerExit> {
        self.shutdown.trigger();
        let mut exits = Vec::with_capacity(self.workers.len());
        for worker in self.workers.drain(..) {
            let name = worker.thread().name().unwrap_or("flood-worker").to_string();
            match worker.join() {
                Ok(exit) => exits.push(exit),
                Err(e) => log::error!("{} panicked: {:?}", name, e),
            }
        }
        exits
    }
}

impl Drop for FloodHandle {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shutdown_and_join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{encode, PixelSample};
    use crate::config::ReconnectConfig;
    use crate::transport::MockConnector;
    use std::time::{Duration, Instant};

    fn sequence(len: u64) -> CommandSequence {
        (0..len)
            .filter_map(|i| encode(&PixelSample::new(i, 0, [0, 0xff, 0, 0xff])))
            .collect::<Vec<_>>()
            .into()
    }

    fn config() -> WorkerConfig {
        WorkerConfig {
            reconnect: ReconnectConfig::immediate(),
            jitter_seed: Some(3),
            ..WorkerConfig::default()
        }
    }

    fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        done()
    }

    #[test]
    fn test_one_worker_per_chunk() {
        let connector = MockConnector::new();
        let handle = dispatch(
            &sequence(10),
            connector.clone(),
            4,
            &config(),
            ShutdownSignal::new(),
        )
        .unwrap();

        assert_eq!(handle.worker_count(), 4);
        assert!(wait_until(Duration::from_secs(10), || {
            handle.worker_stats().iter().all(|s| s.passes > 0)
        }));

        let exits = handle.stop();
        assert_eq!(exits, vec![WorkerExit::Shutdown; 4]);
        assert_eq!(connector.connection_count(), 4);
        assert!((0..4).all(|i| connector.is_closed(i)));
    }

    #[test]
    fn test_empty_sequence_starts_no_workers() {
        let handle = dispatch(
            &sequence(0),
            MockConnector::new(),
            3,
            &config(),
            ShutdownSignal::new(),
        )
        .unwrap();
        assert_eq!(handle.worker_count(), 0);
        assert!(handle.is_finished());
        assert!(handle.stop().is_empty());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = dispatch(
            &sequence(5),
            MockConnector::new(),
            0,
            &config(),
            ShutdownSignal::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_failing_worker_does_not_stop_others() {
        let connector = MockConnector::new();
        // Worker connections break after one write, the others never do
        connector.fail_writes([Some(1), None, None, Some(1), None, None]);

        let handle = dispatch(
            &sequence(6),
            connector.clone(),
            2,
            &config(),
            ShutdownSignal::new(),
        )
        .unwrap();

        assert!(wait_until(Duration::from_secs(10), || {
            let stats = handle.worker_stats();
            stats.iter().all(|s| s.passes >= 3)
        }));
        assert!(!handle.is_finished());

        let stats = handle.stats();
        assert!(stats.write_failures >= 1);
        drop(handle);
        assert!((0..connector.connection_count()).all(|i| connector.is_closed(i)));
    }

    #[test]
    fn test_drop_stops_workers() {
        let shutdown = ShutdownSignal::new();
        let connector = MockConnector::new();
        let handle = dispatch(
            &sequence(4),
            connector.clone(),
            2,
            &config(),
            shutdown.clone(),
        )
        .unwrap();
        assert!(wait_until(Duration::from_secs(10), || handle.stats().passes >= 2));

        drop(handle);
        assert!(shutdown.is_triggered());
        assert!((0..connector.connection_count()).all(|i| connector.is_closed(i)));
    }
}

//! Mock transport for testing
//!
//! Records every byte written on every connection and can inject connect
//! failures and write failures on a chosen write of a chosen connection.

use super::Connector;
use crate::command::DrawCommand;
use crate::error::{FloodError, Result};
use crate::shared::ShutdownSignal;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

/// In-memory connector. Clones share the same recorded state.
#[derive(Clone, Default)]
pub struct MockConnector {
    inner: Arc<Mutex<MockConnectorInner>>,
}

#[derive(Default)]
struct MockConnectorInner {
    connect_attempts: usize,
    failing_connects: usize,
    write_failures: VecDeque<Option<usize>>,
    connections: Vec<MockConnection>,
    total_writes: usize,
    stop_after: Option<(usize, ShutdownSignal)>,
}

#[derive(Default)]
struct MockConnection {
    written: Vec<u8>,
    closed: bool,
}

impl MockConnector {
    /// Create a new mock connector
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` connect attempts
    pub fn fail_connects(&self, count: usize) {
        self.lock().failing_connects = count;
    }

    /// Plan write failures per connection, in connect order.
    ///
    /// `Some(k)` makes the k-th write (0-based) on that connection fail;
    /// `None` never fails. Connections beyond the plan never fail.
    pub fn fail_writes(&self, plan: impl IntoIterator<Item = Option<usize>>) {
        self.lock().write_failures = plan.into_iter().collect();
    }

    /// Trigger `shutdown` once `writes` successful writes have been made in total
    pub fn stop_after_writes(&self, writes: usize, shutdown: ShutdownSignal) {
        self.lock().stop_after = Some((writes, shutdown));
    }

    /// Number of connect attempts, successful or not
    pub fn connect_attempts(&self) -> usize {
        self.lock().connect_attempts
    }

    /// Number of connections successfully opened
    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    /// Bytes written on connection `index`
    pub fn written(&self, index: usize) -> Vec<u8> {
        self.lock()
            .connections
            .get(index)
            .map(|c| c.written.clone())
            .unwrap_or_default()
    }

    /// Lines written on connection `index`, newline included
    pub fn lines(&self, index: usize) -> Vec<String> {
        String::from_utf8_lossy(&self.written(index))
            .split_inclusive('\n')
            .map(str::to_string)
            .collect()
    }

    /// Draw commands written on connection `index`.
    ///
    /// Fails on the first line that is not a well-formed `PX` command.
    pub fn commands(&self, index: usize) -> Result<Vec<DrawCommand>> {
        self.lines(index)
            .iter()
            .map(|line| DrawCommand::parse(line))
            .collect()
    }

    /// Whether connection `index` has been dropped by its owner
    pub fn is_closed(&self, index: usize) -> bool {
        self.lock()
            .connections
            .get(index)
            .is_some_and(|c| c.closed)
    }

    fn lock(&self) -> MutexGuard<'_, MockConnectorInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Connector for MockConnector {
    type Stream = MockStream;

    fn connect(&mut self) -> Result<MockStream> {
        let mut inner = self.lock();
        inner.connect_attempts += 1;

        if inner.failing_connects > 0 {
            inner.failing_connects -= 1;
            return Err(FloodError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "mock connection refused",
            )));
        }

        let fail_at = inner.write_failures.pop_front().flatten();
        inner.connections.push(MockConnection::default());
        Ok(MockStream {
            inner: Arc::clone(&self.inner),
            index: inner.connections.len() - 1,
            writes: 0,
            fail_at,
        })
    }

    fn peer(&self) -> String {
        "mock".to_string()
    }
}

/// One open mock connection
pub struct MockStream {
    inner: Arc<Mutex<MockConnectorInner>>,
    index: usize,
    writes: usize,
    fail_at: Option<usize>,
}

impl MockStream {
    fn lock(&self) -> MutexGuard<'_, MockConnectorInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail_at == Some(self.writes) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock broken pipe"));
        }
        self.writes += 1;

        let index = self.index;
        let mut inner = self.lock();
        inner.connections[index].written.extend_from_slice(buf);
        inner.total_writes += 1;
        if let Some((limit, shutdown)) = &inner.stop_after {
            if inner.total_writes >= *limit {
                shutdown.trigger();
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        let index = self.index;
        self.lock().connections[index].closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_writes_per_connection() {
        let mut connector = MockConnector::new();
        let mut first = connector.connect().unwrap();
        first.write_all(b"PX 0 0 000000ff\n").unwrap();
        drop(first);
        let mut second = connector.connect().unwrap();
        second.write_all(b"PX 1 1 ffffffff\n").unwrap();

        assert_eq!(connector.connection_count(), 2);
        assert_eq!(connector.lines(0), vec!["PX 0 0 000000ff\n"]);
        assert_eq!(connector.lines(1), vec!["PX 1 1 ffffffff\n"]);
        assert!(connector.is_closed(0));
        assert!(!connector.is_closed(1));
    }

    #[test]
    fn test_commands_are_parsed() {
        let mut connector = MockConnector::new();
        let mut stream = connector.connect().unwrap();
        stream.write_all(b"PX 3 4 0a0b0c0d\n").unwrap();

        let commands = connector.commands(0).unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!((commands[0].x, commands[0].y), (3, 4));
        assert_eq!(commands[0].rgba, [0x0a, 0x0b, 0x0c, 0x0d]);

        stream.write_all(b"garbage\n").unwrap();
        assert!(connector.commands(0).is_err());
    }

    #[test]
    fn test_injected_failures() {
        let mut connector = MockConnector::new();
        connector.fail_connects(2);
        connector.fail_writes([Some(1)]);

        assert!(connector.connect().is_err());
        assert!(connector.connect().is_err());
        let mut stream = connector.connect().unwrap();
        assert_eq!(connector.connect_attempts(), 3);

        assert!(stream.write_all(b"a").is_ok());
        assert!(stream.write_all(b"b").is_err());
        assert_eq!(connector.written(0), b"a");
    }
}

//! TCP transport implementation

use super::Connector;
use crate::config::TargetConfig;
use crate::error::{FloodError, Result};
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Connector for plain TCP Pixelflut servers
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: String,
    timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    nodelay: bool,
}

impl TcpConnector {
    /// Connector for `address` (`host:port`) with OS default timeouts
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            timeout: None,
            write_timeout: None,
            nodelay: true,
        }
    }

    /// Connector built from the `[target]` configuration section
    pub fn from_config(target: &TargetConfig) -> Self {
        Self::new(target.address())
            .with_timeout(target.connect_timeout())
            .with_write_timeout(target.write_timeout())
            .with_nodelay(target.nodelay)
    }

    /// Connect timeout; `None` waits as long as the OS does
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Longest a single write may block; `None` blocks until the server reads
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    fn connect_addr(&self, addr: &SocketAddr) -> io::Result<TcpStream> {
        match self.timeout {
            Some(timeout) => TcpStream::connect_timeout(addr, timeout),
            None => TcpStream::connect(addr),
        }
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&mut self) -> Result<TcpStream> {
        // Resolve on every attempt so DNS changes are picked up on reconnect
        let mut last_err = None;
        for addr in self.address.to_socket_addrs()? {
            match self.connect_addr(&addr) {
                Ok(stream) => {
                    stream.set_write_timeout(self.write_timeout)?;
                    if self.nodelay {
                        if let Err(e) = stream.set_nodelay(true) {
                            log::debug!("Failed to set TCP_NODELAY on {}: {}", addr, e);
                        }
                    }
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }

        Err(match last_err {
            Some(e) => FloodError::Io(e),
            None => FloodError::Other(format!("{} did not resolve to any address", self.address)),
        })
    }

    fn peer(&self) -> String {
        self.address.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::time::Instant;

    #[test]
    fn test_connect_and_write() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut connector =
            TcpConnector::new(addr.to_string()).with_timeout(Some(Duration::from_secs(2)));
        let mut stream = connector.connect().unwrap();
        stream.write_all(b"PX 1 2 ff0000ff\n").unwrap();
        drop(stream);

        let (mut server, _) = listener.accept().unwrap();
        let mut received = String::new();
        server.read_to_string(&mut received).unwrap();
        assert_eq!(received, "PX 1 2 ff0000ff\n");
    }

    #[test]
    fn test_from_config_applies_timeouts() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut target = TargetConfig::default();
        target.port = listener.local_addr().unwrap().port();
        target.write_timeout_ms = 250;

        let mut connector = TcpConnector::from_config(&target);
        assert_eq!(connector.peer(), target.address());
        let stream = connector.connect().unwrap();
        assert_eq!(stream.write_timeout().unwrap(), Some(Duration::from_millis(250)));
        assert!(stream.nodelay().unwrap());

        target.write_timeout_ms = 0;
        let stream = TcpConnector::from_config(&target).connect().unwrap();
        assert_eq!(stream.write_timeout().unwrap(), None);
    }

    #[test]
    fn test_write_times_out_when_server_stops_reading() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut connector = TcpConnector::new(addr.to_string())
            .with_write_timeout(Some(Duration::from_millis(100)));
        let mut stream = connector.connect().unwrap();
        // Accepted but never read, so the socket buffers eventually fill up
        let (_server, _) = listener.accept().unwrap();

        let line = [b'x'; 4096];
        let start = Instant::now();
        let err = loop {
            if let Err(e) = stream.write_all(&line) {
                break e;
            }
            assert!(start.elapsed() < Duration::from_secs(30), "write never blocked");
        };
        assert!(matches!(
            err.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
        ));
    }

    #[test]
    fn test_connect_refused_is_error() {
        // Bind then drop to get a port nobody listens on
        let addr = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();
        let mut connector = TcpConnector::new(addr.to_string());
        assert!(connector.connect().is_err());
    }

    #[test]
    fn test_unresolvable_address_is_error() {
        let mut connector = TcpConnector::new("not an address");
        assert!(connector.connect().is_err());
    }
}

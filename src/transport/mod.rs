//! Transport layer for worker connections

use crate::error::Result;
use std::io::Write;

pub mod mock;
mod tcp;

pub use mock::{MockConnector, MockStream};
pub use tcp::TcpConnector;

/// Opens connections to the Pixelflut server.
///
/// Each worker owns its own connector (they are cloned per worker) and holds
/// at most one stream at a time. Dropping the stream closes the connection.
pub trait Connector: Send {
    /// Write half of an open connection
    type Stream: Write + Send;

    /// Open a new connection
    fn connect(&mut self) -> Result<Self::Stream>;

    /// Human-readable peer description for log messages
    fn peer(&self) -> String;
}

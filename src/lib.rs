//! pixelflood - multi-connection Pixelflut client
//!
//! Turns an image into `PX <x> <y> <rrggbbaa>` draw commands and streams them
//! to a Pixelflut server over several self-healing TCP connections.
//!
//! ## Pipeline
//!
//! - [`image_source`]: decode and resize the image into a [`PixelGrid`]
//! - [`builder`]: walk the grid, encode pixels, shuffle once
//! - [`partition`]: cut the sequence into one contiguous chunk per worker
//! - [`worker`]: stream a chunk forever, reconnecting on failure
//! - [`dispatcher`]: start the workers and hand back a [`FloodHandle`]

pub mod backoff;
pub mod builder;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod image_source;
pub mod partition;
pub mod shared;
pub mod transport;
pub mod worker;

// Re-export commonly used types
pub use builder::{CommandSequence, CommandSetBuilder};
pub use command::{encode, Command, DrawCommand, PixelSample};
pub use config::FloodConfig;
pub use dispatcher::{dispatch, FloodHandle};
pub use error::{FloodError, Result};
pub use image_source::{load_and_resize, PixelGrid};
pub use partition::{partition, Chunk};
pub use shared::{ShutdownSignal, StatsSnapshot};
pub use transport::{Connector, MockConnector, TcpConnector};
pub use worker::{ConnectionWorker, WorkerConfig, WorkerExit};

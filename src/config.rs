//! Configuration loading for pixelflood
//!
//! Every field has a default so a TOML file only needs to name what differs.
//! Command-line arguments are applied on top of the loaded file.

use crate::error::{FloodError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct FloodConfig {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub flood: WorkerPoolConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Pixelflut server to flood
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct TargetConfig {
    /// Server host name or IP address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server TCP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Connection timeout in milliseconds (0 = OS default)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Write timeout in milliseconds (0 = block until the server reads).
    /// Bounds how long a stalled server can hold a worker.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,

    /// Disable Nagle's algorithm on worker sockets
    #[serde(default = "default_nodelay")]
    pub nodelay: bool,
}

/// Image to draw and where to place it
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ImageConfig {
    /// Path to the image file
    #[serde(default)]
    pub path: String,

    /// Width to resize to; height keeps the aspect ratio
    #[serde(default = "default_width")]
    pub width: u32,

    /// Canvas x coordinate of the image's left edge
    #[serde(default)]
    pub x: u32,

    /// Canvas y coordinate of the image's top edge
    #[serde(default)]
    pub y: u32,
}

/// Worker pool settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WorkerPoolConfig {
    /// Number of concurrent connections
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Send only every Nth visited pixel (1 = every pixel)
    #[serde(default = "default_stride")]
    pub stride: u32,

    /// Shuffle seed; random when absent
    #[serde(default)]
    pub seed: Option<u64>,

    /// Where a worker continues in its chunk after reconnecting
    #[serde(default)]
    pub resume: ResumePolicy,
}

/// Position a worker continues from after a reconnect.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResumePolicy {
    /// Start over from the first command of the chunk
    #[default]
    Restart,
    /// Continue with the command that failed
    Resume,
}

/// Reconnect backoff settings
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ReconnectConfig {
    /// Delay after the first failed connect attempt (0 = retry immediately)
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the delay
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Growth factor applied after each consecutive failure
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Fraction of the delay randomly shaved off (0.0 - 1.0)
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Consecutive connect failures before a worker gives up (absent = never)
    #[serde(default)]
    pub max_retries: Option<u32>,
}

/// Logging configuration
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[serde(default = "default_level")]
    pub level: String,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    1234
}
fn default_connect_timeout() -> u64 {
    5000
}
fn default_write_timeout() -> u64 {
    1000
}
fn default_nodelay() -> bool {
    true
}
fn default_width() -> u32 {
    100
}
fn default_workers() -> usize {
    4
}
fn default_stride() -> u32 {
    1
}
fn default_initial_backoff() -> u64 {
    50
}
fn default_max_backoff() -> u64 {
    5000
}
fn default_multiplier() -> f64 {
    2.0
}
fn default_jitter() -> f64 {
    0.2
}
fn default_level() -> String {
    "info".to_string()
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout_ms: default_connect_timeout(),
            write_timeout_ms: default_write_timeout(),
            nodelay: default_nodelay(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            width: default_width(),
            x: 0,
            y: 0,
        }
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            stride: default_stride(),
            seed: None,
            resume: ResumePolicy::default(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
            max_retries: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

impl ReconnectConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Reconnect immediately and forever.
    #[cfg(test)]
    pub fn immediate() -> Self {
        Self {
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            multiplier: 1.0,
            jitter: 0.0,
            max_retries: None,
        }
    }
}

impl TargetConfig {
    /// `host:port` string for connecting
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        match self.connect_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        match self.write_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

impl FloodConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FloodError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: FloodConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Check value ranges the rest of the program relies on
    pub fn validate(&self) -> Result<()> {
        if self.target.host.is_empty() {
            return Err(invalid("target.host must not be empty"));
        }
        if self.target.port == 0 {
            return Err(invalid("target.port must not be 0"));
        }
        if self.image.path.is_empty() {
            return Err(invalid("image.path must not be empty"));
        }
        if self.flood.workers == 0 {
            return Err(invalid("flood.workers must be at least 1"));
        }
        if self.flood.stride == 0 {
            return Err(invalid("flood.stride must be at least 1"));
        }

        let reconnect = &self.reconnect;
        if reconnect.multiplier.is_nan() || reconnect.multiplier < 1.0 {
            return Err(invalid("reconnect.multiplier must be >= 1.0"));
        }
        if !(0.0..=1.0).contains(&reconnect.jitter) {
            return Err(invalid("reconnect.jitter must be within 0.0 - 1.0"));
        }
        if reconnect.max_backoff_ms < reconnect.initial_backoff_ms {
            return Err(invalid(
                "reconnect.max_backoff_ms must be >= reconnect.initial_backoff_ms",
            ));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> FloodError {
    FloodError::InvalidParameter(msg.to_string())
}

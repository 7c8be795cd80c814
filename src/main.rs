//! pixelflood - floods an image onto a Pixelflut canvas
//!
//! ```text
//! pixelflood <HOST> <PORT> <IMAGE> <WIDTH> <X> <Y> <WORKERS> [STRIDE]
//! pixelflood --config flood.toml [overrides...]
//! ```
//!
//! Runs until Ctrl-C, SIGTERM, or a line on stdin.

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use pixelflood::config::{FloodConfig, ResumePolicy};
use pixelflood::{
    dispatch, load_and_resize, CommandSetBuilder, Result, ShutdownSignal, StatsSnapshot,
    TcpConnector, WorkerConfig, WorkerExit,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

/// Interval between statistics log lines
const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// Multi-connection Pixelflut client
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server host name or IP address
    #[arg(required_unless_present = "config")]
    host: Option<String>,

    /// Server TCP port
    #[arg(required_unless_present = "config")]
    port: Option<u16>,

    /// Image file to draw
    #[arg(required_unless_present = "config")]
    image: Option<PathBuf>,

    /// Width to resize the image to (height keeps the aspect ratio)
    #[arg(required_unless_present = "config")]
    width: Option<u32>,

    /// Canvas x coordinate of the image's left edge
    #[arg(required_unless_present = "config")]
    x: Option<u32>,

    /// Canvas y coordinate of the image's top edge
    #[arg(required_unless_present = "config")]
    y: Option<u32>,

    /// Number of concurrent connections
    #[arg(required_unless_present = "config")]
    workers: Option<usize>,

    /// Send only every Nth pixel
    stride: Option<u32>,

    /// TOML configuration file; positional arguments override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed for the pixel shuffle (random when omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Continue mid-chunk after a reconnect instead of starting over
    #[arg(long)]
    resume_mid_chunk: bool,

    /// Initial reconnect delay in milliseconds (0 = retry immediately)
    #[arg(long)]
    backoff_ms: Option<u64>,

    /// Maximum reconnect delay in milliseconds
    #[arg(long)]
    max_backoff_ms: Option<u64>,

    /// Consecutive connect failures before a worker gives up
    #[arg(long)]
    max_retries: Option<u32>,

    /// TCP connect timeout in milliseconds (0 = OS default)
    #[arg(long)]
    connect_timeout_ms: Option<u64>,

    /// Give up on a write after this many milliseconds (0 = wait forever)
    #[arg(long)]
    write_timeout_ms: Option<u64>,
}

impl Args {
    /// Load the config file (if any) and apply command-line overrides
    fn into_config(self) -> Result<FloodConfig> {
        let mut config = match &self.config {
            Some(path) => FloodConfig::load(path)?,
            None => FloodConfig::default(),
        };

        if let Some(host) = self.host {
            config.target.host = host;
        }
        if let Some(port) = self.port {
            config.target.port = port;
        }
        if let Some(ms) = self.connect_timeout_ms {
            config.target.connect_timeout_ms = ms;
        }
        if let Some(ms) = self.write_timeout_ms {
            config.target.write_timeout_ms = ms;
        }
        if let Some(image) = self.image {
            config.image.path = image.to_string_lossy().into_owned();
        }
        if let Some(width) = self.width {
            config.image.width = width;
        }
        if let Some(x) = self.x {
            config.image.x = x;
        }
        if let Some(y) = self.y {
            config.image.y = y;
        }
        if let Some(workers) = self.workers {
            config.flood.workers = workers;
        }
        if let Some(stride) = self.stride {
            config.flood.stride = stride;
        }
        if self.seed.is_some() {
            config.flood.seed = self.seed;
        }
        if self.resume_mid_chunk {
            config.flood.resume = ResumePolicy::Resume;
        }
        if let Some(ms) = self.backoff_ms {
            config.reconnect.initial_backoff_ms = ms;
            config.reconnect.max_backoff_ms = config.reconnect.max_backoff_ms.max(ms);
        }
        if let Some(ms) = self.max_backoff_ms {
            config.reconnect.max_backoff_ms = ms;
        }
        if self.max_retries.is_some() {
            config.reconnect.max_retries = self.max_retries;
        }

        config.validate()?;
        Ok(config)
    }
}

fn print_usage() {
    let mut cmd = Args::command();
    println!("{}", cmd.render_usage());
    println!();
    println!("example:");
    println!(" pixelflood 94.45.232.48 1234 Logo_leiter.png 800 42 23 10 2");
    println!();
    println!("Run with --help for all options.");
}

fn main() -> Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if e.kind() == ErrorKind::MissingRequiredArgument => {
            print_usage();
            return Ok(());
        }
        Err(e) => e.exit(),
    };
    let config = args.into_config()?;

    // Initialize logger
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("pixelflood v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!("server:   {}", config.target.address());
    log::info!("image:    {}", config.image.path);
    log::info!(" - x,y:   {}, {}", config.image.x, config.image.y);
    log::info!(" - width: {}", config.image.width);

    // Image problems are fatal and surface before any connection is made
    let grid = load_and_resize(&config.image.path, config.image.width)?;

    log::info!("Extracting pixel data from image ...");
    let builder =
        CommandSetBuilder::new(config.image.x, config.image.y).with_stride(config.flood.stride)?;
    let mut rng = match config.flood.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let sequence = builder.build(&grid, &mut rng);
    log::info!(
        "{} commands from {} pixels (stride {}), shuffled",
        sequence.len(),
        grid.area(),
        builder.stride()
    );

    let shutdown = ShutdownSignal::new();
    setup_signal_handler(&shutdown)?;
    spawn_stdin_watcher(&shutdown)?;

    let worker_config = WorkerConfig {
        reconnect: config.reconnect.clone(),
        resume: config.flood.resume,
        jitter_seed: config.flood.seed,
    };
    let connector = TcpConnector::from_config(&config.target);
    let handle = dispatch(
        &sequence,
        connector,
        config.flood.workers,
        &worker_config,
        shutdown.clone(),
    )?;

    if handle.worker_count() == 0 {
        log::warn!("Nothing to draw, exiting");
        return Ok(());
    }

    log::info!("Flooding {}. Press Enter or Ctrl+C to stop", config.target.address());

    let mut last_stats = Instant::now();
    let mut last_snapshot = StatsSnapshot::default();
    while !shutdown.sleep(Duration::from_millis(100)) {
        if last_stats.elapsed() >= STATS_INTERVAL {
            let snapshot = handle.stats();
            log_statistics(&snapshot, &last_snapshot, last_stats.elapsed());
            for (i, worker) in handle.worker_stats().iter().enumerate() {
                log::debug!(
                    " - worker {}: {} commands, {} passes, {} connections",
                    i + 1,
                    worker.commands_sent,
                    worker.passes,
                    worker.connections
                );
            }
            last_snapshot = snapshot;
            last_stats = Instant::now();
        }

        if handle.is_finished() {
            log::warn!("All workers have stopped");
            break;
        }
    }

    log::info!("Shutting down...");
    let final_stats = handle.stats();
    let exits = handle.stop();
    let gave_up = exits
        .iter()
        .filter(|e| matches!(e, WorkerExit::RetriesExhausted { .. }))
        .count();
    if gave_up > 0 {
        log::warn!("{} of {} workers gave up reconnecting", gave_up, exits.len());
    }
    log::info!(
        "Sent {} commands ({} bytes) over {} connections",
        final_stats.commands_sent, final_stats.bytes_sent, final_stats.connections
    );
    log::info!("pixelflood stopped");
    Ok(())
}

/// Trigger shutdown on SIGINT or SIGTERM; a second signal exits at once
fn setup_signal_handler(shutdown: &ShutdownSignal) -> Result<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let shutdown = shutdown.clone();

    thread::Builder::new()
        .name("signal-handler".to_string())
        .spawn(move || {
            for sig in signals.forever() {
                if shutdown.is_triggered() {
                    log::warn!("Received signal {} during shutdown, exiting now", sig);
                    std::process::exit(128 + sig);
                }
                log::info!("Received signal {}, initiating shutdown...", sig);
                shutdown.trigger();
            }
        })?;
    Ok(())
}

/// Trigger shutdown when the operator presses Enter.
///
/// A closed stdin (daemon, redirected from /dev/null) does not stop the flood.
fn spawn_stdin_watcher(shutdown: &ShutdownSignal) -> Result<()> {
    let shutdown = shutdown.clone();

    thread::Builder::new()
        .name("stdin-watcher".to_string())
        .spawn(move || {
            let mut line = String::new();
            match std::io::stdin().lock().read_line(&mut line) {
                Ok(0) => log::debug!("stdin closed, only signals stop the flood"),
                Ok(_) => {
                    log::info!("Input received, initiating shutdown...");
                    shutdown.trigger();
                }
                Err(e) => log::debug!("stdin unreadable ({}), only signals stop the flood", e),
            }
        })?;
    Ok(())
}

fn log_statistics(now: &StatsSnapshot, before: &StatsSnapshot, elapsed: Duration) {
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    let rate = (now.commands_sent - before.commands_sent) as f64 / secs;
    let mbit = (now.bytes_sent - before.bytes_sent) as f64 * 8.0 / secs / 1_000_000.0;
    log::info!(
        "{} commands sent ({:.0}/s, {:.1} Mbit/s), {} passes, {} connections, {} connect failures, {} write failures",
        now.commands_sent,
        rate,
        mbit,
        now.passes,
        now.connections,
        now.connect_failures,
        now.write_failures
    );
}

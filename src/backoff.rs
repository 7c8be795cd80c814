//! Reconnect delays.
//!
//! Capped exponential backoff with random jitter. The delay after the n-th
//! consecutive failure is `min(initial * multiplier^(n-1), max)`, reduced by a
//! random fraction of up to `jitter`. A zero initial delay means immediate
//! retries.

use crate::config::ReconnectConfig;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Backoff state for one worker.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
    current: Duration,
    failures: u32,
    rng: SmallRng,
}

impl Backoff {
    /// Backoff with jitter drawn from OS entropy.
    pub fn new(config: &ReconnectConfig) -> Self {
        Self::with_rng(config, SmallRng::from_entropy())
    }

    /// Backoff with a seeded jitter source, for reproducible delays.
    pub fn seeded(config: &ReconnectConfig, seed: u64) -> Self {
        Self::with_rng(config, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(config: &ReconnectConfig, rng: SmallRng) -> Self {
        let initial = config.initial_backoff();
        Self {
            initial,
            max: config.max_backoff().max(initial),
            multiplier: if config.multiplier.is_finite() {
                config.multiplier.max(1.0)
            } else {
                1.0
            },
            jitter: if config.jitter.is_nan() {
                0.0
            } else {
                config.jitter.clamp(0.0, 1.0)
            },
            current: initial,
            failures: 0,
            rng,
        }
    }

    /// Record a failure and return how long to wait before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let base = self.current;
        self.current = self.max.min(scale(base, self.multiplier));

        if self.jitter == 0.0 || base.is_zero() {
            return base;
        }
        let shave = self.rng.gen_range(0.0..=self.jitter);
        scale(base, 1.0 - shave)
    }

    /// Consecutive failures since the last reset.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Forget past failures after a successful connect.
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.failures = 0;
    }
}

/// `duration * factor`, rounded to the nanosecond and saturating.
fn scale(duration: Duration, factor: f64) -> Duration {
    Duration::from_nanos((duration.as_nanos() as f64 * factor).round() as u64)
}

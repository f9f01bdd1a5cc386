use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Lower bound of the jitter multiplier applied on the rate-limit path.
pub const JITTER_MIN: f64 = 0.9;
/// Upper bound (exclusive) of the jitter multiplier.
pub const JITTER_MAX: f64 = 1.1;

/// Source of the multiplier applied to a doubled backoff after a 429.
pub trait Jitter: Send + Sync {
    /// Returns a value in `[JITTER_MIN, JITTER_MAX)`.
    fn multiplier(&self) -> f64;
}

/// Uniform jitter drawn from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl Jitter for RandomJitter {
    fn multiplier(&self) -> f64 {
        rand::thread_rng().gen_range(JITTER_MIN..JITTER_MAX)
    }
}

/// Constant multiplier, mostly useful for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl Jitter for FixedJitter {
    fn multiplier(&self) -> f64 {
        self.0
    }
}

/// Backoff state carried across the attempts of one request.
///
/// Values are whole milliseconds and never exceed the configured ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    current_ms: u64,
    max_ms: u64,
}

impl Backoff {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            current_ms: config.initial_backoff_ms.min(config.max_backoff_ms),
            max_ms: config.max_backoff_ms,
        }
    }

    pub fn current_ms(&self) -> u64 {
        self.current_ms
    }

    pub fn current(&self) -> Duration {
        Duration::from_millis(self.current_ms)
    }

    /// Wait before retrying a 429. A numeric `Retry-After` (seconds) wins over
    /// the computed backoff and is not capped.
    pub fn rate_limit_wait(&self, retry_after: Option<&str>) -> Duration {
        match retry_after.and_then(parse_retry_after) {
            Some(seconds) => Duration::from_secs(seconds),
            None => self.current(),
        }
    }

    /// Rate-limit growth: `min(backoff * 2 * multiplier, max)`, truncated to whole ms.
    pub fn grow_with_jitter(&mut self, multiplier: f64) {
        let multiplier = multiplier.clamp(JITTER_MIN, JITTER_MAX);
        let next = (self.current_ms as f64) * 2.0 * multiplier;
        self.current_ms = (next.min(self.max_ms as f64)) as u64;
    }

    /// Transport-failure growth: plain doubling, no jitter.
    pub fn double(&mut self) {
        self.current_ms = self.current_ms.saturating_mul(2).min(self.max_ms);
    }
}

fn parse_retry_after(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok()
}

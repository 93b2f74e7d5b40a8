//! Randomised exponential backoff with a cap and a bounded number of attempts.
//!
//! Each wait is the current interval plus up to one second of jitter, and the
//! interval grows by `multiplier` after every wait until it reaches
//! `max_backoff`:
//!
//! ```text
//! attempt 1 ─✗─ sleep [1s, 2s) ─ attempt 2 ─✗─ sleep [2s, 3s) ─ attempt 3 ─✓
//! ```

use std::future::Future;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::{Error, Result};

pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(32);
pub const DEFAULT_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Upper bound (exclusive) of the jitter added to each wait, in milliseconds.
const JITTER_MS: u64 = 1000;

/// Exponential backoff state. Each engine owns its random source.
#[derive(Debug)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    max_backoff: Duration,
    multiplier: f64,
    max_retries: u32,
    current: Duration,
    rng: StdRng,
}

impl ExponentialBackoff {
    /// Validates the parameters and seeds the random source from the OS.
    ///
    /// Requires `initial_interval > 0`, `max_backoff >= initial_interval`,
    /// a finite `multiplier > 1` and `max_retries >= 1`.
    pub fn new(
        initial_interval: Duration,
        max_backoff: Duration,
        multiplier: f64,
        max_retries: u32,
    ) -> Result<Self> {
        Self::with_rng(initial_interval, max_backoff, multiplier, max_retries, StdRng::from_os_rng())
    }

    /// Like [`new`](Self::new) with a deterministic seed.
    pub fn with_seed(
        initial_interval: Duration,
        max_backoff: Duration,
        multiplier: f64,
        max_retries: u32,
        seed: u64,
    ) -> Result<Self> {
        Self::with_rng(initial_interval, max_backoff, multiplier, max_retries, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        initial_interval: Duration,
        max_backoff: Duration,
        multiplier: f64,
        max_retries: u32,
        rng: StdRng,
    ) -> Result<Self> {
        if initial_interval.is_zero() {
            return Err(Error::InvalidConfig("initial interval must be positive"));
        }
        if max_backoff < initial_interval {
            return Err(Error::InvalidConfig("max backoff must not be less than the initial interval"));
        }
        if !multiplier.is_finite() || multiplier <= 1.0 {
            return Err(Error::InvalidConfig("multiplier must be a finite value above 1"));
        }
        if max_retries == 0 {
            return Err(Error::InvalidConfig("max retries must be at least 1"));
        }
        Ok(Self {
            initial_interval,
            max_backoff,
            multiplier,
            max_retries,
            current: Duration::ZERO,
            rng,
        })
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// The interval the next wait starts from. Zero until the first retry.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Runs `f` up to `max_retries` times, sleeping between failures.
    ///
    /// Returns the first success, or the last error once the attempts are
    /// spent. No sleep follows the final attempt.
    pub async fn retry<F, Fut, T, E>(&mut self, mut f: F) -> std::result::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if self.current.is_zero() {
            self.current = self.initial_interval;
        }
        let mut attempt = 1;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.max_retries => return Err(e),
                Err(_) => {
                    let wait = self.next();
                    debug!(attempt, wait_ms = wait.as_millis() as u64, "retrying after failure");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Computes the next wait and grows the interval.
    pub fn next(&mut self) -> Duration {
        if self.current.is_zero() {
            self.current = self.initial_interval;
        }
        let jitter = Duration::from_millis(self.rng.random_range(0..JITTER_MS));
        let candidate = self.current.saturating_add(jitter);
        let grown = self.current.as_secs_f64() * self.multiplier;
        self.current = Duration::try_from_secs_f64(grown)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff));
        if candidate >= self.max_backoff {
            self.current = self.max_backoff;
            return self.max_backoff;
        }
        candidate
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            max_backoff: DEFAULT_MAX_BACKOFF,
            multiplier: DEFAULT_MULTIPLIER,
            max_retries: DEFAULT_MAX_RETRIES,
            current: Duration::ZERO,
            rng: StdRng::from_os_rng(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn engine(initial_ms: u64, max_ms: u64, retries: u32) -> ExponentialBackoff {
        ExponentialBackoff::with_seed(
            Duration::from_millis(initial_ms),
            Duration::from_millis(max_ms),
            2.0,
            retries,
            7,
        )
        .unwrap()
    }

    #[test]
    fn rejects_bad_parameters() {
        let s = Duration::from_secs(1);
        assert!(ExponentialBackoff::new(Duration::ZERO, s, 2.0, 3).is_err());
        assert!(ExponentialBackoff::new(s * 2, s, 2.0, 3).is_err());
        assert!(ExponentialBackoff::new(s, s, 1.0, 3).is_err());
        assert!(ExponentialBackoff::new(s, s, f64::NAN, 3).is_err());
        assert!(ExponentialBackoff::new(s, s, 2.0, 0).is_err());
    }

    #[test]
    fn first_wait_is_initial_plus_jitter() {
        let mut b = engine(1000, 32_000, 5);
        let first = b.next();
        assert!(first >= Duration::from_millis(1000));
        assert!(first < Duration::from_millis(2000));
        assert_eq!(b.current(), Duration::from_millis(2000));
    }

    #[test]
    fn waits_never_exceed_the_cap() {
        let mut b = engine(1000, 5000, 50);
        let mut last = Duration::ZERO;
        for _ in 0..20 {
            let wait = b.next();
            assert!(wait >= Duration::from_millis(1000));
            assert!(wait <= Duration::from_millis(5000));
            assert!(b.current() >= last);
            last = b.current();
        }
        assert_eq!(b.current(), Duration::from_millis(5000));
    }

    #[test]
    fn huge_multiplier_clamps_instead_of_overflowing() {
        let mut b = ExponentialBackoff::with_seed(
            Duration::from_secs(1),
            Duration::from_secs(32),
            1e20,
            3,
            1,
        )
        .unwrap();
        assert!(b.next() < Duration::from_secs(2));
        assert_eq!(b.current(), Duration::from_secs(32));
        assert_eq!(b.next(), Duration::from_secs(32));

        let mut unbounded =
            ExponentialBackoff::with_seed(Duration::from_secs(1), Duration::MAX, f64::MAX, 3, 1).unwrap();
        assert!(unbounded.next() < Duration::from_secs(2));
        assert_eq!(unbounded.next(), Duration::MAX);
        assert_eq!(unbounded.current(), Duration::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_stops_at_first_success() {
        let mut b = engine(100, 1000, 10);
        let calls = Cell::new(0);
        let start = tokio::time::Instant::now();

        let res: std::result::Result<u32, &str> = b
            .retry(|| {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { if n < 3 { Err("boom") } else { Ok(n) } }
            })
            .await;

        assert_eq!(res, Ok(3));
        assert_eq!(calls.get(), 3);
        let slept = start.elapsed();
        assert!(slept >= Duration::from_millis(100 + 200));
        assert!(slept <= Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_max_attempts() {
        let mut b = engine(10, 50, 4);
        let calls = Cell::new(0);
        let res: std::result::Result<(), u32> = b
            .retry(|| {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { Err(n) }
            })
            .await;
        assert_eq!(res, Err(4));
        assert_eq!(calls.get(), 4);
    }
}

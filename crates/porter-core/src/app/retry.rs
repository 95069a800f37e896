//! Retry policy: decides how long a poller backs off after a failed poll.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff with a cap and a bounded number of attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first failure.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound on any single delay.
    pub max_delay: Duration,

    /// Consecutive failures tolerated before the poller gives up.
    pub max_attempts: u32,

    /// Fraction of the delay added at random (0.0 = none).
    pub jitter: f64,
}

impl RetryPolicy {
    /// Default for pollers: 500ms, 1s, 2s, ... capped at 30s, 8 attempts.
    pub fn default_poll() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: 8,
            jitter: 0.1,
        }
    }

    /// Fixed, jitter-free policy. Handy in tests.
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay: delay,
            multiplier: 1.0,
            max_delay: delay,
            max_attempts,
            jitter: 0.0,
        }
    }

    /// Delay before retrying after `attempts` consecutive failures
    /// (1-indexed), without jitter.
    ///
    /// delay = min(base_delay * multiplier^(attempts - 1), max_delay)
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = i32::try_from(attempts.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs)
    }

    /// `None` once `attempts` has reached `max_attempts`.
    pub fn delay_for(&self, attempts: u32) -> Option<Duration> {
        if attempts >= self.max_attempts {
            return None;
        }
        let delay = self.next_delay(attempts);
        if self.jitter <= 0.0 {
            return Some(delay);
        }
        let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
        Some(delay.mul_f64(1.0 + extra))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::default_poll()
    }
}

//! Reconnection Policy
//!
//! Exponential backoff with jitter between DXLink reconnect attempts. The
//! session tears the socket down, waits `next_delay`, and re-runs the full
//! handshake until the attempt budget is spent.

use std::time::Duration;

use rand::Rng;

/// Backoff settings for reconnect attempts.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay before jitter.
    pub max_delay: Duration,
    /// Growth factor per attempt; values below 1 are treated as 1.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%), capped at 1.
    pub jitter_factor: f64,
    /// Attempts before giving up; 0 is treated as 1.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 3,
        }
    }
}

impl ReconnectConfig {
    /// Build from `SessionSettings`, keeping the default jitter.
    #[must_use]
    pub fn from_session_settings(settings: &crate::SessionSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            max_attempts: settings.max_reconnect_attempts,
            ..Self::default()
        }
    }

    /// Delay before attempt `attempt` (zero based), without jitter.
    ///
    /// `initial_delay * multiplier^attempt`, capped at `max_delay`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        let cap = self.max_delay.as_secs_f64();
        if scaled.is_finite() && scaled < cap {
            Duration::from_secs_f64(scaled)
        } else {
            self.max_delay
        }
    }
}

/// Attempt counter handing out jittered backoff delays.
///
/// One policy covers one reconnect sequence.
///
/// # Example
///
/// ```rust
/// use dxlink_options::infrastructure::dxlink::{ReconnectConfig, ReconnectPolicy};
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
///
/// while let Some(delay) = policy.next_delay() {
///     assert!(delay.as_millis() >= 900);
/// }
/// assert_eq!(policy.attempt_count(), 3);
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectPolicy {
    /// Start a fresh sequence.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once the budget is spent.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.config.max_attempts.max(1) {
            return None;
        }
        let delay = self.config.backoff(self.attempts);
        self.attempts += 1;
        Some(jitter(delay, self.config.jitter_factor))
    }

    /// Attempts handed out so far.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempts
    }
}

/// Scale `delay` by a random factor in `1 ± factor`.
fn jitter(delay: Duration, factor: f64) -> Duration {
    if factor.is_nan() || factor <= 0.0 || delay.is_zero() {
        return delay;
    }
    let factor = factor.min(1.0);
    let spread: f64 = rand::rng().random_range(-factor..=factor);
    delay.mul_f64(1.0 + spread)
}

/// Error type for reconnection failures.
#[derive(Debug, thiserror::Error)]
pub enum ReconnectError {
    /// Every attempt failed.
    #[error("reconnect failed after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last_error: String,
    },
    /// Shutdown was requested while waiting to retry.
    #[error("reconnect cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn without_jitter(
        initial_ms: u64,
        max_ms: u64,
        multiplier: f64,
        max_attempts: u32,
    ) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            multiplier,
            jitter_factor: 0.0,
            max_attempts,
        }
    }

    #[test]
    fn default_config_values() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!((config.multiplier - 2.0).abs() < f64::EPSILON);
        assert!((config.jitter_factor - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn delays_double_until_capped() {
        let mut policy = ReconnectPolicy::new(without_jitter(1000, 30_000, 2.0, 0));

        let delays: Vec<u128> = (0..7)
            .map(|_| policy.next_delay().unwrap().as_millis())
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16_000, 30_000, 30_000]);
    }

    #[test]
    fn multiplier_below_one_keeps_delay_flat() {
        let config = without_jitter(500, 10_000, 0.5, 0);
        assert_eq!(config.backoff(0), Duration::from_millis(500));
        assert_eq!(config.backoff(5), Duration::from_millis(500));
    }

    #[test]
    fn huge_attempt_numbers_saturate_at_cap() {
        let config = without_jitter(1000, 30_000, 2.0, 0);
        assert_eq!(config.backoff(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn budget_stops_after_max_attempts() {
        let mut policy = ReconnectPolicy::new(without_jitter(100, 1000, 2.0, 3));

        for expected in 1..=3 {
            assert!(policy.next_delay().is_some());
            assert_eq!(policy.attempt_count(), expected);
        }
        assert!(policy.next_delay().is_none());
        assert_eq!(policy.attempt_count(), 3);
    }

    #[test]
    fn zero_max_attempts_still_gives_up() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig {
            max_attempts: 0,
            ..ReconnectConfig::default()
        });
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_none());
        assert_eq!(policy.attempt_count(), 1);
    }

    #[test]
    fn jitter_stays_within_factor() {
        for _ in 0..100 {
            let delay = jitter(Duration::from_secs(1), 0.1).as_millis();
            assert!((900..=1100).contains(&delay), "delay {delay}ms out of bounds");
        }
        assert_eq!(jitter(Duration::from_secs(1), 0.0), Duration::from_secs(1));
        assert_eq!(jitter(Duration::ZERO, 0.5), Duration::ZERO);
    }

    #[test]
    fn default_budget_is_three_attempts() {
        let mut policy = ReconnectPolicy::new(ReconnectConfig::default());
        let mut attempts = 0;
        while let Some(delay) = policy.next_delay() {
            assert!(delay <= Duration::from_secs(5));
            attempts += 1;
        }
        assert_eq!(attempts, 3);
    }

    #[test]
    fn exhausted_error_names_last_failure() {
        let err = ReconnectError::Exhausted {
            attempts: 3,
            last_error: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "reconnect failed after 3 attempts: connection refused"
        );
    }
}

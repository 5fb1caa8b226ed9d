//! Reconnect delay policies.
//!
//! The feed never gives up reconnecting; a policy only decides how long to
//! wait before the next attempt.

use std::fmt::Debug;
use std::time::Duration;

/// Default pause between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Decides the wait before a reconnect attempt.
pub trait RetryPolicy: Send + Sync + Debug {
    /// Delay before the next attempt, given the number of consecutive
    /// failures so far (starting at 1).
    fn delay(&self, failures: u32) -> Duration;
}

/// The same delay after every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay(pub Duration);

impl Default for FixedDelay {
    fn default() -> Self {
        Self(DEFAULT_RECONNECT_DELAY)
    }
}

impl RetryPolicy for FixedDelay {
    fn delay(&self, _failures: u32) -> Duration {
        self.0
    }
}

/// Doubling delay, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.initial.saturating_mul(1u32 << exponent).min(self.max)
    }
}

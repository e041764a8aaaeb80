//! Exponential backoff for reconnection attempts.

use std::time::Duration;

/// Retry delay policy: exponential growth from an initial delay, capped
/// at a maximum, for a bounded number of attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first attempt.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
    /// Attempts allowed before giving up.
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl BackoffPolicy {
    /// Delay before attempt `n` (1-indexed):
    /// `min(initial_delay * 2^(n-1), max_delay)`.
    ///
    /// With the defaults this yields
    /// `[1, 2, 4, 8, 16, 30, 30, 30, 30, 30]` seconds.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        // Cap the exponent so the shift cannot overflow; the saturating
        // multiply handles the Duration range.
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Attempt counter paired with a [`BackoffPolicy`].
///
/// Owned by exactly one supervisor. The counter is monotonically
/// non-decreasing until [`Backoff::reset`] (called on every successful
/// reconnection) or until the attempts are exhausted.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Backoff {
    /// Create a fresh counter over `policy`.
    #[must_use]
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Advance to the next attempt.
    ///
    /// Returns the 1-indexed attempt number and the delay to wait before
    /// it, or `None` once `max_attempts` have been handed out.
    pub fn next(&mut self) -> Option<(u32, Duration)> {
        if self.attempt >= self.policy.max_attempts {
            return None;
        }

        self.attempt += 1;
        Some((self.attempt, self.policy.delay(self.attempt)))
    }

    /// Number of attempts handed out since the last reset.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether all attempts have been handed out.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.attempt >= self.policy.max_attempts
    }

    /// Reset the counter after a successful reconnection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

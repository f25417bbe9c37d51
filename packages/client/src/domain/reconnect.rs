//! Reconnect decisions.
//!
//! Pure functions over the retry counter, kept free of timers so they can be
//! tested directly.

use std::time::Duration;

const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Number of retries after a failure before giving up (0 disables retries)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    /// Never retry; observers decide whether to reconnect
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Check if the client should attempt to reconnect.
    ///
    /// # Arguments
    ///
    /// * `current_attempt` - The number of retries already made (0-indexed)
    ///
    /// # Returns
    ///
    /// `true` if another retry is allowed, `false` otherwise
    pub fn should_attempt_reconnect(&self, current_attempt: u32) -> bool {
        current_attempt < self.max_attempts
    }

    /// Delay before retry number `current_attempt`, or `None` once retries are spent
    pub fn delay_for(&self, current_attempt: u32) -> Option<Duration> {
        if !self.should_attempt_reconnect(current_attempt) {
            return None;
        }
        let factor = 2u32.checked_pow(current_attempt).unwrap_or(u32::MAX);
        let delay = self
            .initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

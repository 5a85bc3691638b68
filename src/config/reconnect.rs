//! Reconnect policy for the feed and trade sessions.

use std::time::Duration;

/// How a wrapper reconnects after a failed login or an unexpected logout.
///
/// # Example
///
/// ```
/// use tradelink_rs::config::ReconnectConfig;
/// use std::time::Duration;
///
/// let config = ReconnectConfig::default();
/// assert!(config.enabled);
/// assert_eq!(config.backoff_for_attempt(1), Duration::from_secs(20));
///
/// let config = ReconnectConfig::disabled();
/// assert!(!config.should_retry(0));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Whether the wrapper reconnects on its own.
    pub enabled: bool,

    /// Maximum number of consecutive attempts; `0` means unlimited.
    pub max_attempts: u32,

    /// Delay before the first reconnect.
    pub initial_backoff: Duration,

    /// Upper bound for the delay.
    pub max_backoff: Duration,

    /// Growth factor applied after each failed attempt.
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 10,
            initial_backoff: Duration::from_secs(10),
            max_backoff: Duration::from_secs(120),
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Reconnection switched off; the session stays logged out after a failure.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Build the policy from the `ReconnectAttempts` / `ReconnectInterval`
    /// connection-string pair: `0` disables, a negative count is unlimited.
    pub fn from_attempts(attempts: i32, interval: Duration) -> Self {
        Self {
            enabled: attempts != 0,
            max_attempts: if attempts < 0 { 0 } else { attempts as u32 },
            initial_backoff: interval,
            max_backoff: interval.max(Self::default().max_backoff),
            ..Default::default()
        }
    }

    /// Set the backoff bounds.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Set the maximum number of attempts (`0` = unlimited).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay before the given attempt (0-indexed).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_backoff.as_millis() as f64;
        let multiplied = base_ms * self.backoff_multiplier.powi(attempt as i32);
        let capped = multiplied.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Returns `true` if another attempt may be made after `attempts` failures.
    pub fn should_retry(&self, attempts: u32) -> bool {
        self.enabled && (self.max_attempts == 0 || attempts < self.max_attempts)
    }
}

//! Bounded reconnect policy.
//!
//! A small state machine driven only by connect outcomes:
//! `Idle -> Retrying -> GivenUp`. Once given up, further failures are
//! ignored until an explicit [`RetryPolicy::reset`] or a successful open.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Reconnect attempts allowed before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Base delay between reconnect attempts.
pub const DEFAULT_BASE_DELAY_MS: u64 = 2000;
/// Cap applied to exponential delays.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// How the delay grows with the attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// `base * attempts`.
    #[default]
    Linear,
    /// `base * 2^(attempts - 1)`, capped.
    Exponential,
}

/// Current phase of the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Retrying { attempt: u32 },
    GivenUp,
}

/// What the caller should do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule another connect after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// The budget was exhausted by this failure.
    GiveUp { attempts: u32 },
    /// Already given up; nothing to do.
    Halted,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    attempts: u32,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    strategy: BackoffStrategy,
    gave_up: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        )
    }
}

impl RetryPolicy {
    /// Linear policy with the given budget and base delay.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            base_delay,
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            strategy: BackoffStrategy::Linear,
            gave_up: false,
        }
    }

    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn gave_up(&self) -> bool {
        self.gave_up
    }

    pub fn state(&self) -> RetryState {
        if self.gave_up {
            RetryState::GivenUp
        } else if self.attempts == 0 {
            RetryState::Idle
        } else {
            RetryState::Retrying {
                attempt: self.attempts,
            }
        }
    }

    /// Record a failed connect or a dropped stream.
    pub fn record_failure(&mut self) -> RetryDecision {
        if self.gave_up {
            return RetryDecision::Halted;
        }

        self.attempts = self.attempts.saturating_add(1);
        if self.attempts > self.max_attempts {
            self.gave_up = true;
            warn!(
                attempts = self.attempts,
                max = self.max_attempts,
                "Reconnect budget exhausted, giving up"
            );
            return RetryDecision::GiveUp {
                attempts: self.attempts,
            };
        }

        let delay = self.delay_for(self.attempts);
        debug!(
            attempt = self.attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );
        RetryDecision::Retry {
            attempt: self.attempts,
            delay,
        }
    }

    /// Record a successful open.
    pub fn record_success(&mut self) {
        if self.attempts > 0 || self.gave_up {
            debug!(attempts = self.attempts, "Connection recovered");
        }
        self.attempts = 0;
        self.gave_up = false;
    }

    /// Explicit manual reconnect: clears the given-up latch.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.gave_up = false;
    }

    /// Delay before the given (1-based) attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self.strategy {
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
            BackoffStrategy::Exponential => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor).min(self.max_delay)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_delays() {
        let mut policy = RetryPolicy::default();
        assert_eq!(
            policy.record_failure(),
            RetryDecision::Retry {
                attempt: 1,
                delay: Duration::from_millis(2000)
            }
        );
        assert_eq!(
            policy.record_failure(),
            RetryDecision::Retry {
                attempt: 2,
                delay: Duration::from_millis(4000)
            }
        );
        assert_eq!(
            policy.record_failure(),
            RetryDecision::Retry {
                attempt: 3,
                delay: Duration::from_millis(6000)
            }
        );
    }

    #[test]
    fn test_gives_up_after_max_plus_one_failures() {
        let mut policy = RetryPolicy::default();
        for _ in 0..3 {
            assert!(matches!(policy.record_failure(), RetryDecision::Retry { .. }));
        }
        assert_eq!(
            policy.record_failure(),
            RetryDecision::GiveUp { attempts: 4 }
        );
        assert!(policy.gave_up());
        assert_eq!(policy.state(), RetryState::GivenUp);

        // Terminal: nothing more is scheduled.
        for _ in 0..5 {
            assert_eq!(policy.record_failure(), RetryDecision::Halted);
        }
        assert_eq!(policy.attempts(), 4);
    }

    #[test]
    fn test_success_resets_attempts() {
        let mut policy = RetryPolicy::default();
        policy.record_failure();
        policy.record_failure();
        assert_eq!(policy.state(), RetryState::Retrying { attempt: 2 });

        policy.record_success();
        assert_eq!(policy.attempts(), 0);
        assert_eq!(policy.state(), RetryState::Idle);
        assert_eq!(
            policy.record_failure(),
            RetryDecision::Retry {
                attempt: 1,
                delay: Duration::from_millis(2000)
            }
        );
    }

    #[test]
    fn test_reset_clears_given_up() {
        let mut policy = RetryPolicy::new(0, Duration::from_millis(10));
        assert_eq!(
            policy.record_failure(),
            RetryDecision::GiveUp { attempts: 1 }
        );
        policy.reset();
        assert!(!policy.gave_up());
        assert_eq!(policy.state(), RetryState::Idle);
    }

    #[test]
    fn test_exponential_delays_are_capped() {
        let policy = RetryPolicy::new(10, Duration::from_millis(1000))
            .with_strategy(BackoffStrategy::Exponential)
            .with_max_delay(Duration::from_millis(5000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(5000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(5000));
    }

    #[test]
    fn test_strategy_serialization() {
        let json = serde_json::to_string(&BackoffStrategy::Exponential).unwrap();
        assert_eq!(json, r#""exponential""#);
        let parsed: BackoffStrategy = serde_json::from_str(r#""linear""#).unwrap();
        assert_eq!(parsed, BackoffStrategy::Linear);
    }
}

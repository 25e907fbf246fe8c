//! Retry policy for recoverable activation failures.

use std::time::Duration;

use crate::config::{BackoffStrategy, RetryConfig};

/// Delay between recoverable failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Retry on the next tick
    #[default]
    None,
    Fixed(Duration),
    /// `base * 2^(attempt - 1)`, capped at `max`
    Exponential { base: Duration, max: Duration },
}

/// How often and how quickly a module is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// `None` retries forever
    pub max_attempts: Option<u32>,
    pub backoff: Backoff,
}

impl RetryPolicy {
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        let base = Duration::from_millis(config.base_delay_ms);
        let backoff = match config.backoff {
            BackoffStrategy::None => Backoff::None,
            BackoffStrategy::Fixed => Backoff::Fixed(base),
            BackoffStrategy::Exponential => Backoff::Exponential {
                base,
                max: Duration::from_millis(config.max_delay_ms),
            },
        };

        Self {
            max_attempts: (config.max_attempts > 0).then_some(config.max_attempts),
            backoff,
        }
    }

    /// True once `attempts` failed attempts use up the budget
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }

    /// Delay before the next attempt after `attempts` failures
    pub fn delay_for(&self, attempts: u32) -> Option<Duration> {
        match self.backoff {
            Backoff::None => None,
            Backoff::Fixed(delay) => Some(delay),
            Backoff::Exponential { base, max } => {
                let exponent = attempts.saturating_sub(1).min(31);
                let delay = base
                    .checked_mul(1u32 << exponent)
                    .map_or(max, |delay| delay.min(max));
                Some(delay)
            }
        }
    }
}

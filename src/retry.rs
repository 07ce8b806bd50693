use rand::Rng;
use std::time::Duration;

use crate::config::RetryConfig;

/// Retry policy for provider requests that fail before the stream opens
#[derive(Debug, Clone)]
pub enum RetryPolicy {
    /// Exponential backoff with jitter
    ExponentialBackoff(RetryConfig),
    /// Fail on the first error
    Never,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::ExponentialBackoff(crate::config::Config::default().retry)
    }
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        match self {
            RetryPolicy::ExponentialBackoff(cfg) => cfg.max_attempts.max(1),
            RetryPolicy::Never => 1,
        }
    }

    /// Whether a failed attempt with this HTTP status is worth repeating.
    /// `None` means the request never got a response.
    pub fn is_retryable(status: Option<u16>) -> bool {
        match status {
            None => true,
            Some(code) => code >= 500,
        }
    }

    /// Delay before attempt `attempt + 1`, given `attempt` >= 1 attempts so far.
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            RetryPolicy::ExponentialBackoff(cfg) => {
                let base = cfg
                    .initial_delay_ms
                    .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
                let jitter = if cfg.jitter_factor > 0.0 {
                    rand::thread_rng().gen_range((1.0 - cfg.jitter_factor)..=(1.0 + cfg.jitter_factor))
                } else {
                    1.0
                };
                let delay = (base as f64 * jitter) as u64;
                Duration::from_millis(delay.min(cfg.max_delay_ms))
            }
            RetryPolicy::Never => Duration::ZERO,
        }
    }
}

use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(2000);

/// How the wait between attempts grows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum Backoff {
    /// Same delay before every retry.
    #[default]
    Fixed,
    /// `retry_delay × 2^(attempt-1)`, capped. No jitter.
    Exponential {
        #[serde(rename = "max_delay_ms", deserialize_with = "millis::deserialize")]
        max_delay: Duration,
    },
}

/// Attempt budget for one AI query. Lives in config; each call builds its
/// own attempt counter from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            backoff: Backoff::Fixed,
        }
    }
}

impl RetryPolicy {
    pub fn fixed(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
            backoff: Backoff::Fixed,
        }
    }

    /// Zero attempts would make every call fail without a request.
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Delay to wait after `attempt` (1-based) failed and before the next one.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.retry_delay,
            Backoff::Exponential { max_delay } => {
                let shift = attempt.saturating_sub(1).min(20);
                self.retry_delay
                    .checked_mul(1u32 << shift)
                    .unwrap_or(max_delay)
                    .min(max_delay)
            }
        }
    }
}

pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

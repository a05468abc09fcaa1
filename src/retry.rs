use crate::{client::SubmitResponse, error::DrawResult};
use std::time::Duration;

/// 403 from the pixel endpoint, usually a short-lived block.
pub const ACCESS_DENIED: u16 = 403;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// `attempt * base`
    Linear { base: Duration },
}

impl Backoff {
    /// Delay after the `attempt`th failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Linear { base } => base.saturating_mul(attempt),
        }
    }
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts per batch, including the first one.
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Statuses worth another try. Transport failures always are.
    pub retry_on: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Backoff::Fixed(Duration::from_secs(1)),
            retry_on: vec![ACCESS_DENIED],
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn is_retryable(&self, result: &DrawResult<SubmitResponse>) -> bool {
        match result {
            Ok(response) => self.retry_on.contains(&response.status),
            Err(..) => true,
        }
    }

    /// Whether `attempt` (1-based) may be followed by another one.
    pub fn should_retry(&self, result: &DrawResult<SubmitResponse>, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1) && self.is_retryable(result)
    }
}

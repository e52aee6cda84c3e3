//! Retry policies for failed chunk fetches

use std::time::Duration;

use crate::core::error::Error;
use crate::core::planner::ChunkRange;

/// Default attempt limit for [`BoundedRetry`]
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff (in milliseconds)
pub const BASE_RETRY_DELAY_MS: u64 = 1000;

/// What a worker should do after a range failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Fetch the same range again right away
    Retry,
    /// Fetch the same range again after a pause
    RetryAfter(Duration),
    /// Stop and surface the error
    GiveUp,
}

/// Decides how a worker reacts to a failed range.
///
/// `attempt` counts consecutive failures of `range`, starting at 1.
pub trait RetryPolicy: Send + Sync {
    fn on_failure(&self, range: ChunkRange, attempt: u32, error: &Error) -> RetryDecision;
}

/// Retry the same range immediately, forever.
///
/// A range that never succeeds stalls its worker indefinitely.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryForever;

impl RetryPolicy for RetryForever {
    fn on_failure(&self, _range: ChunkRange, _attempt: u32, _error: &Error) -> RetryDecision {
        RetryDecision::Retry
    }
}

/// Exponential backoff with an attempt limit
#[derive(Debug, Clone, Copy)]
pub struct BoundedRetry {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for BoundedRetry {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRY_ATTEMPTS,
            base_delay: Duration::from_millis(BASE_RETRY_DELAY_MS),
        }
    }
}

impl BoundedRetry {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts, base_delay }
    }
}

impl RetryPolicy for BoundedRetry {
    fn on_failure(&self, _range: ChunkRange, attempt: u32, _error: &Error) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        let factor = 1u32 << (attempt.saturating_sub(1)).min(16);
        RetryDecision::RetryAfter(self.base_delay.saturating_mul(factor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err() -> Error {
        Error::TransportError("connection reset".to_string())
    }

    #[test]
    fn test_retry_forever_never_gives_up() {
        let range = ChunkRange::new(0, 10);
        for attempt in [1, 2, 100, u32::MAX] {
            assert_eq!(RetryForever.on_failure(range, attempt, &err()), RetryDecision::Retry);
        }
    }

    #[test]
    fn test_bounded_retry_backs_off_then_gives_up() {
        let policy = BoundedRetry::new(4, Duration::from_millis(100));
        let range = ChunkRange::new(0, 10);

        assert_eq!(
            policy.on_failure(range, 1, &err()),
            RetryDecision::RetryAfter(Duration::from_millis(100))
        );
        assert_eq!(
            policy.on_failure(range, 2, &err()),
            RetryDecision::RetryAfter(Duration::from_millis(200))
        );
        assert_eq!(
            policy.on_failure(range, 3, &err()),
            RetryDecision::RetryAfter(Duration::from_millis(400))
        );
        assert_eq!(policy.on_failure(range, 4, &err()), RetryDecision::GiveUp);
    }

    #[test]
    fn test_bounded_retry_defaults() {
        let policy = BoundedRetry::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
    }
}

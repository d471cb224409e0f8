//! Retry decision logic for resilient calls.
//!
//! Pure and synchronous: given the attempt that just failed, decide whether
//! to retry (and how long to wait first) or to move on to the fallback. The
//! waiting itself happens in [`workflow::resilient`](crate::workflow::resilient).

use std::time::Duration;

use crate::error::InvocationError;

/// Default backoff unit.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then make attempt `next_attempt`.
    Retry { next_attempt: u32, delay: Duration },
    /// The primary target has had all its attempts.
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` below 1 is raised to 1: the primary is always tried.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after failed attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Decide what follows failed attempt `attempt` (1-based).
    pub fn decide(&self, attempt: u32, _error: &InvocationError) -> RetryDecision {
        if attempt < self.max_attempts {
            RetryDecision::Retry {
                next_attempt: attempt + 1,
                delay: self.backoff_delay(attempt),
            }
        } else {
            RetryDecision::Fallback
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, DEFAULT_BASE_DELAY)
    }
}

/// Per-call retry bookkeeping. Lives for one resilient call only.
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    pub attempt: u32,
    pub last_error: Option<InvocationError>,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to the next attempt and return its number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    pub fn record_failure(&mut self, error: InvocationError) {
        self.last_error = Some(error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err() -> InvocationError {
        InvocationError::new("100", "timeout")
    }

    #[test]
    fn backoff_doubles_from_the_base() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_delay(4), Duration::from_millis(800));
    }

    #[test]
    fn decide_retries_until_the_last_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(1, &err()),
            RetryDecision::Retry {
                next_attempt: 2,
                delay: Duration::from_secs(1)
            }
        );
        assert_eq!(
            policy.decide(2, &err()),
            RetryDecision::Retry {
                next_attempt: 3,
                delay: Duration::from_secs(2)
            }
        );
        assert_eq!(policy.decide(3, &err()), RetryDecision::Fallback);
    }

    #[test]
    fn zero_attempts_is_treated_as_one() {
        let policy = RetryPolicy::new(0, DEFAULT_BASE_DELAY);
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.decide(1, &err()), RetryDecision::Fallback);
    }

    #[test]
    fn huge_attempt_numbers_saturate() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(1));
        assert!(policy.backoff_delay(200) >= Duration::from_secs(1 << 31));
    }

    #[test]
    fn state_counts_monotonically() {
        let mut state = RetryState::new();
        assert_eq!(state.begin_attempt(), 1);
        state.record_failure(err());
        assert_eq!(state.begin_attempt(), 2);
        assert_eq!(state.last_error, Some(err()));
    }
}

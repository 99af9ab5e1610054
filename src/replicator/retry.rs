//! Exponential backoff for reconnect attempts (spec.md §4.5 retry policy).

use std::time::Duration;

/// One-shot replicators give up after this many retries; continuous ones
/// retry forever unless the error is fatal.
pub const MAX_ONE_SHOT_RETRY_COUNT: u32 = 2;

const MAX_DELAY_SECS: u64 = 600;

/// `min(2^attempts, 600)` seconds (spec.md §4.5, §8 property 7).
pub fn backoff_delay(attempts: u32) -> Duration {
    let secs = 2u64.saturating_pow(attempts).min(MAX_DELAY_SECS);
    Duration::from_secs(secs)
}

/// Tracks the retry counter across an Offline/Connecting cycle. Continuous
/// by default; `one_shot` replicators stop retrying once
/// [`MAX_ONE_SHOT_RETRY_COUNT`] is exceeded.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    attempts: u32,
    one_shot: bool,
}

impl RetryPolicy {
    pub fn new(one_shot: bool) -> Self {
        Self { attempts: 0, one_shot }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether another retry should be attempted after the current failure
    /// count. Always true for continuous replicators (the caller decides
    /// separately whether the error itself is fatal).
    pub fn should_retry(&self) -> bool {
        !self.one_shot || self.attempts < MAX_ONE_SHOT_RETRY_COUNT
    }

    /// Delay before the next attempt, then increments the counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = backoff_delay(self.attempts);
        self.attempts += 1;
        delay
    }

    /// A successful connection, or an explicit `retry(resetCount=true)`,
    /// resets the counter.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_per_attempt_until_the_cap() {
        assert_eq!(backoff_delay(0), Duration::from_secs(1));
        assert_eq!(backoff_delay(1), Duration::from_secs(2));
        assert_eq!(backoff_delay(4), Duration::from_secs(16));
    }

    #[test]
    fn delay_is_capped_at_ten_minutes() {
        assert_eq!(backoff_delay(20), Duration::from_secs(600));
        assert_eq!(backoff_delay(63), Duration::from_secs(600));
    }

    #[test]
    fn continuous_policy_always_wants_to_retry() {
        let mut policy = RetryPolicy::new(false);
        for _ in 0..10 {
            assert!(policy.should_retry());
            policy.next_delay();
        }
    }

    #[test]
    fn one_shot_policy_gives_up_after_the_max_retry_count() {
        let mut policy = RetryPolicy::new(true);
        assert!(policy.should_retry());
        policy.next_delay();
        assert!(policy.should_retry());
        policy.next_delay();
        assert!(!policy.should_retry());
    }

    #[test]
    fn reset_clears_the_attempt_counter() {
        let mut policy = RetryPolicy::new(true);
        policy.next_delay();
        policy.next_delay();
        assert!(!policy.should_retry());
        policy.reset();
        assert!(policy.should_retry());
        assert_eq!(policy.attempts(), 0);
    }
}

//! Retry and retention policy per queue.

use std::time::Duration;

use crate::domain::QueueName;

/// Retry policy for failed jobs.
///
/// delay = base_delay * multiplier^(attempts - 1). Both default queues use
/// `multiplier = 1.0`, i.e. a fixed delay between attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Base delay for the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            multiplier: 1.0,
        }
    }

    pub fn exponential(base_delay: Duration, multiplier: f64) -> Self {
        Self {
            base_delay,
            multiplier,
        }
    }

    /// Delay before the next attempt.
    ///
    /// `attempts` is the number of attempts already made (1-indexed);
    /// `0` is treated like `1`.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1) as i32;
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(delay_secs)
    }
}

/// Everything the store needs to know about a queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuePolicy {
    pub retry: RetryPolicy,
    pub max_retries: u32,
    /// Succeeded jobs kept before the oldest is evicted.
    pub remove_on_success: usize,
    /// Failed jobs kept before the oldest is evicted.
    pub remove_on_failure: usize,
    /// Active jobs claimed longer ago than this are reclaimed.
    pub stalled_after: Duration,
}

impl QueuePolicy {
    pub fn email() -> Self {
        Self {
            retry: RetryPolicy::fixed(Duration::from_secs(5)),
            max_retries: 3,
            remove_on_success: 10,
            remove_on_failure: 5,
            stalled_after: Duration::from_secs(60),
        }
    }

    pub fn waitlist() -> Self {
        Self {
            retry: RetryPolicy::fixed(Duration::from_secs(10)),
            ..Self::email()
        }
    }

    pub fn for_queue(queue: QueueName) -> Self {
        match queue {
            QueueName::Email => Self::email(),
            QueueName::Waitlist => Self::waitlist(),
        }
    }
}

/// Policies for every known queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuePolicies {
    pub email: QueuePolicy,
    pub waitlist: QueuePolicy,
}

impl QueuePolicies {
    pub fn get(&self, queue: QueueName) -> &QueuePolicy {
        match queue {
            QueueName::Email => &self.email,
            QueueName::Waitlist => &self.waitlist,
        }
    }

    pub fn get_mut(&mut self, queue: QueueName) -> &mut QueuePolicy {
        match queue {
            QueueName::Email => &mut self.email,
            QueueName::Waitlist => &mut self.waitlist,
        }
    }
}

impl Default for QueuePolicies {
    fn default() -> Self {
        Self {
            email: QueuePolicy::email(),
            waitlist: QueuePolicy::waitlist(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::email(QueueName::Email, 5)]
    #[case::waitlist(QueueName::Waitlist, 10)]
    fn default_queue_policies(#[case] queue: QueueName, #[case] delay_secs: u64) {
        let policy = QueuePolicies::default().get(queue).clone();
        assert_eq!(policy.retry.next_delay(1), Duration::from_secs(delay_secs));
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.remove_on_success, 10);
        assert_eq!(policy.remove_on_failure, 5);
    }

    #[test]
    fn fixed_policy_does_not_grow() {
        let policy = RetryPolicy::fixed(Duration::from_secs(5));
        assert_eq!(policy.next_delay(1), policy.next_delay(4));
    }

    #[test]
    fn exponential_backoff_increases() {
        let policy = RetryPolicy::exponential(Duration::from_secs(2), 2.0);

        assert_eq!(policy.next_delay(0), Duration::from_secs(2));
        assert_eq!(policy.next_delay(1), Duration::from_secs(2));
        assert_eq!(policy.next_delay(2), Duration::from_secs(4));
        assert_eq!(policy.next_delay(3), Duration::from_secs(8));
    }
}

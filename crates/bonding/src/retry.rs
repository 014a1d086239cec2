//! Fixed-delay retry policies and the orchestrator's timing settings.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub delay: Duration,
    /// Upper bound of a random extra added to each delay.
    pub jitter: Duration,
}

impl RetryPolicy {
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            jitter: Duration::ZERO,
        }
    }

    pub const fn immediate(max_attempts: u32) -> Self {
        Self::fixed(max_attempts, Duration::ZERO)
    }

    pub const fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Pause to observe before the next attempt.
    pub fn next_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.delay;
        }
        let extra = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
        self.delay + Duration::from_millis(extra)
    }

    /// Run `attempt` until it yields a value or attempts run out.
    ///
    /// The closure receives the 1-based attempt number. Sleeps only between
    /// attempts, never after the last one.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Option<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        for number in 1..=self.max_attempts {
            if let Some(value) = attempt(number).await {
                return Some(value);
            }
            if number < self.max_attempts {
                let pause = self.next_delay();
                if !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
            }
        }
        None
    }
}

/// Delays and bounds used by one orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorTimings {
    /// Upper bound on every single chain call.
    pub call_timeout: Duration,
    /// Wait after a submitted bond before reading the account sequence.
    pub settle_delay: Duration,
    pub sequence_policy: RetryPolicy,
    /// Wait after a sequence mismatch before recovering.
    pub recovery_pause: Duration,
    /// Refetch policy used when the mismatch text names no sequence.
    pub recovery_policy: RetryPolicy,
}

impl Default for OrchestratorTimings {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(2),
            sequence_policy: RetryPolicy::fixed(3, Duration::from_secs(1)),
            recovery_pause: Duration::from_secs(1),
            recovery_policy: RetryPolicy::fixed(2, Duration::from_secs(1)),
        }
    }
}

impl OrchestratorTimings {
    /// Same attempt counts with every pause removed.
    pub fn zero() -> Self {
        let defaults = Self::default();
        Self {
            call_timeout: Duration::from_secs(5),
            settle_delay: Duration::ZERO,
            sequence_policy: RetryPolicy::immediate(defaults.sequence_policy.max_attempts),
            recovery_pause: Duration::ZERO,
            recovery_policy: RetryPolicy::immediate(defaults.recovery_policy.max_attempts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn stops_at_first_value() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3);
        let value = policy
            .run(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { (attempt == 2).then_some(attempt) }
            })
            .await;
        assert_eq!(value, Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let value: Option<u32> = RetryPolicy::immediate(3)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { None }
            })
            .await;
        assert_eq!(value, None);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_only_between_attempts() {
        let started = tokio::time::Instant::now();
        let value: Option<()> = RetryPolicy::fixed(3, Duration::from_secs(1))
            .run(|_| async { None })
            .await;
        assert!(value.is_none());
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy =
            RetryPolicy::fixed(2, Duration::from_millis(100)).with_jitter(Duration::from_millis(50));
        for _ in 0..32 {
            let delay = policy.next_delay();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn default_timings() {
        let timings = OrchestratorTimings::default();
        assert_eq!(timings.settle_delay, Duration::from_secs(2));
        assert_eq!(timings.sequence_policy.max_attempts, 3);
        assert_eq!(timings.recovery_policy.max_attempts, 2);
        assert_eq!(OrchestratorTimings::zero().recovery_pause, Duration::ZERO);
    }
}

use std::time::Duration;
use tokio::time::Instant;

/// Bounded wait with exponential backoff, used for confirmation polling and
/// explorer status polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: u32,
    pub timeout: Duration,
}

impl PollPolicy {
    pub const DEFAULT_MULTIPLIER: u32 = 2;

    pub fn new(initial_interval: Duration, max_interval: Duration, timeout: Duration) -> Self {
        Self {
            initial_interval,
            max_interval: max_interval.max(initial_interval),
            multiplier: Self::DEFAULT_MULTIPLIER,
            timeout,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(2),
            Duration::from_secs(30),
            Duration::from_secs(600),
        )
    }
}

pub struct Backoff {
    policy: PollPolicy,
    started: Instant,
    next_interval: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            started: Instant::now(),
            next_interval: policy.initial_interval,
            attempts: 0,
        }
    }

    /// Returns the delay before the next attempt, or `None` once the next
    /// attempt would start past the deadline.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let elapsed = self.started.elapsed();
        if elapsed >= self.policy.timeout {
            return None;
        }
        let remaining = self.policy.timeout - elapsed;
        let delay = self.next_interval.min(remaining);

        self.attempts += 1;
        self.next_interval = self
            .next_interval
            .saturating_mul(self.policy.multiplier)
            .min(self.policy.max_interval);

        Some(delay)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

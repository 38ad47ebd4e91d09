//! Retry policy for resume/poll loops
//!
//! Polling is never built on ad hoc callback timers: every loop is driven
//! by an explicit policy carrying its attempt cap, deadline, and backoff
//! curve, so a loop is bounded and its terminal condition is inspectable.

use std::time::Duration;

/// Decision for the next step of a bounded poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep this long, then try again.
    Retry(Duration),
    /// Attempt cap or deadline reached; stop polling.
    Exhausted,
}

/// Bounded exponential backoff policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub deadline: Duration,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        deadline: Duration,
        initial_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        Self {
            max_attempts,
            deadline,
            initial_delay,
            max_delay,
        }
    }

    /// Policy for polling a resumable stream until its payload appears.
    pub fn resume_poll() -> Self {
        Self::new(
            240,
            Duration::from_secs(120),
            Duration::from_millis(250),
            Duration::from_secs(5),
        )
    }

    /// Policy for re-evaluating the moderator gate. The deadline must
    /// outlast the 60 s analysis stall fallback.
    pub fn gate_poll() -> Self {
        Self::new(
            600,
            Duration::from_secs(90),
            Duration::from_millis(200),
            Duration::from_secs(2),
        )
    }

    /// Upper bound on waiting for changelog/config persistence
    /// confirmation before the round proceeds.
    pub fn config_confirmation() -> Self {
        Self::new(
            120,
            Duration::from_secs(30),
            Duration::from_millis(100),
            Duration::from_secs(1),
        )
    }

    /// Backoff delay for a given 0-based attempt, doubling up to the cap.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        let delay = self.initial_delay.saturating_mul(factor as u32);
        delay.min(self.max_delay)
    }

    /// Decide whether the loop may continue after `attempt` attempts and
    /// `elapsed` wall time.
    pub fn decide(&self, attempt: u32, elapsed: Duration) -> RetryDecision {
        if attempt >= self.max_attempts || elapsed >= self.deadline {
            RetryDecision::Exhausted
        } else {
            RetryDecision::Retry(self.delay(attempt))
        }
    }
}

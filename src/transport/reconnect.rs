//! Reconnection schedule for the connection task

use std::time::Duration;

use rand::Rng;

/// Reconnection policy
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    /// Reconnection attempts after the first failure
    pub max_attempts: u32,
    /// Delay between attempts
    pub delay: Duration,
    /// Jitter factor (0.0 to 1.0); 0.0 keeps the delay fixed
    pub randomization_factor: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            delay: Duration::from_secs(1),
            randomization_factor: 0.0,
        }
    }
}

/// Tracks attempts against a policy
pub struct ReconnectSchedule {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl ReconnectSchedule {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Delay before the next attempt, `None` once reconnection is disabled or exhausted
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.policy.enabled || self.attempt >= self.policy.max_attempts {
            return None;
        }
        self.attempt += 1;

        let base_ms = self.policy.delay.as_millis() as f64;
        let factor = self.policy.randomization_factor;

        let delay_ms = if factor > 0.0 && base_ms > 0.0 {
            let jitter_range = base_ms * factor;
            let jitter = rand::rng().random_range(-jitter_range..=jitter_range);
            (base_ms + jitter).max(1.0) as u64
        } else {
            base_ms as u64
        };

        Some(Duration::from_millis(delay_ms))
    }

    /// Reset after a successful connection
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Attempts made since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn is_enabled(&self) -> bool {
        self.policy.enabled
    }
}

//! Reconnect backoff
//!
//! Delays grow as `base * 2^attempt`, are capped at `cap`, and the capped
//! value is then spread by `±jitter` so that many phones losing the same
//! broker do not reconnect in lockstep.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff parameters, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub base_ms: u64,
    pub cap_ms: u64,
    /// Relative spread, `0.2` meaning ±20%.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            cap_ms: 30_000,
            jitter: 0.2,
        }
    }
}

impl ReconnectPolicy {
    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    pub fn cap(&self) -> Duration {
        Duration::from_millis(self.cap_ms)
    }
}

/// Stateful delay generator for consecutive failed attempts.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Delay before the next attempt; advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let nominal = self.nominal_delay();
        self.attempt = self.attempt.saturating_add(1);
        apply_jitter(nominal, self.policy.jitter, &mut rand::rng())
    }

    /// Un-jittered delay for the current attempt.
    pub fn nominal_delay(&self) -> Duration {
        let exponent = self.attempt.min(20);
        let delay_ms = self.policy.base_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay_ms.min(self.policy.cap_ms))
    }

    /// Forgets past failures after a successful connection.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}

fn apply_jitter<R: Rng>(delay: Duration, jitter: f64, rng: &mut R) -> Duration {
    if jitter <= 0.0 || delay.is_zero() {
        return delay;
    }
    let spread = jitter.min(1.0);
    let factor = rng.random_range((1.0 - spread)..=(1.0 + spread));
    delay.mul_f64(factor)
}

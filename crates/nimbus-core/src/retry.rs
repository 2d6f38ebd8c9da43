//! Redelivery backoff and dead-letter decisions.
//!
//! The policy is pure: it looks at a receive count and answers "retry
//! after N ms" or "dead-letter". The scheduler applies the answer to queue
//! state (see `broker::scheduler::failure`).

use rand::prelude::*;
use rand::rngs::ThreadRng;
use serde::Deserialize;

use crate::queue::QueueConfig;

/// Maximum relative perturbation applied when jitter is enabled.
pub const JITTER_RATIO: f64 = 0.1;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    #[default]
    Exponential,
    Linear,
    Fixed,
}

/// Retry configuration, deserializable from the `[retry]` TOML section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub strategy: RetryStrategy,
    /// Receive count at which a message is dead-lettered, for queues that
    /// do not set `max_receive_count` themselves.
    pub max_retries: u32,
    pub jitter: bool,
    pub exponential: ExponentialBackoff,
    pub linear: LinearBackoff,
    pub fixed: FixedBackoff,
    pub dlq: DeadLetterConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExponentialBackoff {
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinearBackoff {
    pub initial_delay_ms: u64,
    pub increment_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FixedBackoff {
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeadLetterConfig {
    /// Create a missing dead-letter queue on first use.
    pub auto_create: bool,
    pub retention_period_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: RetryStrategy::Exponential,
            max_retries: 3,
            jitter: false,
            exponential: ExponentialBackoff::default(),
            linear: LinearBackoff::default(),
            fixed: FixedBackoff::default(),
            dlq: DeadLetterConfig::default(),
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 300_000,
        }
    }
}

impl Default for LinearBackoff {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            increment_ms: 1_000,
            max_delay_ms: 300_000,
        }
    }
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self { delay_ms: 5_000 }
    }
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            auto_create: true,
            retention_period_secs: QueueConfig::DEFAULT_RETENTION_SECS,
        }
    }
}

/// Backoff for the `retry_count`-th retry, before jitter. A count of 0 is
/// treated as the first retry.
pub fn base_delay(strategy: RetryStrategy, retry_count: u32, config: &RetryConfig) -> u64 {
    let step = retry_count.saturating_sub(1);
    match strategy {
        RetryStrategy::Exponential => {
            let c = &config.exponential;
            let exp = i32::try_from(step).unwrap_or(i32::MAX);
            let delay = c.initial_delay_ms as f64 * c.multiplier.powi(exp);
            if delay.is_nan() {
                return c.max_delay_ms;
            }
            delay.min(c.max_delay_ms as f64).max(0.0) as u64
        }
        RetryStrategy::Linear => {
            let c = &config.linear;
            c.initial_delay_ms
                .saturating_add(c.increment_ms.saturating_mul(u64::from(step)))
                .min(c.max_delay_ms)
        }
        RetryStrategy::Fixed => config.fixed.delay_ms,
    }
}

/// Backoff in milliseconds, with ±10% jitter when `config.jitter` is set.
pub fn compute_delay(strategy: RetryStrategy, retry_count: u32, config: &RetryConfig) -> u64 {
    let delay = base_delay(strategy, retry_count, config);
    if config.jitter {
        apply_jitter(delay, &mut rand::rng())
    } else {
        delay
    }
}

/// Perturb `delay` uniformly within ±`JITTER_RATIO`, never below zero.
pub fn apply_jitter(delay: u64, rng: &mut ThreadRng) -> u64 {
    let spread = delay as f64 * JITTER_RATIO;
    if spread < 1.0 {
        return delay;
    }
    let offset = rng.random_range(-spread..=spread);
    (delay as f64 + offset).max(0.0).round() as u64
}

/// What to do with a message whose delivery failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    Reschedule { delay_ms: u64 },
    /// The message has used up its receives. Never surfaced to callers as
    /// an error; the scheduler routes the message to its DLQ instead.
    DeadLetter,
}

/// Result of applying a failure decision to broker state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    Rescheduled { available_at: u64 },
    DeadLettered { dlq: String },
}

#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Effective receive limit for a queue.
    pub fn max_receive_count(&self, queue: &QueueConfig) -> u32 {
        queue
            .max_receive_count
            .unwrap_or(self.config.max_retries)
            .max(1)
    }

    pub fn decide(&self, receive_count: u32, max_receive_count: u32) -> FailureDecision {
        if receive_count >= max_receive_count {
            FailureDecision::DeadLetter
        } else {
            FailureDecision::Reschedule {
                delay_ms: compute_delay(self.config.strategy, receive_count, &self.config),
            }
        }
    }
}

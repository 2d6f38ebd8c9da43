use serde::Deserialize;

use crate::queue::{QueueConfig, QueueKind, MAX_MESSAGE_SIZE};
use crate::retry::RetryConfig;

/// Broker configuration, deserializable from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub scheduler: SchedulerConfig,
    pub queue_defaults: QueueDefaults,
    pub retry: RetryConfig,
    /// Queues created when the broker starts.
    pub queues: Vec<QueueConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub command_channel_capacity: usize,
    /// Longest the scheduler parks waiting for a command.
    pub idle_timeout_ms: u64,
    /// Minimum spacing between expiry/retention sweeps.
    pub sweep_interval_ms: u64,
    pub event_channel_capacity: usize,
}

/// Settings applied to queues the broker creates on its own (auto-created
/// dead-letter queues).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueDefaults {
    pub visibility_timeout_secs: u64,
    pub max_message_size: usize,
    pub receive_wait_time_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            command_channel_capacity: 10_000,
            idle_timeout_ms: 100,
            sweep_interval_ms: 100,
            event_channel_capacity: 10_000,
        }
    }
}

impl Default for QueueDefaults {
    fn default() -> Self {
        Self {
            visibility_timeout_secs: QueueConfig::DEFAULT_VISIBILITY_TIMEOUT_SECS,
            max_message_size: MAX_MESSAGE_SIZE,
            receive_wait_time_secs: 0,
        }
    }
}

impl QueueDefaults {
    /// Config for an auto-created standard queue.
    pub fn standard_queue(&self, name: &str, retention_period_secs: u64) -> QueueConfig {
        QueueConfig {
            name: name.to_string(),
            kind: QueueKind::Standard,
            max_message_size: self.max_message_size,
            retention_period_secs,
            visibility_timeout_secs: self.visibility_timeout_secs,
            receive_wait_time_secs: self.receive_wait_time_secs,
            max_receive_count: None,
            dlq_name: None,
        }
    }
}

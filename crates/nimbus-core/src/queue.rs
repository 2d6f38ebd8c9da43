use serde::{Deserialize, Serialize};

/// Suffix of auto-named dead-letter queues.
pub const DLQ_SUFFIX: &str = "-dlq";

pub const MAX_QUEUE_NAME_LEN: usize = 80;
pub const MIN_MESSAGE_SIZE: usize = 1024;
pub const MAX_MESSAGE_SIZE: usize = 262_144;
pub const MIN_RETENTION_SECS: u64 = 60;
pub const MAX_RETENTION_SECS: u64 = 1_209_600;
pub const MAX_VISIBILITY_TIMEOUT_SECS: u64 = 43_200;
pub const MAX_RECEIVE_WAIT_SECS: u64 = 20;
pub const MAX_RECEIVE_COUNT: u32 = 100;
pub const MAX_DELAY_SECS: u64 = 900;
pub const MAX_BATCH_SIZE: usize = 10;
pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    #[default]
    Standard,
    Priority,
    Delay,
    Fifo,
}

/// Queue definition. Runtime state (paused flag, messages, counters) lives
/// in the scheduler; this is the part callers create and update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueConfig {
    pub name: String,
    pub kind: QueueKind,
    pub max_message_size: usize,
    pub retention_period_secs: u64,
    pub visibility_timeout_secs: u64,
    /// Long-poll wait used when a receive call does not specify one.
    pub receive_wait_time_secs: u64,
    /// If None, the retry engine's `max_retries` applies.
    pub max_receive_count: Option<u32>,
    /// If None, dead letters go to `<name>-dlq`.
    pub dlq_name: Option<String>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: QueueKind::Standard,
            max_message_size: MAX_MESSAGE_SIZE,
            retention_period_secs: Self::DEFAULT_RETENTION_SECS,
            visibility_timeout_secs: Self::DEFAULT_VISIBILITY_TIMEOUT_SECS,
            receive_wait_time_secs: 0,
            max_receive_count: None,
            dlq_name: None,
        }
    }
}

impl QueueConfig {
    /// Default visibility timeout: 30 seconds.
    pub const DEFAULT_VISIBILITY_TIMEOUT_SECS: u64 = 30;
    /// Default retention: 4 days.
    pub const DEFAULT_RETENTION_SECS: u64 = 345_600;

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: QueueKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() || self.name.len() > MAX_QUEUE_NAME_LEN {
            return Err(format!(
                "queue name must be 1-{MAX_QUEUE_NAME_LEN} characters, got {}",
                self.name.len()
            ));
        }
        if self.name.chars().any(char::is_whitespace) {
            return Err(format!("queue name must not contain whitespace: {:?}", self.name));
        }
        if !(MIN_MESSAGE_SIZE..=MAX_MESSAGE_SIZE).contains(&self.max_message_size) {
            return Err(format!(
                "max_message_size must be {MIN_MESSAGE_SIZE}-{MAX_MESSAGE_SIZE}, got {}",
                self.max_message_size
            ));
        }
        if !(MIN_RETENTION_SECS..=MAX_RETENTION_SECS).contains(&self.retention_period_secs) {
            return Err(format!(
                "retention_period_secs must be {MIN_RETENTION_SECS}-{MAX_RETENTION_SECS}, got {}",
                self.retention_period_secs
            ));
        }
        if self.visibility_timeout_secs > MAX_VISIBILITY_TIMEOUT_SECS {
            return Err(format!(
                "visibility_timeout_secs must be at most {MAX_VISIBILITY_TIMEOUT_SECS}, got {}",
                self.visibility_timeout_secs
            ));
        }
        if self.receive_wait_time_secs > MAX_RECEIVE_WAIT_SECS {
            return Err(format!(
                "receive_wait_time_secs must be at most {MAX_RECEIVE_WAIT_SECS}, got {}",
                self.receive_wait_time_secs
            ));
        }
        if let Some(count) = self.max_receive_count {
            if !(1..=MAX_RECEIVE_COUNT).contains(&count) {
                return Err(format!(
                    "max_receive_count must be 1-{MAX_RECEIVE_COUNT}, got {count}"
                ));
            }
        }
        if self.dlq_name.as_deref() == Some(self.name.as_str()) {
            return Err(format!("queue {} cannot be its own dead-letter queue", self.name));
        }
        Ok(())
    }

    /// Name of the queue that receives this queue's dead letters. Auto-named
    /// DLQs do not get a DLQ of their own.
    pub fn dead_letter_target(&self) -> Option<String> {
        match &self.dlq_name {
            Some(name) => Some(name.clone()),
            None if self.name.ends_with(DLQ_SUFFIX) => None,
            None => Some(format!("{}{DLQ_SUFFIX}", self.name)),
        }
    }
}

/// Partial update for an existing queue. The name and kind are fixed at
/// creation time.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueueUpdate {
    pub max_message_size: Option<usize>,
    pub retention_period_secs: Option<u64>,
    pub visibility_timeout_secs: Option<u64>,
    pub receive_wait_time_secs: Option<u64>,
    pub max_receive_count: Option<u32>,
    pub dlq_name: Option<String>,
}

impl QueueUpdate {
    /// Apply the update to a copy of `config` and validate the result.
    pub fn apply_to(&self, config: &QueueConfig) -> Result<QueueConfig, String> {
        let mut updated = config.clone();
        if let Some(v) = self.max_message_size {
            updated.max_message_size = v;
        }
        if let Some(v) = self.retention_period_secs {
            updated.retention_period_secs = v;
        }
        if let Some(v) = self.visibility_timeout_secs {
            updated.visibility_timeout_secs = v;
        }
        if let Some(v) = self.receive_wait_time_secs {
            updated.receive_wait_time_secs = v;
        }
        if let Some(v) = self.max_receive_count {
            updated.max_receive_count = Some(v);
        }
        if let Some(ref v) = self.dlq_name {
            updated.dlq_name = Some(v.clone());
        }
        updated.validate()?;
        Ok(updated)
    }
}

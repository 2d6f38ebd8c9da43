use tokio::sync::oneshot;
use uuid::Uuid;

use crate::broker::stats::{QueueInfo, QueueStats};
use crate::error::{
    AckError, AttributesError, CreateQueueError, NackError, PublishError, QueueError, ReceiveError,
    VisibilityError,
};
use crate::message::{AttributeValue, Attributes, MessageAttributes, MessageBody, ReceivedMessage, ReceiptHandle};
use crate::queue::{QueueConfig, QueueUpdate};
use crate::retry::FailureOutcome;

/// A message as submitted by a producer.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDraft {
    pub body: MessageBody,
    pub attributes: Attributes,
    /// Defaults to `Message::DEFAULT_PRIORITY`.
    pub priority: Option<u8>,
    pub delay_secs: u64,
    pub group_id: Option<String>,
}

impl MessageDraft {
    pub fn new(body: impl Into<MessageBody>) -> Self {
        Self {
            body: body.into(),
            attributes: Attributes::new(),
            priority: None,
            delay_secs: 0,
            group_id: None,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_delay_secs(mut self, delay_secs: u64) -> Self {
        self.delay_secs = delay_secs;
        self
    }

    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Returned by a successful publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReceipt {
    pub message_id: Uuid,
    /// Publish time, epoch milliseconds.
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub queue: String,
    pub max_messages: usize,
    /// Long-poll wait. None uses the queue's `receive_wait_time_secs`.
    pub wait_secs: Option<u64>,
    /// None uses the queue's `visibility_timeout_secs`.
    pub visibility_timeout_secs: Option<u64>,
}

impl ReceiveRequest {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            max_messages: 1,
            wait_secs: None,
            visibility_timeout_secs: None,
        }
    }

    pub fn max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages;
        self
    }

    pub fn wait_secs(mut self, wait_secs: u64) -> Self {
        self.wait_secs = Some(wait_secs);
        self
    }

    pub fn visibility_timeout_secs(mut self, secs: u64) -> Self {
        self.visibility_timeout_secs = Some(secs);
        self
    }
}

pub type BatchResult = Vec<Result<PublishReceipt, PublishError>>;

/// Commands sent to the single-threaded scheduler core.
///
/// Each variant that expects a response carries a `tokio::sync::oneshot::Sender`
/// for the reply.
pub enum SchedulerCommand {
    Publish {
        queue: String,
        draft: MessageDraft,
        reply: oneshot::Sender<Result<PublishReceipt, PublishError>>,
    },
    /// The outer error covers the batch as a whole (unknown queue, bad
    /// size); per-entry failures are in the inner results.
    PublishBatch {
        queue: String,
        drafts: Vec<MessageDraft>,
        reply: oneshot::Sender<Result<BatchResult, PublishError>>,
    },
    Receive {
        request: ReceiveRequest,
        reply: oneshot::Sender<Result<Vec<ReceivedMessage>, ReceiveError>>,
    },
    Ack {
        queue: String,
        receipt: ReceiptHandle,
        reply: oneshot::Sender<Result<(), AckError>>,
    },
    Nack {
        queue: String,
        receipt: ReceiptHandle,
        error: String,
        reply: oneshot::Sender<Result<FailureOutcome, NackError>>,
    },
    ChangeVisibility {
        queue: String,
        receipt: ReceiptHandle,
        timeout_secs: u64,
        reply: oneshot::Sender<Result<(), VisibilityError>>,
    },
    GetAttributes {
        queue: String,
        receipt: ReceiptHandle,
        reply: oneshot::Sender<Result<MessageAttributes, AttributesError>>,
    },
    CreateQueue {
        config: QueueConfig,
        reply: oneshot::Sender<Result<QueueInfo, CreateQueueError>>,
    },
    GetQueue {
        queue: String,
        reply: oneshot::Sender<Result<QueueInfo, QueueError>>,
    },
    ListQueues {
        reply: oneshot::Sender<Vec<QueueInfo>>,
    },
    UpdateQueue {
        queue: String,
        update: QueueUpdate,
        reply: oneshot::Sender<Result<QueueInfo, QueueError>>,
    },
    DeleteQueue {
        queue: String,
        reply: oneshot::Sender<Result<(), QueueError>>,
    },
    /// Replies with the number of messages removed.
    PurgeQueue {
        queue: String,
        reply: oneshot::Sender<Result<u64, QueueError>>,
    },
    PauseQueue {
        queue: String,
        reply: oneshot::Sender<Result<(), QueueError>>,
    },
    ResumeQueue {
        queue: String,
        reply: oneshot::Sender<Result<(), QueueError>>,
    },
    GetStats {
        queue: String,
        reply: oneshot::Sender<Result<QueueStats, QueueError>>,
    },
    Shutdown,
}

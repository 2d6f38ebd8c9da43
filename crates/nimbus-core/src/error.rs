/// Infrastructure errors from talking to the scheduler thread.
/// Every per-operation error type embeds this via `#[from]`.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("failed to spawn scheduler thread: {0}")]
    SchedulerSpawn(String),

    #[error("scheduler command channel is full")]
    ChannelFull,

    #[error("scheduler command channel is disconnected")]
    ChannelDisconnected,

    #[error("scheduler dropped the reply channel")]
    ReplyDropped,

    #[error("scheduler thread panicked")]
    SchedulerPanicked,
}

pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

// --- Per-operation error types ---

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("queue is paused: {0}")]
    QueuePaused(String),

    #[error("message body is {size} bytes, queue limit is {limit}")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("priority must be between 1 and 10, got {0}")]
    InvalidPriority(u8),

    #[error("delay must be at most {max_secs}s, got {requested_secs}s")]
    InvalidDelay { requested_secs: u64, max_secs: u64 },

    #[error("batch must contain between 1 and {max} entries, got {len}")]
    InvalidBatchSize { len: usize, max: usize },

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("max messages must be between 1 and {max}, got {requested}")]
    InvalidMaxMessages { requested: usize, max: usize },

    #[error("visibility timeout must be at most {max_secs}s, got {requested_secs}s")]
    InvalidVisibilityTimeout { requested_secs: u64, max_secs: u64 },

    #[error("wait time must be at most {max_secs}s, got {requested_secs}s")]
    InvalidWaitTime { requested_secs: u64, max_secs: u64 },

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

#[derive(Debug, thiserror::Error)]
pub enum AckError {
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("lease expired: {0}")]
    LeaseExpired(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

#[derive(Debug, thiserror::Error)]
pub enum NackError {
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("lease expired: {0}")]
    LeaseExpired(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

#[derive(Debug, thiserror::Error)]
pub enum VisibilityError {
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("lease expired: {0}")]
    LeaseExpired(String),

    #[error("visibility timeout must be at most {max_secs}s, got {requested_secs}s")]
    InvalidVisibilityTimeout { requested_secs: u64, max_secs: u64 },

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

#[derive(Debug, thiserror::Error)]
pub enum AttributesError {
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("message not found: {0}")]
    MessageNotFound(String),

    #[error("lease expired: {0}")]
    LeaseExpired(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

#[derive(Debug, thiserror::Error)]
pub enum CreateQueueError {
    #[error("queue already exists: {0}")]
    QueueAlreadyExists(String),

    #[error("invalid queue configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Errors for queue lifecycle operations on an existing queue
/// (get, update, delete, purge, pause, resume, stats).
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("invalid queue configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

#[derive(Debug, thiserror::Error)]
pub enum ReceiptHandleError {
    #[error("malformed receipt handle: {0}")]
    Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("worker not found: {0}")]
    WorkerNotFound(uuid::Uuid),

    #[error("worker already exists: {0}")]
    WorkerAlreadyExists(uuid::Uuid),

    #[error("worker concurrency must be at least 1")]
    InvalidConcurrency,
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("failed to spawn heartbeat monitor thread: {0}")]
    Spawn(String),

    #[error("heartbeat monitor is already running")]
    AlreadyRunning,

    #[error("heartbeat monitor thread panicked")]
    Panicked,
}

/// Returned by a `WorkerRestarter` that could not bring a worker back.
#[derive(Debug, thiserror::Error)]
#[error("failed to restart worker {worker_id}: {reason}")]
pub struct RestartError {
    pub worker_id: uuid::Uuid,
    pub reason: String,
}

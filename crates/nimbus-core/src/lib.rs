pub mod broker;
pub mod config;
pub mod error;
pub mod message;
pub mod metrics;
pub mod notify;
pub mod queue;
pub mod retry;
pub mod telemetry;
pub mod worker;

pub use broker::{Broker, BrokerConfig, MessageDraft, PublishReceipt, QueueInfo, QueueStats, ReceiveRequest};
pub use config::NimbusConfig;
pub use error::{BrokerError, BrokerResult};
pub use message::{Message, MessageBody, ReceiptHandle, ReceivedMessage};
pub use notify::{NoopNotifier, PersistenceNotifier};
pub use queue::{QueueConfig, QueueKind, QueueUpdate};
pub use retry::{FailureOutcome, RetryConfig, RetryStrategy};
pub use worker::{Autoscaler, HeartbeatMonitor, Worker, WorkerConfig, WorkerRegistry};

/// Wall-clock time in epoch milliseconds.
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

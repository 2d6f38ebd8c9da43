pub mod command;
pub mod config;
mod scheduler;
mod state;
pub mod stats;

use std::sync::Arc;
use std::thread;

use tokio::sync::oneshot;
use tracing::info;

use crate::error::{
    AckError, AttributesError, BrokerError, BrokerResult, CreateQueueError, NackError,
    PublishError, QueueError, ReceiveError, VisibilityError,
};
use crate::message::{MessageAttributes, ReceivedMessage, ReceiptHandle};
use crate::metrics::Metrics;
use crate::notify::{EventDispatcher, NoopNotifier, PersistenceNotifier};
use crate::queue::{QueueConfig, QueueUpdate};
use crate::retry::FailureOutcome;

pub use command::{BatchResult, MessageDraft, PublishReceipt, ReceiveRequest, SchedulerCommand};
pub use config::{BrokerConfig, QueueDefaults, SchedulerConfig};
pub use stats::{QueueInfo, QueueStats};

use scheduler::Scheduler;

/// The broker owns the scheduler thread and the inbound command channel.
/// Callers send commands through `send_command()` (or the async helpers
/// built on it) and the single-threaded scheduler processes them in order.
pub struct Broker {
    command_tx: crossbeam_channel::Sender<SchedulerCommand>,
    scheduler_thread: Option<thread::JoinHandle<()>>,
    dispatcher: Option<EventDispatcher>,
}

impl Broker {
    /// Start a broker whose state changes go nowhere.
    pub fn new(config: BrokerConfig) -> BrokerResult<Self> {
        Self::with_notifier(config, Arc::new(NoopNotifier))
    }

    #[tracing::instrument(skip_all, fields(queues = config.queues.len()))]
    pub fn with_notifier(
        config: BrokerConfig,
        notifier: Arc<dyn PersistenceNotifier>,
    ) -> BrokerResult<Self> {
        let (tx, rx) =
            crossbeam_channel::bounded::<SchedulerCommand>(config.scheduler.command_channel_capacity);
        let (dispatcher, events) =
            EventDispatcher::spawn(notifier, config.scheduler.event_channel_capacity)?;

        let handle = thread::Builder::new()
            .name("nimbus-scheduler".to_string())
            .spawn(move || {
                let mut scheduler = Scheduler::new(rx, &config, events, Metrics::new());
                scheduler.run();
            })
            .map_err(|e| BrokerError::SchedulerSpawn(e.to_string()))?;

        info!("broker started");

        Ok(Self {
            command_tx: tx,
            scheduler_thread: Some(handle),
            dispatcher: Some(dispatcher),
        })
    }

    /// Send a command to the scheduler. Fails if the channel is full or
    /// disconnected.
    pub fn send_command(&self, cmd: SchedulerCommand) -> BrokerResult<()> {
        self.command_tx.try_send(cmd).map_err(|e| match e {
            crossbeam_channel::TrySendError::Full(_) => BrokerError::ChannelFull,
            crossbeam_channel::TrySendError::Disconnected(_) => BrokerError::ChannelDisconnected,
        })
    }

    async fn request<T, E>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, E>>) -> SchedulerCommand,
    ) -> Result<T, E>
    where
        E: From<BrokerError>,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_command(build(reply_tx))?;
        reply_rx.await.map_err(|_| BrokerError::ReplyDropped)?
    }

    #[tracing::instrument(skip_all, fields(%queue))]
    pub async fn publish(&self, queue: &str, draft: MessageDraft) -> Result<PublishReceipt, PublishError> {
        let queue = queue.to_string();
        self.request(|reply| SchedulerCommand::Publish {
            queue,
            draft,
            reply,
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(%queue, entries = drafts.len()))]
    pub async fn publish_batch(
        &self,
        queue: &str,
        drafts: Vec<MessageDraft>,
    ) -> Result<BatchResult, PublishError> {
        let queue = queue.to_string();
        self.request(|reply| SchedulerCommand::PublishBatch {
            queue,
            drafts,
            reply,
        })
        .await
    }

    /// Receive up to `max_messages`. With a wait time the call resolves as
    /// soon as messages are leased or the wait elapses. Dropping the future
    /// abandons the receive without leasing anything.
    #[tracing::instrument(skip_all, fields(queue = %request.queue))]
    pub async fn receive(&self, request: ReceiveRequest) -> Result<Vec<ReceivedMessage>, ReceiveError> {
        self.request(|reply| SchedulerCommand::Receive { request, reply })
            .await
    }

    #[tracing::instrument(skip_all, fields(%queue))]
    pub async fn ack(&self, queue: &str, receipt: &ReceiptHandle) -> Result<(), AckError> {
        let (queue, receipt) = (queue.to_string(), *receipt);
        self.request(|reply| SchedulerCommand::Ack {
            queue,
            receipt,
            reply,
        })
        .await
    }

    /// Report a failed delivery. The message is rescheduled with backoff
    /// or dead-lettered.
    #[tracing::instrument(skip_all, fields(%queue))]
    pub async fn nack(
        &self,
        queue: &str,
        receipt: &ReceiptHandle,
        error: &str,
    ) -> Result<FailureOutcome, NackError> {
        let (queue, receipt, error) = (queue.to_string(), *receipt, error.to_string());
        self.request(|reply| SchedulerCommand::Nack {
            queue,
            receipt,
            error,
            reply,
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(%queue, timeout_secs = timeout_secs))]
    pub async fn change_visibility(
        &self,
        queue: &str,
        receipt: &ReceiptHandle,
        timeout_secs: u64,
    ) -> Result<(), VisibilityError> {
        let (queue, receipt) = (queue.to_string(), *receipt);
        self.request(|reply| SchedulerCommand::ChangeVisibility {
            queue,
            receipt,
            timeout_secs,
            reply,
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(%queue))]
    pub async fn get_attributes(
        &self,
        queue: &str,
        receipt: &ReceiptHandle,
    ) -> Result<MessageAttributes, AttributesError> {
        let (queue, receipt) = (queue.to_string(), *receipt);
        self.request(|reply| SchedulerCommand::GetAttributes {
            queue,
            receipt,
            reply,
        })
        .await
    }

    pub async fn stats(&self, queue: &str) -> Result<QueueStats, QueueError> {
        let queue = queue.to_string();
        self.request(|reply| SchedulerCommand::GetStats { queue, reply })
            .await
    }

    #[tracing::instrument(skip_all, fields(queue = %config.name))]
    pub async fn create_queue(&self, config: QueueConfig) -> Result<QueueInfo, CreateQueueError> {
        self.request(|reply| SchedulerCommand::CreateQueue { config, reply })
            .await
    }

    pub async fn get_queue(&self, queue: &str) -> Result<QueueInfo, QueueError> {
        let queue = queue.to_string();
        self.request(|reply| SchedulerCommand::GetQueue { queue, reply })
            .await
    }

    pub async fn list_queues(&self) -> BrokerResult<Vec<QueueInfo>> {
        let (reply, reply_rx) = oneshot::channel();
        self.send_command(SchedulerCommand::ListQueues { reply })?;
        reply_rx.await.map_err(|_| BrokerError::ReplyDropped)
    }

    #[tracing::instrument(skip_all, fields(%queue))]
    pub async fn update_queue(&self, queue: &str, update: QueueUpdate) -> Result<QueueInfo, QueueError> {
        let queue = queue.to_string();
        self.request(|reply| SchedulerCommand::UpdateQueue {
            queue,
            update,
            reply,
        })
        .await
    }

    #[tracing::instrument(skip_all, fields(%queue))]
    pub async fn delete_queue(&self, queue: &str) -> Result<(), QueueError> {
        let queue = queue.to_string();
        self.request(|reply| SchedulerCommand::DeleteQueue { queue, reply })
            .await
    }

    /// Remove every message from the queue. Returns how many were removed.
    #[tracing::instrument(skip_all, fields(%queue))]
    pub async fn purge_queue(&self, queue: &str) -> Result<u64, QueueError> {
        let queue = queue.to_string();
        self.request(|reply| SchedulerCommand::PurgeQueue { queue, reply })
            .await
    }

    #[tracing::instrument(skip_all, fields(%queue))]
    pub async fn pause_queue(&self, queue: &str) -> Result<(), QueueError> {
        let queue = queue.to_string();
        self.request(|reply| SchedulerCommand::PauseQueue { queue, reply })
            .await
    }

    #[tracing::instrument(skip_all, fields(%queue))]
    pub async fn resume_queue(&self, queue: &str) -> Result<(), QueueError> {
        let queue = queue.to_string();
        self.request(|reply| SchedulerCommand::ResumeQueue { queue, reply })
            .await
    }

    /// Graceful shutdown: stop the scheduler, then let the event dispatcher
    /// drain.
    #[tracing::instrument(skip_all)]
    pub fn shutdown(mut self) -> BrokerResult<()> {
        info!("initiating broker shutdown");
        self.stop()?;
        info!("broker shutdown complete");
        Ok(())
    }

    fn stop(&mut self) -> BrokerResult<()> {
        // The scheduler may already be gone; a failed send is fine.
        let _ = self.command_tx.send(SchedulerCommand::Shutdown);

        if let Some(handle) = self.scheduler_thread.take() {
            handle.join().map_err(|_| BrokerError::SchedulerPanicked)?;
        }
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.join()?;
        }
        Ok(())
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        if self.scheduler_thread.is_some() {
            let _ = self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_broker() -> Broker {
        let config = BrokerConfig {
            scheduler: SchedulerConfig {
                command_channel_capacity: 100,
                idle_timeout_ms: 10,
                sweep_interval_ms: 10,
                event_channel_capacity: 100,
            },
            ..Default::default()
        };
        Broker::new(config).unwrap()
    }

    #[test]
    fn broker_starts_and_shuts_down() {
        let broker = test_broker();
        broker.shutdown().unwrap();
    }

    #[test]
    fn broker_processes_publish_command() {
        let broker = test_broker();

        let (create_tx, create_rx) = oneshot::channel();
        broker
            .send_command(SchedulerCommand::CreateQueue {
                config: QueueConfig::new("test-queue"),
                reply: create_tx,
            })
            .unwrap();
        create_rx.blocking_recv().unwrap().unwrap();

        let (reply_tx, reply_rx) = oneshot::channel();
        broker
            .send_command(SchedulerCommand::Publish {
                queue: "test-queue".to_string(),
                draft: MessageDraft::new("hello"),
                reply: reply_tx,
            })
            .unwrap();
        let receipt = reply_rx.blocking_recv().unwrap().unwrap();
        assert!(receipt.timestamp > 0);

        broker.shutdown().unwrap();
    }

    #[test]
    fn broker_drop_stops_scheduler() {
        let broker = test_broker();
        drop(broker);
    }

    #[test]
    fn configured_queues_exist_at_startup() {
        let config = BrokerConfig {
            queues: vec![QueueConfig::new("orders"), QueueConfig::new("jobs")],
            ..Default::default()
        };
        let broker = Broker::new(config).unwrap();
        let (reply, reply_rx) = oneshot::channel();
        broker
            .send_command(SchedulerCommand::ListQueues { reply })
            .unwrap();
        let names: Vec<String> = reply_rx
            .blocking_recv()
            .unwrap()
            .into_iter()
            .map(|q| q.config.name)
            .collect();
        assert_eq!(names, vec!["jobs", "orders"]);
        broker.shutdown().unwrap();
    }
}

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crossbeam_channel::Receiver;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::broker::command::{
    BatchResult, MessageDraft, PublishReceipt, ReceiveRequest, SchedulerCommand,
};
use crate::broker::config::{BrokerConfig, QueueDefaults};
use crate::broker::state::{LeaseCheck, QueueState};
use crate::broker::stats::{QueueInfo, QueueStats};
use crate::error::{
    AckError, AttributesError, CreateQueueError, NackError, PublishError, QueueError, ReceiveError,
    VisibilityError,
};
use crate::message::{
    Message, MessageAttributes, MessageStatus, ReceiptHandle, ReceivedMessage,
    LAST_ERROR_ATTRIBUTE, ORIGINAL_QUEUE_ATTRIBUTE,
};
use crate::metrics::Metrics;
use crate::notify::{EventSink, QueueChange};
use crate::queue::{QueueConfig, QueueUpdate};
use crate::retry::{compute_delay, FailureDecision, FailureOutcome, RetryPolicy};

mod admin_handlers;
mod delivery;
mod failure;
mod handlers;
mod metrics_recording;
mod sweep;

/// Error recorded on messages whose lease ran out.
pub(crate) const VISIBILITY_EXPIRED: &str = "visibility timeout expired";

/// A receive call parked until messages arrive or its deadline passes.
pub(super) struct Waiter {
    pub(super) request: ReceiveRequest,
    pub(super) visibility_ms: u64,
    pub(super) deadline: u64,
    pub(super) reply: oneshot::Sender<Result<Vec<ReceivedMessage>, ReceiveError>>,
}

/// Single-threaded scheduler core. Owns every queue and processes commands
/// sequentially, so grants, acks and reclaims are totally ordered.
pub struct Scheduler {
    inbound: Receiver<SchedulerCommand>,
    idle_timeout: Duration,
    sweep_interval_ms: u64,
    next_sweep_at: u64,
    running: bool,
    queues: HashMap<String, QueueState>,
    waiters: VecDeque<Waiter>,
    retry: RetryPolicy,
    queue_defaults: QueueDefaults,
    events: EventSink,
    metrics: Metrics,
}

impl Scheduler {
    pub fn new(
        inbound: Receiver<SchedulerCommand>,
        config: &BrokerConfig,
        events: EventSink,
        metrics: Metrics,
    ) -> Self {
        let mut scheduler = Self {
            inbound,
            idle_timeout: Duration::from_millis(config.scheduler.idle_timeout_ms),
            sweep_interval_ms: config.scheduler.sweep_interval_ms,
            next_sweep_at: 0,
            running: true,
            queues: HashMap::new(),
            waiters: VecDeque::new(),
            retry: RetryPolicy::new(config.retry.clone()),
            queue_defaults: config.queue_defaults.clone(),
            events,
            metrics,
        };

        let now = crate::now_ms();
        for queue in &config.queues {
            if let Err(e) = scheduler.handle_create_queue(queue.clone(), now) {
                error!(queue = %queue.name, error = %e, "failed to create configured queue");
            }
        }
        scheduler
    }

    /// Run the scheduler event loop. Blocks the current thread until a
    /// `Shutdown` command arrives or the inbound channel disconnects.
    pub fn run(&mut self) {
        info!(queues = self.queues.len(), "scheduler started");

        while self.running {
            let now = crate::now_ms();
            if now >= self.next_sweep_at {
                self.sweep(now);
            }

            // Phase 1: drain buffered commands without blocking.
            let mut drained = 0;
            while let Ok(cmd) = self.inbound.try_recv() {
                self.handle_command(cmd, crate::now_ms());
                drained += 1;
                if !self.running {
                    break;
                }
            }
            if !self.running {
                break;
            }

            // Phase 2: hand newly visible messages to parked receives.
            self.serve_waiters(crate::now_ms());
            self.record_gauges();

            // Phase 3: park until the next command, tick or waiter deadline.
            if drained == 0 {
                let timeout = self.park_timeout(crate::now_ms());
                match self.inbound.recv_timeout(timeout) {
                    Ok(cmd) => self.handle_command(cmd, crate::now_ms()),
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                        info!("inbound channel disconnected, shutting down");
                        self.running = false;
                    }
                }
            }
        }

        self.release_waiters();
        info!("scheduler stopped");
    }

    fn park_timeout(&self, now: u64) -> Duration {
        match self.nearest_waiter_deadline() {
            Some(deadline) => {
                let until = Duration::from_millis(deadline.saturating_sub(now));
                until.min(self.idle_timeout)
            }
            None => self.idle_timeout,
        }
    }

    pub(crate) fn handle_command(&mut self, cmd: SchedulerCommand, now: u64) {
        match cmd {
            SchedulerCommand::Publish {
                queue,
                draft,
                reply,
            } => {
                let result = self.handle_publish(&queue, draft, now);
                let _ = reply.send(result);
            }
            SchedulerCommand::PublishBatch {
                queue,
                drafts,
                reply,
            } => {
                debug!(%queue, entries = drafts.len(), "publish batch command received");
                let result = self.handle_publish_batch(&queue, drafts, now);
                let _ = reply.send(result);
            }
            SchedulerCommand::Receive { request, reply } => {
                self.handle_receive(request, reply, now);
            }
            SchedulerCommand::Ack {
                queue,
                receipt,
                reply,
            } => {
                let result = self.handle_ack(&queue, &receipt, now);
                let _ = reply.send(result);
            }
            SchedulerCommand::Nack {
                queue,
                receipt,
                error,
                reply,
            } => {
                debug!(%queue, message_id = %receipt.message_id, %error, "nack command received");
                let result = self.handle_nack(&queue, &receipt, &error, now);
                let _ = reply.send(result);
            }
            SchedulerCommand::ChangeVisibility {
                queue,
                receipt,
                timeout_secs,
                reply,
            } => {
                let result = self.handle_change_visibility(&queue, &receipt, timeout_secs, now);
                let _ = reply.send(result);
            }
            SchedulerCommand::GetAttributes {
                queue,
                receipt,
                reply,
            } => {
                let result = self.handle_get_attributes(&queue, &receipt);
                let _ = reply.send(result);
            }
            SchedulerCommand::CreateQueue { config, reply } => {
                info!(queue = %config.name, "create queue command received");
                let result = self.handle_create_queue(config, now);
                let _ = reply.send(result);
            }
            SchedulerCommand::GetQueue { queue, reply } => {
                let result = self.handle_get_queue(&queue);
                let _ = reply.send(result);
            }
            SchedulerCommand::ListQueues { reply } => {
                let _ = reply.send(self.handle_list_queues());
            }
            SchedulerCommand::UpdateQueue {
                queue,
                update,
                reply,
            } => {
                info!(%queue, "update queue command received");
                let result = self.handle_update_queue(&queue, update, now);
                let _ = reply.send(result);
            }
            SchedulerCommand::DeleteQueue { queue, reply } => {
                info!(%queue, "delete queue command received");
                let result = self.handle_delete_queue(&queue, now);
                let _ = reply.send(result);
            }
            SchedulerCommand::PurgeQueue { queue, reply } => {
                info!(%queue, "purge queue command received");
                let result = self.handle_purge_queue(&queue, now);
                let _ = reply.send(result);
            }
            SchedulerCommand::PauseQueue { queue, reply } => {
                let result = self.handle_set_paused(&queue, true, now);
                let _ = reply.send(result);
            }
            SchedulerCommand::ResumeQueue { queue, reply } => {
                let result = self.handle_set_paused(&queue, false, now);
                let _ = reply.send(result);
            }
            SchedulerCommand::GetStats { queue, reply } => {
                let result = self.handle_get_stats(&queue);
                let _ = reply.send(result);
            }
            SchedulerCommand::Shutdown => {
                info!("shutdown command received");
                self.running = false;
            }
        }
    }
}

#[cfg(test)]
mod tests;

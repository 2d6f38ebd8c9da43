//! Fire-and-forget state change notifications.
//!
//! The scheduler never calls a notifier directly. It pushes `BrokerEvent`s
//! into a bounded channel through an `EventSink`; a dispatcher thread drains
//! the channel and invokes the `PersistenceNotifier`. A slow notifier can
//! only cause events to be dropped, never stall message delivery.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{BrokerError, BrokerResult};
use crate::message::MessageStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueChange {
    Created,
    Updated,
    Deleted,
    Purged,
    Paused,
    Resumed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    MessageStateChanged {
        queue: String,
        message_id: Uuid,
        status: MessageStatus,
        at: u64,
    },
    QueueChanged {
        queue: String,
        change: QueueChange,
        at: u64,
    },
}

/// Observer for broker state changes, e.g. a write-behind store.
pub trait PersistenceNotifier: Send + Sync + 'static {
    fn on_message_state_changed(&self, queue: &str, message_id: Uuid, status: MessageStatus, at: u64);

    fn on_queue_changed(&self, queue: &str, change: QueueChange, at: u64);
}

/// Notifier that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl PersistenceNotifier for NoopNotifier {
    fn on_message_state_changed(&self, _: &str, _: Uuid, _: MessageStatus, _: u64) {}

    fn on_queue_changed(&self, _: &str, _: QueueChange, _: u64) {}
}

/// Sending half of the event channel, owned by the scheduler.
#[derive(Clone)]
pub struct EventSink {
    tx: Sender<BrokerEvent>,
}

impl EventSink {
    pub fn new(tx: Sender<BrokerEvent>) -> Self {
        Self { tx }
    }

    pub fn emit(&self, event: BrokerEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!(?event, "event channel full, dropping event");
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("event dispatcher gone, dropping event");
            }
        }
    }

    pub fn message_state(&self, queue: &str, message_id: Uuid, status: MessageStatus, at: u64) {
        self.emit(BrokerEvent::MessageStateChanged {
            queue: queue.to_string(),
            message_id,
            status,
            at,
        });
    }

    pub fn queue_changed(&self, queue: &str, change: QueueChange, at: u64) {
        self.emit(BrokerEvent::QueueChanged {
            queue: queue.to_string(),
            change,
            at,
        });
    }
}

/// Owns the dispatcher thread. The thread exits once every `EventSink`
/// has been dropped and the channel is drained.
pub struct EventDispatcher {
    handle: Option<thread::JoinHandle<()>>,
}

impl EventDispatcher {
    pub fn spawn(
        notifier: Arc<dyn PersistenceNotifier>,
        capacity: usize,
    ) -> BrokerResult<(Self, EventSink)> {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        let handle = thread::Builder::new()
            .name("nimbus-events".to_string())
            .spawn(move || dispatch(notifier.as_ref(), &rx))
            .map_err(|e| BrokerError::SchedulerSpawn(e.to_string()))?;
        Ok((
            Self {
                handle: Some(handle),
            },
            EventSink::new(tx),
        ))
    }

    /// Wait for the dispatcher to drain. Only returns after the sinks are gone.
    pub fn join(mut self) -> BrokerResult<()> {
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| BrokerError::SchedulerPanicked)?;
        }
        Ok(())
    }
}

fn dispatch(notifier: &dyn PersistenceNotifier, rx: &Receiver<BrokerEvent>) {
    debug!("event dispatcher started");
    for event in rx.iter() {
        match event {
            BrokerEvent::MessageStateChanged {
                queue,
                message_id,
                status,
                at,
            } => notifier.on_message_state_changed(&queue, message_id, status, at),
            BrokerEvent::QueueChanged { queue, change, at } => {
                notifier.on_queue_changed(&queue, change, at)
            }
        }
    }
    info!("event dispatcher stopped");
}

//! Per-queue message storage owned by the scheduler.

use std::collections::{BTreeMap, HashMap, HashSet};

use uuid::Uuid;

use crate::broker::stats::{QueueInfo, QueueStats};
use crate::message::{Message, MessageStatus, ReceiptHandle, ReceivedMessage};
use crate::queue::{QueueConfig, QueueKind, MAX_PRIORITY};

/// Delivery order key. Priority queues rank by priority first; every
/// queue then falls back to publish sequence.
type ReadyKey = (u8, u64);

fn ready_key(kind: QueueKind, msg: &Message) -> ReadyKey {
    match kind {
        QueueKind::Priority => (MAX_PRIORITY.saturating_sub(msg.priority), msg.seq),
        _ => (0, msg.seq),
    }
}

/// Messages published to a fifo queue without a group share one group.
fn group_key(msg: &Message) -> &str {
    msg.group_id.as_deref().unwrap_or("")
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Lease {
    pub(crate) receipt: ReceiptHandle,
    pub(crate) visible_at: u64,
    pub(crate) leased_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LeaseCheck {
    MessageNotFound,
    LeaseExpired,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct QueueCounters {
    pub(crate) published: u64,
    pub(crate) consumed: u64,
    pub(crate) acknowledged: u64,
    pub(crate) dead_lettered: u64,
    pub(crate) expired: u64,
}

pub(crate) struct QueueState {
    pub(crate) config: QueueConfig,
    pub(crate) paused: bool,
    pub(crate) created_at: u64,
    pub(crate) updated_at: u64,
    pub(crate) counters: QueueCounters,
    next_seq: u64,
    messages: HashMap<Uuid, Message>,
    /// Buffered messages (delayed ones included), in delivery order.
    ready: BTreeMap<ReadyKey, Uuid>,
    leases: HashMap<Uuid, Lease>,
    /// Fifo only: in-flight lease count per message group.
    groups_in_flight: HashMap<String, usize>,
}

impl QueueState {
    pub(crate) fn new(config: QueueConfig, now: u64) -> Self {
        Self {
            config,
            paused: false,
            created_at: now,
            updated_at: now,
            counters: QueueCounters::default(),
            next_seq: 0,
            messages: HashMap::new(),
            ready: BTreeMap::new(),
            leases: HashMap::new(),
            groups_in_flight: HashMap::new(),
        }
    }

    pub(crate) fn depth(&self) -> u64 {
        self.ready.len() as u64
    }

    pub(crate) fn in_flight(&self) -> u64 {
        self.leases.len() as u64
    }

    pub(crate) fn message(&self, id: &Uuid) -> Option<&Message> {
        self.messages.get(id)
    }

    pub(crate) fn message_mut(&mut self, id: &Uuid) -> Option<&mut Message> {
        self.messages.get_mut(id)
    }

    #[cfg(test)]
    pub(crate) fn lease(&self, id: &Uuid) -> Option<&Lease> {
        self.leases.get(id)
    }

    /// Append a message to the buffered set, assigning the next publish
    /// sequence number.
    pub(crate) fn enqueue(&mut self, mut msg: Message) -> Uuid {
        self.next_seq += 1;
        msg.seq = self.next_seq;
        msg.queue = self.config.name.clone();
        msg.status = MessageStatus::Buffered;
        let id = msg.id;
        self.ready.insert(ready_key(self.config.kind, &msg), id);
        self.messages.insert(id, msg);
        id
    }

    /// Up to `max` messages deliverable at `now`, in delivery order.
    pub(crate) fn select(&self, now: u64, max: usize) -> Vec<Uuid> {
        let fifo = self.config.kind == QueueKind::Fifo;
        let mut seen_groups: HashSet<&str> = HashSet::new();
        let mut selected = Vec::new();

        for id in self.ready.values() {
            if selected.len() >= max {
                break;
            }
            let Some(msg) = self.messages.get(id) else {
                continue;
            };
            if fifo {
                let group = group_key(msg);
                // Only the head of a group is eligible, and only while the
                // group has nothing in flight.
                if !seen_groups.insert(group) || self.groups_in_flight.contains_key(group) {
                    continue;
                }
            }
            if msg.available_at <= now {
                selected.push(*id);
            }
        }
        selected
    }

    /// Lease a buffered message until `now + visibility_ms`.
    pub(crate) fn grant(&mut self, id: Uuid, now: u64, visibility_ms: u64) -> Option<ReceivedMessage> {
        let kind = self.config.kind;
        let msg = self.messages.get_mut(&id)?;
        self.ready.remove(&ready_key(kind, msg));

        let receipt = ReceiptHandle::new(id);
        msg.receive_count += 1;
        msg.first_received_at.get_or_insert(now);
        msg.status = MessageStatus::InFlight;
        msg.last_receipt = Some(receipt);

        if kind == QueueKind::Fifo {
            *self
                .groups_in_flight
                .entry(group_key(msg).to_string())
                .or_default() += 1;
        }
        self.leases.insert(
            id,
            Lease {
                receipt,
                visible_at: now.saturating_add(visibility_ms),
                leased_at: now,
            },
        );
        self.counters.consumed += 1;

        Some(ReceivedMessage {
            message_id: id,
            queue: self.config.name.clone(),
            body: msg.body.clone(),
            attributes: msg.attributes.clone(),
            receipt_handle: receipt,
            receive_count: msg.receive_count,
        })
    }

    /// Undo a grant whose reply could not be delivered.
    pub(crate) fn rollback_grant(&mut self, id: Uuid) {
        if self.release_lease(&id).is_none() {
            return;
        }
        let Some(msg) = self.messages.get_mut(&id) else {
            return;
        };
        msg.receive_count = msg.receive_count.saturating_sub(1);
        if msg.receive_count == 0 {
            msg.first_received_at = None;
        }
        let available_at = msg.available_at;
        self.counters.consumed = self.counters.consumed.saturating_sub(1);
        self.requeue(id, available_at);
    }

    /// The handle must name the current lease, and the lease must not have
    /// passed its deadline.
    pub(crate) fn check_lease(&self, receipt: &ReceiptHandle, now: u64) -> Result<(), LeaseCheck> {
        if !self.messages.contains_key(&receipt.message_id) {
            return Err(LeaseCheck::MessageNotFound);
        }
        match self.leases.get(&receipt.message_id) {
            Some(lease) if lease.receipt == *receipt && lease.visible_at > now => Ok(()),
            _ => Err(LeaseCheck::LeaseExpired),
        }
    }

    pub(crate) fn extend_lease(&mut self, id: &Uuid, visible_at: u64) {
        if let Some(lease) = self.leases.get_mut(id) {
            lease.visible_at = visible_at;
        }
    }

    /// Drop the lease on a message. The message stays in the queue but is
    /// not deliverable until `requeue` or `remove`.
    pub(crate) fn release_lease(&mut self, id: &Uuid) -> Option<Lease> {
        let lease = self.leases.remove(id)?;
        if self.config.kind == QueueKind::Fifo {
            if let Some(msg) = self.messages.get(id) {
                let group = group_key(msg);
                if let Some(count) = self.groups_in_flight.get_mut(group) {
                    *count -= 1;
                    if *count == 0 {
                        self.groups_in_flight.remove(group);
                    }
                }
            }
        }
        Some(lease)
    }

    /// Return a released message to the buffered set.
    pub(crate) fn requeue(&mut self, id: Uuid, available_at: u64) {
        let kind = self.config.kind;
        if let Some(msg) = self.messages.get_mut(&id) {
            msg.available_at = available_at;
            msg.status = MessageStatus::Buffered;
            self.ready.insert(ready_key(kind, msg), id);
        }
    }

    pub(crate) fn remove(&mut self, id: &Uuid) -> Option<Message> {
        self.release_lease(id);
        let msg = self.messages.remove(id)?;
        self.ready.remove(&ready_key(self.config.kind, &msg));
        Some(msg)
    }

    /// Remove every message, buffered and in flight.
    pub(crate) fn drain(&mut self) -> Vec<Message> {
        self.ready.clear();
        self.leases.clear();
        self.groups_in_flight.clear();
        let mut drained: Vec<Message> = self.messages.drain().map(|(_, m)| m).collect();
        drained.sort_by_key(|m| m.seq);
        drained
    }

    /// Leases whose deadline has passed, oldest publish first.
    pub(crate) fn expired_leases(&self, now: u64) -> Vec<Uuid> {
        let mut expired: Vec<(u64, Uuid)> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.visible_at <= now)
            .filter_map(|(id, _)| self.messages.get(id).map(|m| (m.seq, *id)))
            .collect();
        expired.sort_unstable();
        expired.into_iter().map(|(_, id)| id).collect()
    }

    /// Buffered messages older than the queue's retention period.
    pub(crate) fn past_retention(&self, now: u64) -> Vec<Uuid> {
        let retention_ms = self.config.retention_period_secs.saturating_mul(1000);
        self.ready
            .values()
            .filter(|id| {
                self.messages
                    .get(*id)
                    .is_some_and(|m| m.enqueued_at.saturating_add(retention_ms) <= now)
            })
            .copied()
            .collect()
    }

    pub(crate) fn stats(&self) -> QueueStats {
        QueueStats {
            depth: self.depth(),
            in_flight: self.in_flight(),
            published: self.counters.published,
            consumed: self.counters.consumed,
            acknowledged: self.counters.acknowledged,
            dead_lettered: self.counters.dead_lettered,
            expired: self.counters.expired,
            paused: self.paused,
        }
    }

    pub(crate) fn info(&self) -> QueueInfo {
        QueueInfo {
            config: self.config.clone(),
            paused: self.paused,
            created_at: self.created_at,
            updated_at: self.updated_at,
            stats: self.stats(),
        }
    }
}

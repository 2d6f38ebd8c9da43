use super::*;

use crate::queue::{MAX_BATCH_SIZE, MAX_RECEIVE_WAIT_SECS, MAX_VISIBILITY_TIMEOUT_SECS};

type ReceiveReply = oneshot::Sender<Result<Vec<ReceivedMessage>, ReceiveError>>;

impl Scheduler {
    /// Resolve request defaults against the queue and check bounds.
    /// Returns `(visibility_ms, wait_ms)`.
    pub(super) fn validate_receive(&self, request: &ReceiveRequest) -> Result<(u64, u64), ReceiveError> {
        let state = self
            .queues
            .get(&request.queue)
            .ok_or_else(|| ReceiveError::QueueNotFound(request.queue.clone()))?;

        if request.max_messages == 0 || request.max_messages > MAX_BATCH_SIZE {
            return Err(ReceiveError::InvalidMaxMessages {
                requested: request.max_messages,
                max: MAX_BATCH_SIZE,
            });
        }
        let visibility_secs = request
            .visibility_timeout_secs
            .unwrap_or(state.config.visibility_timeout_secs);
        if visibility_secs > MAX_VISIBILITY_TIMEOUT_SECS {
            return Err(ReceiveError::InvalidVisibilityTimeout {
                requested_secs: visibility_secs,
                max_secs: MAX_VISIBILITY_TIMEOUT_SECS,
            });
        }
        let wait_secs = request
            .wait_secs
            .unwrap_or(state.config.receive_wait_time_secs);
        if wait_secs > MAX_RECEIVE_WAIT_SECS {
            return Err(ReceiveError::InvalidWaitTime {
                requested_secs: wait_secs,
                max_secs: MAX_RECEIVE_WAIT_SECS,
            });
        }
        Ok((visibility_secs * 1000, wait_secs * 1000))
    }

    /// Lease whatever is deliverable right now. Never waits.
    pub(super) fn try_receive(
        &mut self,
        request: &ReceiveRequest,
        visibility_ms: u64,
        now: u64,
    ) -> Result<Vec<ReceivedMessage>, ReceiveError> {
        if !self.queues.contains_key(&request.queue) {
            return Err(ReceiveError::QueueNotFound(request.queue.clone()));
        }
        // Expired leases must be reclaimed before they can be granted again.
        self.reclaim_queue(&request.queue, now);

        let Some(state) = self.queues.get_mut(&request.queue) else {
            return Err(ReceiveError::QueueNotFound(request.queue.clone()));
        };
        let selected = state.select(now, request.max_messages);
        let mut granted = Vec::with_capacity(selected.len());
        for id in selected {
            if let Some(received) = state.grant(id, now, visibility_ms) {
                granted.push(received);
            }
        }
        Ok(granted)
    }

    pub(super) fn handle_receive(&mut self, request: ReceiveRequest, reply: ReceiveReply, now: u64) {
        let (visibility_ms, wait_ms) = match self.validate_receive(&request) {
            Ok(limits) => limits,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };
        if reply.is_closed() {
            return;
        }

        match self.try_receive(&request, visibility_ms, now) {
            Ok(messages) if messages.is_empty() && wait_ms > 0 => {
                debug!(queue = %request.queue, wait_ms, "receive parked");
                self.waiters.push_back(Waiter {
                    request,
                    visibility_ms,
                    deadline: now.saturating_add(wait_ms),
                    reply,
                });
            }
            Ok(messages) => self.deliver(&request.queue, reply, messages, now),
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    /// Re-evaluate every parked receive, in arrival order. A waiter whose
    /// deadline has passed gets one last evaluation and then an answer,
    /// possibly empty. Waiters whose caller went away are dropped.
    pub(super) fn serve_waiters(&mut self, now: u64) {
        if self.waiters.is_empty() {
            return;
        }
        let parked = std::mem::take(&mut self.waiters);
        for waiter in parked {
            if waiter.reply.is_closed() {
                debug!(queue = %waiter.request.queue, "dropping abandoned receive");
                continue;
            }
            match self.try_receive(&waiter.request, waiter.visibility_ms, now) {
                Ok(messages) if messages.is_empty() && waiter.deadline > now => {
                    self.waiters.push_back(waiter);
                }
                Ok(messages) => {
                    let queue = waiter.request.queue;
                    self.deliver(&queue, waiter.reply, messages, now);
                }
                Err(e) => {
                    let _ = waiter.reply.send(Err(e));
                }
            }
        }
    }

    pub(super) fn nearest_waiter_deadline(&self) -> Option<u64> {
        self.waiters.iter().map(|w| w.deadline).min()
    }

    /// Answer parked receives with whatever they have (nothing) on shutdown.
    pub(super) fn release_waiters(&mut self) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.reply.send(Ok(Vec::new()));
        }
    }

    /// Send granted messages, then meter and announce the leases. If the
    /// caller is gone the grants are rolled back and never reported.
    pub(super) fn deliver(
        &mut self,
        queue: &str,
        reply: ReceiveReply,
        messages: Vec<ReceivedMessage>,
        now: u64,
    ) {
        let granted: Vec<Uuid> = messages.iter().map(|m| m.message_id).collect();
        if reply.send(Ok(messages)).is_ok() {
            for id in granted {
                self.metrics.record_lease(queue);
                self.events.message_state(queue, id, MessageStatus::InFlight, now);
            }
            return;
        }
        if granted.is_empty() {
            return;
        }
        let Some(state) = self.queues.get_mut(queue) else {
            return;
        };
        warn!(%queue, count = granted.len(), "receiver dropped, returning leased messages");
        for id in granted {
            state.rollback_grant(id);
        }
    }
}

use super::*;

impl Scheduler {
    /// Apply the retry policy to a message whose lease has been released.
    /// Returns None if the message no longer exists.
    pub(super) fn handle_delivery_failure(
        &mut self,
        queue: &str,
        message_id: Uuid,
        error: &str,
        now: u64,
    ) -> Option<FailureOutcome> {
        let state = self.queues.get_mut(queue)?;
        let msg = state.message_mut(&message_id)?;
        msg.set_attribute(LAST_ERROR_ATTRIBUTE, error);
        let receive_count = msg.receive_count;
        let max_receive_count = self.retry.max_receive_count(&state.config);

        match self.retry.decide(receive_count, max_receive_count) {
            FailureDecision::Reschedule { delay_ms } => {
                Some(self.reschedule(queue, message_id, delay_ms, now))
            }
            FailureDecision::DeadLetter => match self.resolve_dead_letter_queue(queue, now) {
                Some(dlq) => self.dead_letter(queue, &dlq, message_id, now),
                None => {
                    warn!(
                        %queue,
                        %message_id,
                        receive_count,
                        "no dead-letter queue available, retaining message"
                    );
                    let config = self.retry.config();
                    let delay_ms = compute_delay(config.strategy, receive_count, config);
                    Some(self.reschedule(queue, message_id, delay_ms, now))
                }
            },
        }
    }

    fn reschedule(&mut self, queue: &str, message_id: Uuid, delay_ms: u64, now: u64) -> FailureOutcome {
        let available_at = now.saturating_add(delay_ms);
        if let Some(state) = self.queues.get_mut(queue) {
            state.requeue(message_id, available_at);
        }
        self.metrics.record_redelivery(queue);
        self.events
            .message_state(queue, message_id, MessageStatus::Buffered, now);
        debug!(%queue, %message_id, delay_ms, "message rescheduled");
        FailureOutcome::Rescheduled { available_at }
    }

    /// Name of an existing (or freshly auto-created) dead-letter queue for
    /// `queue`, or None if dead letters cannot be routed anywhere.
    fn resolve_dead_letter_queue(&mut self, queue: &str, now: u64) -> Option<String> {
        let target = self.queues.get(queue)?.config.dead_letter_target()?;
        if target == queue {
            return None;
        }
        if self.queues.contains_key(&target) {
            return Some(target);
        }

        let dlq_config = &self.retry.config().dlq;
        if !dlq_config.auto_create {
            return None;
        }
        let config = self
            .queue_defaults
            .standard_queue(&target, dlq_config.retention_period_secs);
        if let Err(e) = config.validate() {
            warn!(queue = %target, error = %e, "cannot auto-create dead-letter queue");
            return None;
        }
        info!(queue = %target, origin = %queue, "auto-creating dead-letter queue");
        self.insert_queue(config, now);
        Some(target)
    }

    fn dead_letter(&mut self, origin: &str, dlq: &str, message_id: Uuid, now: u64) -> Option<FailureOutcome> {
        if !self.queues.contains_key(dlq) {
            return None;
        }
        let origin_state = self.queues.get_mut(origin)?;
        let mut msg = origin_state.remove(&message_id)?;
        origin_state.counters.dead_lettered += 1;
        let receive_count = msg.receive_count;

        msg.set_attribute(ORIGINAL_QUEUE_ATTRIBUTE, origin);
        msg.receive_count = 0;
        msg.first_received_at = None;
        msg.last_receipt = None;
        msg.enqueued_at = now;
        msg.available_at = now;

        let Some(dlq_state) = self.queues.get_mut(dlq) else {
            error!(%origin, %dlq, %message_id, "dead-letter queue vanished during routing");
            return None;
        };
        dlq_state.enqueue(msg);
        dlq_state.counters.published += 1;

        self.metrics.record_dead_letter(origin);
        self.events
            .message_state(origin, message_id, MessageStatus::DeadLettered, now);
        self.events
            .message_state(dlq, message_id, MessageStatus::Buffered, now);
        warn!(%origin, %dlq, %message_id, receive_count, "message dead-lettered");

        Some(FailureOutcome::DeadLettered {
            dlq: dlq.to_string(),
        })
    }
}

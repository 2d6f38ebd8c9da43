use super::*;

use crate::queue::{MAX_BATCH_SIZE, MAX_DELAY_SECS, MAX_PRIORITY, MAX_VISIBILITY_TIMEOUT_SECS, MIN_PRIORITY};

fn validate_draft(draft: &MessageDraft, max_message_size: usize) -> Result<(), PublishError> {
    let size = draft.body.size();
    if size > max_message_size {
        return Err(PublishError::MessageTooLarge {
            size,
            limit: max_message_size,
        });
    }
    if let Some(priority) = draft.priority {
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
            return Err(PublishError::InvalidPriority(priority));
        }
    }
    if draft.delay_secs > MAX_DELAY_SECS {
        return Err(PublishError::InvalidDelay {
            requested_secs: draft.delay_secs,
            max_secs: MAX_DELAY_SECS,
        });
    }
    Ok(())
}

impl Scheduler {
    pub(super) fn handle_publish(
        &mut self,
        queue: &str,
        draft: MessageDraft,
        now: u64,
    ) -> Result<PublishReceipt, PublishError> {
        let state = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| PublishError::QueueNotFound(queue.to_string()))?;
        if state.paused {
            return Err(PublishError::QueuePaused(queue.to_string()));
        }
        validate_draft(&draft, state.config.max_message_size)?;

        let message = Message {
            id: Message::new_id(),
            queue: queue.to_string(),
            body: draft.body,
            attributes: draft.attributes,
            priority: draft.priority.unwrap_or(Message::DEFAULT_PRIORITY),
            group_id: draft.group_id,
            seq: 0,
            enqueued_at: now,
            available_at: now.saturating_add(draft.delay_secs.saturating_mul(1000)),
            receive_count: 0,
            first_received_at: None,
            status: MessageStatus::Buffered,
            last_receipt: None,
        };
        let message_id = state.enqueue(message);
        state.counters.published += 1;

        self.metrics.record_publish(queue);
        self.events
            .message_state(queue, message_id, MessageStatus::Buffered, now);
        debug!(%queue, %message_id, "message published");

        Ok(PublishReceipt {
            message_id,
            timestamp: now,
        })
    }

    /// Entries are published independently; a failed entry does not stop
    /// the rest.
    pub(super) fn handle_publish_batch(
        &mut self,
        queue: &str,
        drafts: Vec<MessageDraft>,
        now: u64,
    ) -> Result<BatchResult, PublishError> {
        if drafts.is_empty() || drafts.len() > MAX_BATCH_SIZE {
            return Err(PublishError::InvalidBatchSize {
                len: drafts.len(),
                max: MAX_BATCH_SIZE,
            });
        }
        if !self.queues.contains_key(queue) {
            return Err(PublishError::QueueNotFound(queue.to_string()));
        }
        Ok(drafts
            .into_iter()
            .map(|draft| self.handle_publish(queue, draft, now))
            .collect())
    }

    pub(super) fn handle_ack(
        &mut self,
        queue: &str,
        receipt: &ReceiptHandle,
        now: u64,
    ) -> Result<(), AckError> {
        let state = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| AckError::QueueNotFound(queue.to_string()))?;
        state.check_lease(receipt, now).map_err(|check| match check {
            LeaseCheck::MessageNotFound => AckError::MessageNotFound(receipt.message_id.to_string()),
            LeaseCheck::LeaseExpired => AckError::LeaseExpired(receipt.to_string()),
        })?;

        let message_id = receipt.message_id;
        state.remove(&message_id);
        state.counters.acknowledged += 1;

        self.metrics.record_ack(queue);
        self.events
            .message_state(queue, message_id, MessageStatus::Acknowledged, now);
        debug!(%queue, %message_id, "message acknowledged");
        Ok(())
    }

    pub(super) fn handle_nack(
        &mut self,
        queue: &str,
        receipt: &ReceiptHandle,
        error: &str,
        now: u64,
    ) -> Result<FailureOutcome, NackError> {
        let state = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| NackError::QueueNotFound(queue.to_string()))?;
        state.check_lease(receipt, now).map_err(|check| match check {
            LeaseCheck::MessageNotFound => NackError::MessageNotFound(receipt.message_id.to_string()),
            LeaseCheck::LeaseExpired => NackError::LeaseExpired(receipt.to_string()),
        })?;
        state.release_lease(&receipt.message_id);
        self.metrics.record_nack(queue);

        self.handle_delivery_failure(queue, receipt.message_id, error, now)
            .ok_or_else(|| NackError::MessageNotFound(receipt.message_id.to_string()))
    }

    pub(super) fn handle_change_visibility(
        &mut self,
        queue: &str,
        receipt: &ReceiptHandle,
        timeout_secs: u64,
        now: u64,
    ) -> Result<(), VisibilityError> {
        if timeout_secs > MAX_VISIBILITY_TIMEOUT_SECS {
            return Err(VisibilityError::InvalidVisibilityTimeout {
                requested_secs: timeout_secs,
                max_secs: MAX_VISIBILITY_TIMEOUT_SECS,
            });
        }
        let state = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| VisibilityError::QueueNotFound(queue.to_string()))?;
        state.check_lease(receipt, now).map_err(|check| match check {
            LeaseCheck::MessageNotFound => {
                VisibilityError::MessageNotFound(receipt.message_id.to_string())
            }
            LeaseCheck::LeaseExpired => VisibilityError::LeaseExpired(receipt.to_string()),
        })?;

        let visible_at = now.saturating_add(timeout_secs.saturating_mul(1000));
        state.extend_lease(&receipt.message_id, visible_at);
        debug!(%queue, message_id = %receipt.message_id, visible_at, "visibility changed");
        Ok(())
    }

    /// The handle must belong to the message's most recent delivery. The
    /// lease itself may have lapsed.
    pub(super) fn handle_get_attributes(
        &self,
        queue: &str,
        receipt: &ReceiptHandle,
    ) -> Result<MessageAttributes, AttributesError> {
        let state = self
            .queues
            .get(queue)
            .ok_or_else(|| AttributesError::QueueNotFound(queue.to_string()))?;
        let msg = state
            .message(&receipt.message_id)
            .ok_or_else(|| AttributesError::MessageNotFound(receipt.message_id.to_string()))?;
        if msg.last_receipt.as_ref() != Some(receipt) {
            return Err(AttributesError::LeaseExpired(receipt.to_string()));
        }
        Ok(MessageAttributes {
            message_id: msg.id,
            attributes: msg.attributes.clone(),
            receive_count: msg.receive_count,
            first_received_at: msg.first_received_at,
            enqueued_at: msg.enqueued_at,
        })
    }
}

use super::*;

impl Scheduler {
    pub(super) fn handle_create_queue(
        &mut self,
        config: QueueConfig,
        now: u64,
    ) -> Result<QueueInfo, CreateQueueError> {
        config.validate().map_err(CreateQueueError::InvalidConfig)?;
        if self.queues.contains_key(&config.name) {
            return Err(CreateQueueError::QueueAlreadyExists(config.name));
        }
        Ok(self.insert_queue(config, now))
    }

    /// Register a validated queue. Callers check for name collisions.
    pub(super) fn insert_queue(&mut self, config: QueueConfig, now: u64) -> QueueInfo {
        let name = config.name.clone();
        let state = QueueState::new(config, now);
        let info = state.info();
        self.queues.insert(name.clone(), state);
        self.events.queue_changed(&name, QueueChange::Created, now);
        info!(queue = %name, kind = ?info.config.kind, "queue created");
        info
    }

    pub(super) fn handle_get_queue(&self, queue: &str) -> Result<QueueInfo, QueueError> {
        self.queues
            .get(queue)
            .map(QueueState::info)
            .ok_or_else(|| QueueError::QueueNotFound(queue.to_string()))
    }

    /// All queues, sorted by name.
    pub(super) fn handle_list_queues(&self) -> Vec<QueueInfo> {
        let mut queues: Vec<QueueInfo> = self.queues.values().map(QueueState::info).collect();
        queues.sort_by(|a, b| a.config.name.cmp(&b.config.name));
        queues
    }

    pub(super) fn handle_update_queue(
        &mut self,
        queue: &str,
        update: QueueUpdate,
        now: u64,
    ) -> Result<QueueInfo, QueueError> {
        let state = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| QueueError::QueueNotFound(queue.to_string()))?;
        state.config = update
            .apply_to(&state.config)
            .map_err(QueueError::InvalidConfig)?;
        state.updated_at = now;
        let info = state.info();
        self.events.queue_changed(queue, QueueChange::Updated, now);
        Ok(info)
    }

    /// Delete a queue together with its buffered and in-flight messages.
    /// Parked receives on it are answered with `QueueNotFound` on the next
    /// waiter pass.
    pub(super) fn handle_delete_queue(&mut self, queue: &str, now: u64) -> Result<(), QueueError> {
        let mut state = self
            .queues
            .remove(queue)
            .ok_or_else(|| QueueError::QueueNotFound(queue.to_string()))?;
        let dropped = state.drain();
        for msg in &dropped {
            self.events
                .message_state(queue, msg.id, MessageStatus::Discarded, now);
        }
        self.metrics.set_queue_depth(queue, 0);
        self.metrics.set_leases_active(queue, 0);
        self.events.queue_changed(queue, QueueChange::Deleted, now);
        info!(%queue, dropped = dropped.len(), "queue deleted");
        Ok(())
    }

    pub(super) fn handle_purge_queue(&mut self, queue: &str, now: u64) -> Result<u64, QueueError> {
        let state = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| QueueError::QueueNotFound(queue.to_string()))?;
        let dropped = state.drain();
        state.updated_at = now;
        for msg in &dropped {
            self.events
                .message_state(queue, msg.id, MessageStatus::Discarded, now);
        }
        self.events.queue_changed(queue, QueueChange::Purged, now);
        info!(%queue, dropped = dropped.len(), "queue purged");
        Ok(dropped.len() as u64)
    }

    /// Paused queues reject publishes. Receives and acks keep working so
    /// the queue can drain.
    pub(super) fn handle_set_paused(
        &mut self,
        queue: &str,
        paused: bool,
        now: u64,
    ) -> Result<(), QueueError> {
        let state = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| QueueError::QueueNotFound(queue.to_string()))?;
        if state.paused == paused {
            return Ok(());
        }
        state.paused = paused;
        state.updated_at = now;
        let change = if paused {
            QueueChange::Paused
        } else {
            QueueChange::Resumed
        };
        self.events.queue_changed(queue, change, now);
        info!(%queue, paused, "queue pause state changed");
        Ok(())
    }

    pub(super) fn handle_get_stats(&self, queue: &str) -> Result<QueueStats, QueueError> {
        self.queues
            .get(queue)
            .map(QueueState::stats)
            .ok_or_else(|| QueueError::QueueNotFound(queue.to_string()))
    }
}

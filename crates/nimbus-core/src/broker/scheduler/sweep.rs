use super::*;

impl Scheduler {
    /// Periodic maintenance: reclaim lapsed leases, drop messages past
    /// retention, then serve any receives that can now be satisfied.
    pub(crate) fn sweep(&mut self, now: u64) {
        let reclaimed = self.reclaim_expired_leases(now);
        let discarded = self.discard_past_retention(now);
        if reclaimed > 0 || discarded > 0 {
            debug!(reclaimed, discarded, "sweep completed");
        }
        self.serve_waiters(now);
        self.next_sweep_at = now.saturating_add(self.sweep_interval_ms);
    }

    pub(super) fn reclaim_expired_leases(&mut self, now: u64) -> usize {
        let names: Vec<String> = self.queues.keys().cloned().collect();
        names
            .iter()
            .map(|queue| self.reclaim_queue(queue, now))
            .sum()
    }

    /// Release every lapsed lease in `queue` and hand the message to the
    /// retry policy. `receive_count` is left alone: it already counted the
    /// delivery that timed out.
    pub(super) fn reclaim_queue(&mut self, queue: &str, now: u64) -> usize {
        let expired = match self.queues.get(queue) {
            Some(state) => state.expired_leases(now),
            None => return 0,
        };
        for message_id in &expired {
            let held_ms = self
                .queues
                .get_mut(queue)
                .and_then(|state| state.release_lease(message_id))
                .map_or(0, |lease| now.saturating_sub(lease.leased_at));
            debug!(%queue, %message_id, held_ms, "lease expired, reclaiming");
            self.handle_delivery_failure(queue, *message_id, VISIBILITY_EXPIRED, now);
        }
        expired.len()
    }

    pub(super) fn discard_past_retention(&mut self, now: u64) -> usize {
        let mut total = 0;
        for (queue, state) in self.queues.iter_mut() {
            let stale = state.past_retention(now);
            if stale.is_empty() {
                continue;
            }
            for message_id in &stale {
                state.remove(message_id);
                self.events
                    .message_state(queue, *message_id, MessageStatus::Discarded, now);
            }
            let count = stale.len() as u64;
            state.counters.expired += count;
            self.metrics.record_expired(queue, count);
            info!(%queue, count, "discarded messages past retention");
            total += stale.len();
        }
        total
    }
}

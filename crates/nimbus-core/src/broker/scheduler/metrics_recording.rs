use super::*;

impl Scheduler {
    /// Record depth and lease gauges for every queue, idle ones included,
    /// so gauges fall back to zero once a queue drains.
    pub(super) fn record_gauges(&self) {
        for (queue, state) in &self.queues {
            self.metrics.set_queue_depth(queue, state.depth());
            self.metrics.set_leases_active(queue, state.in_flight());
        }
    }
}

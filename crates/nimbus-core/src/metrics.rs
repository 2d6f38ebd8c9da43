use opentelemetry::metrics::{Counter, Gauge, Meter};
use opentelemetry::KeyValue;

/// OTel instruments for the broker and the worker pool. Instruments built
/// from the global meter are no-ops until a meter provider is installed.
#[derive(Clone)]
pub struct Metrics {
    pub messages_published: Counter<u64>,
    pub messages_leased: Counter<u64>,
    pub messages_acked: Counter<u64>,
    pub messages_nacked: Counter<u64>,
    pub messages_redelivered: Counter<u64>,
    pub messages_dead_lettered: Counter<u64>,
    pub messages_expired: Counter<u64>,
    pub queue_depth: Gauge<u64>,
    pub leases_active: Gauge<u64>,
    pub workers_demoted: Counter<u64>,
    pub workers_scaled: Counter<u64>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let meter = opentelemetry::global::meter("nimbus");
        Self::from_meter(&meter)
    }

    /// Create metrics from a specific meter (used in tests with the in-memory exporter).
    pub fn from_meter(meter: &Meter) -> Self {
        Self {
            messages_published: meter
                .u64_counter("nimbus.messages.published")
                .with_description("Messages accepted by publish")
                .build(),
            messages_leased: meter
                .u64_counter("nimbus.messages.leased")
                .with_description("Leases granted to consumers")
                .build(),
            messages_acked: meter
                .u64_counter("nimbus.messages.acked")
                .with_description("Messages acknowledged")
                .build(),
            messages_nacked: meter
                .u64_counter("nimbus.messages.nacked")
                .with_description("Explicit delivery failures reported by consumers")
                .build(),
            messages_redelivered: meter
                .u64_counter("nimbus.messages.redelivered")
                .with_description("Messages rescheduled by the retry policy")
                .build(),
            messages_dead_lettered: meter
                .u64_counter("nimbus.messages.dead_lettered")
                .with_description("Messages moved to a dead-letter queue")
                .build(),
            messages_expired: meter
                .u64_counter("nimbus.messages.expired")
                .with_description("Messages discarded by the retention sweep")
                .build(),
            queue_depth: meter
                .u64_gauge("nimbus.queue.depth")
                .with_description("Buffered messages per queue")
                .build(),
            leases_active: meter
                .u64_gauge("nimbus.leases.active")
                .with_description("In-flight leases per queue")
                .build(),
            workers_demoted: meter
                .u64_counter("nimbus.workers.demoted")
                .with_description("Workers marked inactive after missed heartbeats")
                .build(),
            workers_scaled: meter
                .u64_counter("nimbus.workers.scaled")
                .with_description("Workers added or removed by scaling")
                .build(),
        }
    }

    pub fn record_publish(&self, queue: &str) {
        self.messages_published.add(1, &queue_label(queue));
    }

    pub fn record_lease(&self, queue: &str) {
        self.messages_leased.add(1, &queue_label(queue));
    }

    pub fn record_ack(&self, queue: &str) {
        self.messages_acked.add(1, &queue_label(queue));
    }

    pub fn record_nack(&self, queue: &str) {
        self.messages_nacked.add(1, &queue_label(queue));
    }

    pub fn record_redelivery(&self, queue: &str) {
        self.messages_redelivered.add(1, &queue_label(queue));
    }

    pub fn record_dead_letter(&self, queue: &str) {
        self.messages_dead_lettered.add(1, &queue_label(queue));
    }

    pub fn record_expired(&self, queue: &str, count: u64) {
        self.messages_expired.add(count, &queue_label(queue));
    }

    pub fn set_queue_depth(&self, queue: &str, depth: u64) {
        self.queue_depth.record(depth, &queue_label(queue));
    }

    pub fn set_leases_active(&self, queue: &str, count: u64) {
        self.leases_active.record(count, &queue_label(queue));
    }

    pub fn record_worker_demoted(&self) {
        self.workers_demoted.add(1, &[]);
    }

    pub fn record_workers_scaled(&self, queue: &str, direction: &'static str, count: u64) {
        if count == 0 {
            return;
        }
        self.workers_scaled.add(
            count,
            &[
                KeyValue::new("queue", queue.to_string()),
                KeyValue::new("direction", direction),
            ],
        );
    }
}

fn queue_label(queue: &str) -> [KeyValue; 1] {
    [KeyValue::new("queue", queue.to_string())]
}

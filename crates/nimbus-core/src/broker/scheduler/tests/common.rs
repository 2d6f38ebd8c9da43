use super::*;

/// Fixed clock origin for tests that drive `handle_command` directly.
pub(super) const T0: u64 = 1_000_000_000;

pub(super) fn test_config() -> BrokerConfig {
    BrokerConfig {
        scheduler: SchedulerConfig {
            command_channel_capacity: 256,
            idle_timeout_ms: 10,
            sweep_interval_ms: 10,
            event_channel_capacity: 1024,
        },
        retry: RetryConfig {
            strategy: RetryStrategy::Fixed,
            fixed: FixedBackoff { delay_ms: 0 },
            ..Default::default()
        },
        ..Default::default()
    }
}

pub(super) fn test_setup() -> (
    crossbeam_channel::Sender<SchedulerCommand>,
    Scheduler,
    crossbeam_channel::Receiver<BrokerEvent>,
) {
    test_setup_with(test_config(), Metrics::new())
}

pub(super) fn test_setup_with(
    config: BrokerConfig,
    metrics: Metrics,
) -> (
    crossbeam_channel::Sender<SchedulerCommand>,
    Scheduler,
    crossbeam_channel::Receiver<BrokerEvent>,
) {
    let (tx, rx) = crossbeam_channel::bounded(config.scheduler.command_channel_capacity);
    let (ev_tx, ev_rx) = crossbeam_channel::bounded(config.scheduler.event_channel_capacity);
    let scheduler = Scheduler::new(rx, &config, EventSink::new(ev_tx), metrics);
    (tx, scheduler, ev_rx)
}

/// Run one command through the scheduler at `now` and take its reply.
pub(super) fn call<T>(
    scheduler: &mut Scheduler,
    now: u64,
    make: impl FnOnce(oneshot::Sender<T>) -> SchedulerCommand,
) -> T {
    let (reply_tx, mut reply_rx) = oneshot::channel();
    scheduler.handle_command(make(reply_tx), now);
    reply_rx.try_recv().expect("scheduler did not reply")
}

pub(super) fn create_queue(scheduler: &mut Scheduler, config: QueueConfig) -> QueueInfo {
    call(scheduler, T0, |reply| SchedulerCommand::CreateQueue { config, reply })
        .expect("create queue")
}

pub(super) fn create_queue_with(
    scheduler: &mut Scheduler,
    name: &str,
    kind: QueueKind,
    visibility_timeout_secs: u64,
) -> QueueInfo {
    let mut config = QueueConfig::new(name).with_kind(kind);
    config.visibility_timeout_secs = visibility_timeout_secs;
    create_queue(scheduler, config)
}

pub(super) fn publish(
    scheduler: &mut Scheduler,
    queue: &str,
    draft: MessageDraft,
    now: u64,
) -> Result<PublishReceipt, PublishError> {
    call(scheduler, now, |reply| SchedulerCommand::Publish {
        queue: queue.to_string(),
        draft,
        reply,
    })
}

pub(super) fn publish_text(scheduler: &mut Scheduler, queue: &str, body: &str, now: u64) -> Uuid {
    publish(scheduler, queue, MessageDraft::new(body), now)
        .expect("publish")
        .message_id
}

/// Receive that must answer immediately (no long poll).
pub(super) fn receive(
    scheduler: &mut Scheduler,
    request: ReceiveRequest,
    now: u64,
) -> Result<Vec<ReceivedMessage>, ReceiveError> {
    call(scheduler, now, |reply| SchedulerCommand::Receive { request, reply })
}

pub(super) fn receive_one(scheduler: &mut Scheduler, queue: &str, now: u64) -> ReceivedMessage {
    let mut messages = receive(scheduler, ReceiveRequest::new(queue), now).expect("receive");
    assert_eq!(messages.len(), 1, "expected exactly one message");
    messages.remove(0)
}

/// Receive that may park. The returned receiver resolves once the
/// scheduler answers.
pub(super) fn receive_parked(
    scheduler: &mut Scheduler,
    request: ReceiveRequest,
    now: u64,
) -> oneshot::Receiver<Result<Vec<ReceivedMessage>, ReceiveError>> {
    let (reply, rx) = oneshot::channel();
    scheduler.handle_command(SchedulerCommand::Receive { request, reply }, now);
    rx
}

pub(super) fn ack(
    scheduler: &mut Scheduler,
    queue: &str,
    receipt: ReceiptHandle,
    now: u64,
) -> Result<(), AckError> {
    call(scheduler, now, |reply| SchedulerCommand::Ack {
        queue: queue.to_string(),
        receipt,
        reply,
    })
}

pub(super) fn nack(
    scheduler: &mut Scheduler,
    queue: &str,
    receipt: ReceiptHandle,
    error: &str,
    now: u64,
) -> Result<FailureOutcome, NackError> {
    call(scheduler, now, |reply| SchedulerCommand::Nack {
        queue: queue.to_string(),
        receipt,
        error: error.to_string(),
        reply,
    })
}

pub(super) fn change_visibility(
    scheduler: &mut Scheduler,
    queue: &str,
    receipt: ReceiptHandle,
    timeout_secs: u64,
    now: u64,
) -> Result<(), VisibilityError> {
    call(scheduler, now, |reply| SchedulerCommand::ChangeVisibility {
        queue: queue.to_string(),
        receipt,
        timeout_secs,
        reply,
    })
}

pub(super) fn get_attributes(
    scheduler: &mut Scheduler,
    queue: &str,
    receipt: ReceiptHandle,
) -> Result<MessageAttributes, AttributesError> {
    call(scheduler, T0, |reply| SchedulerCommand::GetAttributes {
        queue: queue.to_string(),
        receipt,
        reply,
    })
}

pub(super) fn stats(scheduler: &mut Scheduler, queue: &str) -> QueueStats {
    call(scheduler, T0, |reply| SchedulerCommand::GetStats {
        queue: queue.to_string(),
        reply,
    })
    .expect("stats")
}

pub(super) fn text(msg: &ReceivedMessage) -> &str {
    match &msg.body {
        crate::message::MessageBody::Text(s) => s,
        other => panic!("expected text body, got {other:?}"),
    }
}

/// Drain every event emitted so far.
pub(super) fn drain_events(events: &crossbeam_channel::Receiver<BrokerEvent>) -> Vec<BrokerEvent> {
    events.try_iter().collect()
}

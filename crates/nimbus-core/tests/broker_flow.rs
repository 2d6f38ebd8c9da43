use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use nimbus_core::broker::SchedulerConfig;
use nimbus_core::error::{AckError, PublishError};
use nimbus_core::message::{AttributeValue, MessageStatus, ORIGINAL_QUEUE_ATTRIBUTE};
use nimbus_core::notify::QueueChange;
use nimbus_core::retry::FixedBackoff;
use nimbus_core::{
    Broker, BrokerConfig, FailureOutcome, MessageBody, MessageDraft, PersistenceNotifier, QueueConfig,
    QueueKind, ReceiptHandle, ReceiveRequest, RetryConfig, RetryStrategy,
};
use uuid::Uuid;

fn config() -> BrokerConfig {
    BrokerConfig {
        scheduler: SchedulerConfig {
            command_channel_capacity: 1_000,
            idle_timeout_ms: 10,
            sweep_interval_ms: 10,
            event_channel_capacity: 1_000,
        },
        retry: RetryConfig {
            strategy: RetryStrategy::Fixed,
            fixed: FixedBackoff { delay_ms: 0 },
            ..Default::default()
        },
        ..Default::default()
    }
}

async fn broker_with_queue(queue: QueueConfig) -> Broker {
    let broker = Broker::new(config()).unwrap();
    broker.create_queue(queue).await.unwrap();
    broker
}

#[tokio::test]
async fn publish_receive_ack_round_trip() {
    let broker = broker_with_queue(QueueConfig::new("orders")).await;

    let receipt = broker
        .publish("orders", MessageDraft::new("hello").with_attribute("tenant", "acme"))
        .await
        .unwrap();
    let messages = broker.receive(ReceiveRequest::new("orders")).await.unwrap();
    assert_eq!(messages.len(), 1);
    let msg = &messages[0];
    assert_eq!(msg.message_id, receipt.message_id);
    assert_eq!(msg.attributes.get("tenant"), Some(&AttributeValue::from("acme")));

    // Handles survive a trip through their string form.
    let handle: ReceiptHandle = msg.receipt_handle.to_string().parse().unwrap();
    let attrs = broker.get_attributes("orders", &handle).await.unwrap();
    assert_eq!(attrs.receive_count, 1);

    broker.ack("orders", &handle).await.unwrap();
    assert!(matches!(
        broker.ack("orders", &handle).await,
        Err(AckError::MessageNotFound(_))
    ));

    let stats = broker.stats("orders").await.unwrap();
    assert_eq!((stats.depth, stats.in_flight, stats.acknowledged), (0, 0, 1));
    broker.shutdown().unwrap();
}

#[tokio::test]
async fn priority_queue_delivers_highest_first() {
    let broker = broker_with_queue(QueueConfig::new("jobs").with_kind(QueueKind::Priority)).await;
    for (body, priority) in [("low", 2), ("urgent", 10), ("normal", 5)] {
        broker
            .publish("jobs", MessageDraft::new(body).with_priority(priority))
            .await
            .unwrap();
    }

    let messages = broker
        .receive(ReceiveRequest::new("jobs").max_messages(3))
        .await
        .unwrap();
    let order: Vec<MessageBody> = messages.iter().map(|m| m.body.clone()).collect();
    assert_eq!(
        order,
        vec![
            MessageBody::from("urgent"),
            MessageBody::from("normal"),
            MessageBody::from("low"),
        ]
    );
    broker.shutdown().unwrap();
}

#[tokio::test]
async fn batch_publish_reports_per_entry_results() {
    let broker = broker_with_queue(QueueConfig::new("orders")).await;
    let results = broker
        .publish_batch(
            "orders",
            vec![MessageDraft::new("ok"), MessageDraft::new("bad").with_delay_secs(10_000)],
        )
        .await
        .unwrap();
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(PublishError::InvalidDelay { .. })));

    broker.pause_queue("orders").await.unwrap();
    assert!(matches!(
        broker.publish("orders", MessageDraft::new("x")).await,
        Err(PublishError::QueuePaused(_))
    ));
    broker.resume_queue("orders").await.unwrap();
    broker.publish("orders", MessageDraft::new("x")).await.unwrap();
    assert_eq!(broker.purge_queue("orders").await.unwrap(), 2);
    broker.shutdown().unwrap();
}

#[tokio::test]
async fn message_is_dead_lettered_after_three_expired_leases() {
    let broker = broker_with_queue(QueueConfig::new("orders")).await;
    let id = broker
        .publish("orders", MessageDraft::new("poison"))
        .await
        .unwrap()
        .message_id;

    // A zero visibility timeout makes every lease lapse at once; each
    // receive reclaims the previous one first.
    let zero_visibility = || ReceiveRequest::new("orders").visibility_timeout_secs(0);
    for attempt in 1..=3 {
        let messages = broker.receive(zero_visibility()).await.unwrap();
        assert_eq!(messages.len(), 1, "attempt {attempt}");
        assert_eq!(messages[0].receive_count, attempt);
    }
    assert!(broker.receive(zero_visibility()).await.unwrap().is_empty());

    let dead = broker.receive(ReceiveRequest::new("orders-dlq")).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].message_id, id);
    assert_eq!(dead[0].receive_count, 1);
    assert_eq!(
        dead[0].attributes.get(ORIGINAL_QUEUE_ATTRIBUTE),
        Some(&AttributeValue::from("orders"))
    );
    assert_eq!(broker.stats("orders").await.unwrap().dead_lettered, 1);
    broker.shutdown().unwrap();
}

#[tokio::test]
async fn nack_reports_outcome() {
    let mut queue = QueueConfig::new("orders");
    queue.max_receive_count = Some(2);
    let broker = broker_with_queue(queue).await;
    broker.publish("orders", MessageDraft::new("x")).await.unwrap();

    let first = broker.receive(ReceiveRequest::new("orders")).await.unwrap();
    let outcome = broker
        .nack("orders", &first[0].receipt_handle, "downstream timeout")
        .await
        .unwrap();
    assert!(matches!(outcome, FailureOutcome::Rescheduled { .. }));

    let second = broker.receive(ReceiveRequest::new("orders")).await.unwrap();
    let outcome = broker
        .nack("orders", &second[0].receipt_handle, "downstream timeout")
        .await
        .unwrap();
    assert_eq!(
        outcome,
        FailureOutcome::DeadLettered {
            dlq: "orders-dlq".to_string()
        }
    );
    broker.shutdown().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_receivers_never_share_a_message() {
    let broker = Arc::new(broker_with_queue(QueueConfig::new("orders")).await);
    for i in 0..100 {
        broker
            .publish("orders", MessageDraft::new(format!("m{i}")))
            .await
            .unwrap();
    }

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let broker = Arc::clone(&broker);
        tasks.push(tokio::spawn(async move {
            let mut seen = Vec::new();
            loop {
                let batch = broker
                    .receive(ReceiveRequest::new("orders").max_messages(3))
                    .await
                    .unwrap();
                if batch.is_empty() {
                    break;
                }
                seen.extend(batch.into_iter().map(|m| m.message_id));
            }
            seen
        }));
    }

    let mut all: Vec<Uuid> = Vec::new();
    for task in tasks {
        all.extend(task.await.unwrap());
    }
    let unique: HashSet<Uuid> = all.iter().copied().collect();
    assert_eq!(all.len(), 100);
    assert_eq!(unique.len(), 100);
    assert_eq!(broker.stats("orders").await.unwrap().in_flight, 100);
}

#[tokio::test]
async fn long_poll_wakes_on_publish() {
    let broker = Arc::new(broker_with_queue(QueueConfig::new("orders")).await);

    let waiting = {
        let broker = Arc::clone(&broker);
        tokio::spawn(async move {
            let started = Instant::now();
            let messages = broker
                .receive(ReceiveRequest::new("orders").wait_secs(10))
                .await
                .unwrap();
            (messages, started.elapsed())
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    broker.publish("orders", MessageDraft::new("late")).await.unwrap();

    let (messages, elapsed) = waiting.await.unwrap();
    assert_eq!(messages.len(), 1);
    assert!(elapsed < Duration::from_secs(5), "waited {elapsed:?}");
}

#[tokio::test]
async fn long_poll_returns_empty_after_wait() {
    let broker = broker_with_queue(QueueConfig::new("orders")).await;
    let started = Instant::now();
    let messages = broker
        .receive(ReceiveRequest::new("orders").wait_secs(1))
        .await
        .unwrap();
    assert!(messages.is_empty());
    assert!(started.elapsed() >= Duration::from_millis(900));
    broker.shutdown().unwrap();
}

#[tokio::test]
async fn cancelled_long_poll_leaks_no_lease() {
    let broker = broker_with_queue(QueueConfig::new("orders")).await;

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        broker.receive(ReceiveRequest::new("orders").wait_secs(10)),
    )
    .await;
    assert!(abandoned.is_err());

    broker.publish("orders", MessageDraft::new("x")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let messages = broker.receive(ReceiveRequest::new("orders")).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].receive_count, 1);
    broker.shutdown().unwrap();
}

#[derive(Default)]
struct Recorder {
    messages: Mutex<Vec<(Uuid, MessageStatus)>>,
    queues: Mutex<Vec<(String, QueueChange)>>,
}

impl PersistenceNotifier for Recorder {
    fn on_message_state_changed(&self, _queue: &str, message_id: Uuid, status: MessageStatus, _at: u64) {
        self.messages.lock().unwrap().push((message_id, status));
    }

    fn on_queue_changed(&self, queue: &str, change: QueueChange, _at: u64) {
        self.queues.lock().unwrap().push((queue.to_string(), change));
    }
}

#[tokio::test]
async fn notifier_observes_state_changes() {
    let recorder = Arc::new(Recorder::default());
    let broker = Broker::with_notifier(config(), recorder.clone()).unwrap();
    broker.create_queue(QueueConfig::new("orders")).await.unwrap();

    let id = broker
        .publish("orders", MessageDraft::new("x"))
        .await
        .unwrap()
        .message_id;
    let messages = broker.receive(ReceiveRequest::new("orders")).await.unwrap();
    broker.ack("orders", &messages[0].receipt_handle).await.unwrap();
    broker.delete_queue("orders").await.unwrap();

    // Shutdown waits for the dispatcher to drain.
    broker.shutdown().unwrap();

    assert_eq!(
        *recorder.messages.lock().unwrap(),
        vec![
            (id, MessageStatus::Buffered),
            (id, MessageStatus::InFlight),
            (id, MessageStatus::Acknowledged),
        ]
    );
    assert_eq!(
        *recorder.queues.lock().unwrap(),
        vec![
            ("orders".to_string(), QueueChange::Created),
            ("orders".to_string(), QueueChange::Deleted),
        ]
    );
}

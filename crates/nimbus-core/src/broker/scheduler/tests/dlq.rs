use super::*;
use crate::message::{AttributeValue, LAST_ERROR_ATTRIBUTE, ORIGINAL_QUEUE_ATTRIBUTE};
use crate::retry::DeadLetterConfig;

/// Receive the single message in `queue` and let its lease lapse.
fn expire_once(scheduler: &mut Scheduler, queue: &str, now: u64) -> u64 {
    receive_one(scheduler, queue, now);
    let lapsed = now + 1_000;
    scheduler.sweep(lapsed);
    lapsed
}

#[test]
fn third_expiry_moves_message_to_auto_created_dlq() {
    let (_tx, mut scheduler, _events) = test_setup();
    create_queue_with(&mut scheduler, "orders", QueueKind::Standard, 1);
    let id = publish(
        &mut scheduler,
        "orders",
        MessageDraft::new("x").with_attribute("tenant", "acme"),
        T0,
    )
    .unwrap()
    .message_id;

    let mut now = T0;
    for _ in 0..2 {
        now = expire_once(&mut scheduler, "orders", now);
        assert!(!scheduler.queues.contains_key("orders-dlq"));
        assert!(scheduler.queues["orders"].message(&id).is_some());
    }
    now = expire_once(&mut scheduler, "orders", now);

    assert!(scheduler.queues["orders"].message(&id).is_none());
    let origin = stats(&mut scheduler, "orders");
    assert_eq!(origin.dead_lettered, 1);
    assert_eq!(origin.depth + origin.in_flight, 0);

    let dlq = &scheduler.queues["orders-dlq"];
    assert_eq!(dlq.config.kind, QueueKind::Standard);
    assert_eq!(
        dlq.config.retention_period_secs,
        DeadLetterConfig::default().retention_period_secs
    );
    let moved = dlq.message(&id).unwrap();
    assert_eq!(
        moved.attributes.get(ORIGINAL_QUEUE_ATTRIBUTE),
        Some(&AttributeValue::from("orders"))
    );
    assert_eq!(
        moved.attributes.get(LAST_ERROR_ATTRIBUTE),
        Some(&AttributeValue::from(VISIBILITY_EXPIRED))
    );
    assert_eq!(moved.attributes.get("tenant"), Some(&AttributeValue::from("acme")));
    assert_eq!(moved.receive_count, 0);
    assert_eq!(moved.first_received_at, None);
    assert_eq!(moved.enqueued_at, now);
    assert_eq!(stats(&mut scheduler, "orders-dlq").published, 1);

    // The copy is an ordinary message in its new queue.
    let received = receive_one(&mut scheduler, "orders-dlq", now);
    assert_eq!(received.message_id, id);
    assert_eq!(received.receive_count, 1);
}

#[test]
fn queue_max_receive_count_overrides_retry_limit() {
    let (_tx, mut scheduler, _events) = test_setup();
    let mut config = QueueConfig::new("orders");
    config.visibility_timeout_secs = 1;
    config.max_receive_count = Some(1);
    create_queue(&mut scheduler, config);
    let id = publish_text(&mut scheduler, "orders", "x", T0);

    expire_once(&mut scheduler, "orders", T0);
    assert!(scheduler.queues["orders-dlq"].message(&id).is_some());
}

#[test]
fn nack_on_final_receive_dead_letters_to_named_queue() {
    let (_tx, mut scheduler, _events) = test_setup();
    create_queue(&mut scheduler, QueueConfig::new("graveyard"));
    let mut config = QueueConfig::new("orders");
    config.max_receive_count = Some(2);
    config.dlq_name = Some("graveyard".to_string());
    create_queue(&mut scheduler, config);
    let id = publish_text(&mut scheduler, "orders", "x", T0);

    let first = receive_one(&mut scheduler, "orders", T0);
    assert!(matches!(
        nack(&mut scheduler, "orders", first.receipt_handle, "e1", T0).unwrap(),
        FailureOutcome::Rescheduled { .. }
    ));
    let second = receive_one(&mut scheduler, "orders", T0);
    assert_eq!(
        nack(&mut scheduler, "orders", second.receipt_handle, "e2", T0).unwrap(),
        FailureOutcome::DeadLettered {
            dlq: "graveyard".to_string()
        }
    );

    assert!(!scheduler.queues.contains_key("orders-dlq"));
    let moved = scheduler.queues["graveyard"].message(&id).unwrap();
    assert_eq!(
        moved.attributes.get(LAST_ERROR_ATTRIBUTE),
        Some(&AttributeValue::from("e2"))
    );
}

#[test]
fn message_is_retained_when_dlq_cannot_be_created() {
    let config = BrokerConfig {
        retry: RetryConfig {
            strategy: RetryStrategy::Fixed,
            fixed: FixedBackoff { delay_ms: 0 },
            dlq: DeadLetterConfig {
                auto_create: false,
                ..Default::default()
            },
            ..Default::default()
        },
        ..test_config()
    };
    let (_tx, mut scheduler, _events) = test_setup_with(config, Metrics::new());
    create_queue_with(&mut scheduler, "orders", QueueKind::Standard, 1);
    let id = publish_text(&mut scheduler, "orders", "x", T0);

    let mut now = T0;
    for _ in 0..4 {
        now = expire_once(&mut scheduler, "orders", now);
    }

    assert!(!scheduler.queues.contains_key("orders-dlq"));
    let kept = scheduler.queues["orders"].message(&id).unwrap();
    assert_eq!(kept.receive_count, 4);
    assert_eq!(stats(&mut scheduler, "orders").dead_lettered, 0);
}

#[test]
fn dead_letter_queue_does_not_chain() {
    let (_tx, mut scheduler, _events) = test_setup();
    create_queue_with(&mut scheduler, "orders-dlq", QueueKind::Standard, 1);
    let id = publish_text(&mut scheduler, "orders-dlq", "x", T0);

    let mut now = T0;
    for _ in 0..3 {
        now = expire_once(&mut scheduler, "orders-dlq", now);
    }

    assert!(!scheduler.queues.contains_key("orders-dlq-dlq"));
    assert!(scheduler.queues["orders-dlq"].message(&id).is_some());
}

#[test]
fn dead_lettering_emits_events_for_both_queues() {
    let (_tx, mut scheduler, events) = test_setup();
    create_queue(&mut scheduler, QueueConfig::new("dlq"));
    let mut config = QueueConfig::new("orders");
    config.max_receive_count = Some(1);
    config.dlq_name = Some("dlq".to_string());
    create_queue(&mut scheduler, config);
    let id = publish_text(&mut scheduler, "orders", "x", T0);
    let msg = receive_one(&mut scheduler, "orders", T0);
    drain_events(&events);

    nack(&mut scheduler, "orders", msg.receipt_handle, "bad", T0).unwrap();

    assert_eq!(
        drain_events(&events),
        vec![
            BrokerEvent::MessageStateChanged {
                queue: "orders".to_string(),
                message_id: id,
                status: MessageStatus::DeadLettered,
                at: T0,
            },
            BrokerEvent::MessageStateChanged {
                queue: "dlq".to_string(),
                message_id: id,
                status: MessageStatus::Buffered,
                at: T0,
            },
        ]
    );
}

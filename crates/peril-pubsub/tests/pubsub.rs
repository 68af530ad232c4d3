//! Delivery loop behavior against the in-memory broker.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use peril_broker::{
    Broker, Channel, Consumer, Delivery, ExchangeKind, MemoryBroker, MemoryChannel,
    OutboundMessage, QueueOptions,
};
use peril_protocol::routing::{DEAD_LETTER_QUEUE, EXCHANGE_PERIL_DLX, EXCHANGE_PERIL_TOPIC};
use peril_protocol::{JsonCodec, MsgPackCodec, PlayingState};
use peril_pubsub::{
    handler_fn, subscribe, AckType, PubSubError, Publisher, QueueBinding, SimpleQueueType,
    SubscribeOptions,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

async fn setup() -> (MemoryBroker, MemoryChannel) {
    let broker = MemoryBroker::new();
    let ch = broker.channel().await.unwrap();
    ch.declare_exchange(EXCHANGE_PERIL_TOPIC, ExchangeKind::Topic, true)
        .await
        .unwrap();
    ch.declare_exchange(EXCHANGE_PERIL_DLX, ExchangeKind::Fanout, true)
        .await
        .unwrap();
    ch.declare_queue(
        DEAD_LETTER_QUEUE,
        &QueueOptions {
            durable: true,
            ..QueueOptions::default()
        },
    )
    .await
    .unwrap();
    ch.bind_queue(DEAD_LETTER_QUEUE, EXCHANGE_PERIL_DLX, "")
        .await
        .unwrap();
    (broker, ch)
}

fn pause_binding() -> QueueBinding {
    QueueBinding::new(
        EXCHANGE_PERIL_TOPIC,
        "pause_test",
        "pause.*",
        SimpleQueueType::Durable,
    )
}

/// Polls `check` until it holds or a second has passed.
async fn eventually(check: impl Fn() -> bool) {
    let result = tokio::time::timeout(Duration::from_secs(1), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "condition not reached in time");
}

async fn publish_state(broker: &MemoryBroker, paused: bool) {
    Publisher::new(broker.channel().await.unwrap(), JsonCodec)
        .publish(
            EXCHANGE_PERIL_TOPIC,
            "pause.alice",
            &PlayingState { is_paused: paused },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_ack_delivers_once() {
    let (broker, _ch) = setup().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sub = subscribe(
        &broker,
        &pause_binding(),
        JsonCodec,
        handler_fn(move |state: PlayingState| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(state);
                AckType::Ack
            }
        }),
        SubscribeOptions::default(),
    )
    .await
    .unwrap();

    publish_state(&broker, true).await;

    let state = rx.recv().await.unwrap();
    assert!(state.is_paused);
    eventually(|| broker.queue_len("pause_test") == Some(0)).await;
    assert_eq!(broker.queue_len(DEAD_LETTER_QUEUE), Some(0));
    assert!(rx.try_recv().is_err());
    sub.shutdown().await;
}

#[tokio::test]
async fn test_requeue_redelivers() {
    let (broker, _ch) = setup().await;
    let calls = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&calls);
    let sub = subscribe(
        &broker,
        &pause_binding(),
        JsonCodec,
        handler_fn(move |_: PlayingState| {
            let n = seen.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    AckType::NackRequeue
                } else {
                    AckType::Ack
                }
            }
        }),
        SubscribeOptions::default(),
    )
    .await
    .unwrap();

    publish_state(&broker, false).await;

    eventually(|| calls.load(Ordering::SeqCst) == 2).await;
    eventually(|| broker.queue_len("pause_test") == Some(0)).await;
    assert_eq!(broker.queue_len(DEAD_LETTER_QUEUE), Some(0));
    sub.shutdown().await;
}

#[tokio::test]
async fn test_discard_goes_to_dead_letter_queue() {
    let (broker, _ch) = setup().await;
    let sub = subscribe(
        &broker,
        &pause_binding(),
        JsonCodec,
        handler_fn(|_: PlayingState| async { AckType::NackDiscard }),
        SubscribeOptions::default(),
    )
    .await
    .unwrap();

    publish_state(&broker, true).await;

    eventually(|| broker.queue_len(DEAD_LETTER_QUEUE) == Some(1)).await;
    assert_eq!(broker.queue_len("pause_test"), Some(0));
    sub.shutdown().await;
}

#[tokio::test]
async fn test_undecodable_message_is_discarded_and_loop_continues() {
    let (broker, ch) = setup().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sub = subscribe(
        &broker,
        &pause_binding(),
        JsonCodec,
        handler_fn(move |state: PlayingState| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(state);
                AckType::Ack
            }
        }),
        SubscribeOptions::default(),
    )
    .await
    .unwrap();

    ch.publish(
        EXCHANGE_PERIL_TOPIC,
        "pause.alice",
        OutboundMessage {
            body: b"{not json".to_vec(),
            content_type: "application/json".into(),
        },
    )
    .await
    .unwrap();
    publish_state(&broker, true).await;

    let state = rx.recv().await.unwrap();
    assert!(state.is_paused);
    eventually(|| broker.queue_len(DEAD_LETTER_QUEUE) == Some(1)).await;
    assert!(rx.try_recv().is_err());
    sub.shutdown().await;
}

#[tokio::test]
async fn test_panicking_handler_discards_and_loop_continues() {
    let (broker, _ch) = setup().await;
    let calls = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&calls);
    let sub = subscribe(
        &broker,
        &pause_binding(),
        JsonCodec,
        handler_fn(move |state: PlayingState| {
            seen.fetch_add(1, Ordering::SeqCst);
            async move {
                if state.is_paused {
                    panic!("boom");
                }
                AckType::Ack
            }
        }),
        SubscribeOptions::default(),
    )
    .await
    .unwrap();

    publish_state(&broker, true).await;
    publish_state(&broker, false).await;

    eventually(|| calls.load(Ordering::SeqCst) == 2).await;
    eventually(|| broker.queue_len(DEAD_LETTER_QUEUE) == Some(1)).await;
    assert!(!sub.is_finished());
    sub.shutdown().await;
}

#[tokio::test]
async fn test_redelivery_cap_turns_requeue_into_discard() {
    let (broker, _ch) = setup().await;
    let calls = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&calls);
    let sub = subscribe(
        &broker,
        &pause_binding(),
        JsonCodec,
        handler_fn(move |_: PlayingState| {
            seen.fetch_add(1, Ordering::SeqCst);
            async { AckType::NackRequeue }
        }),
        SubscribeOptions::default().with_max_redeliveries(2),
    )
    .await
    .unwrap();

    publish_state(&broker, true).await;

    eventually(|| broker.queue_len(DEAD_LETTER_QUEUE) == Some(1)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(broker.queue_len("pause_test"), Some(0));
    sub.shutdown().await;
}

#[tokio::test]
async fn test_bind_failure_is_returned_before_the_loop_starts() {
    let broker = MemoryBroker::new();
    let result = subscribe(
        &broker,
        &pause_binding(),
        JsonCodec,
        handler_fn(|_: PlayingState| async { AckType::Ack }),
        SubscribeOptions::default(),
    )
    .await;
    assert!(matches!(result, Err(PubSubError::Bind { exchange, .. }) if exchange == EXCHANGE_PERIL_TOPIC));
}

#[tokio::test]
async fn test_parent_cancellation_stops_the_loop() {
    let (broker, _ch) = setup().await;
    let parent = CancellationToken::new();
    let sub = subscribe(
        &broker,
        &pause_binding(),
        JsonCodec,
        handler_fn(|_: PlayingState| async { AckType::Ack }),
        SubscribeOptions::default().with_cancel(parent.clone()),
    )
    .await
    .unwrap();

    parent.cancel();
    eventually(|| sub.is_finished()).await;
    sub.join().await;
}

#[tokio::test]
async fn test_broker_close_ends_the_loop() {
    let (broker, _ch) = setup().await;
    let sub = subscribe(
        &broker,
        &pause_binding(),
        JsonCodec,
        handler_fn(|_: PlayingState| async { AckType::Ack }),
        SubscribeOptions::default(),
    )
    .await
    .unwrap();

    broker.close().await.unwrap();
    eventually(|| sub.is_finished()).await;
}

#[tokio::test]
async fn test_transient_queue_is_removed_on_shutdown() {
    let (broker, _ch) = setup().await;
    let binding = QueueBinding::new(
        EXCHANGE_PERIL_TOPIC,
        "pause.alice",
        "pause.*",
        SimpleQueueType::Transient,
    );
    let sub = subscribe(
        &broker,
        &binding,
        JsonCodec,
        handler_fn(|_: PlayingState| async { AckType::Ack }),
        SubscribeOptions::default(),
    )
    .await
    .unwrap();
    assert_eq!(sub.queue(), "pause.alice");
    assert_eq!(broker.queue_len("pause.alice"), Some(0));

    sub.shutdown().await;
    assert_eq!(broker.queue_len("pause.alice"), None);
}

#[tokio::test]
async fn test_publisher_tags_content_type() {
    let (broker, ch) = setup().await;
    ch.declare_queue("raw", &QueueOptions::default()).await.unwrap();
    ch.bind_queue("raw", EXCHANGE_PERIL_TOPIC, "#").await.unwrap();
    let mut consumer = ch.consume("raw").await.unwrap();

    let json = Publisher::new(broker.channel().await.unwrap(), JsonCodec);
    let msgpack = json.with_codec(MsgPackCodec);
    json.publish(EXCHANGE_PERIL_TOPIC, "a", &PlayingState { is_paused: true })
        .await
        .unwrap();
    msgpack
        .publish(EXCHANGE_PERIL_TOPIC, "b", &PlayingState { is_paused: true })
        .await
        .unwrap();

    let first = consumer.next_delivery().await.unwrap().unwrap();
    assert_eq!(first.content_type(), Some("application/json"));
    first.ack().await.unwrap();
    let second = consumer.next_delivery().await.unwrap().unwrap();
    assert_eq!(second.content_type(), Some("application/x-msgpack"));
    assert_eq!(second.routing_key(), "b");
    second.ack().await.unwrap();
}

#[tokio::test]
async fn test_publish_to_missing_exchange_reports_key() {
    let broker = MemoryBroker::new();
    let publisher = Publisher::new(broker.channel().await.unwrap(), JsonCodec);
    let err = publisher
        .publish("nope", "war.alice", &PlayingState { is_paused: false })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PubSubError::Publish { exchange, routing_key, .. }
            if exchange == "nope" && routing_key == "war.alice"
    ));
}

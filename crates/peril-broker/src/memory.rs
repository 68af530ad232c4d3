//! In-process broker with exchange routing, dead-lettering, and requeue.
//!
//! Mirrors the parts of AMQP 0-9-1 that Peril relies on:
//!
//! - direct, topic, and fanout exchanges;
//! - queue declarations that are idempotent for equal arguments and
//!   rejected for conflicting ones;
//! - manual ack / nack, where a requeued message goes back to the head of
//!   its queue with its redelivery count bumped, and a discarded message
//!   is re-published to the queue's dead-letter exchange;
//! - auto-delete queues that disappear with their last consumer;
//! - unsettled deliveries that are requeued when dropped.
//!
//! All processes sharing a [`MemoryBroker`] (clones share state) see the
//! same exchanges and queues, which makes it a drop-in stand-in for a real
//! broker in tests.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::{
    Broker, BrokerError, Channel, Consumer, Delivery, ExchangeKind, OutboundMessage, QueueInfo,
    QueueOptions,
};

/// Locks a std mutex, recovering the data if a panicking holder poisoned it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct Shared {
    topology: Mutex<Topology>,
    /// Cancelled when the broker is closed. Every queue's `deleted` token
    /// is a child of this one.
    closed: CancellationToken,
}

#[derive(Default)]
struct Topology {
    exchanges: HashMap<String, ExchangeDecl>,
    queues: HashMap<String, Arc<MemoryQueue>>,
    bindings: Vec<Binding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ExchangeDecl {
    kind: ExchangeKind,
    durable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    exchange: String,
    queue: String,
    routing_key: String,
}

#[derive(Debug, Clone)]
struct StoredMessage {
    routing_key: String,
    body: Arc<[u8]>,
    content_type: String,
    redelivery_count: u32,
}

struct MemoryQueue {
    name: String,
    options: QueueOptions,
    messages: Mutex<VecDeque<StoredMessage>>,
    notify: Notify,
    deleted: CancellationToken,
    consumers: AtomicUsize,
}

impl MemoryQueue {
    fn push_back(&self, msg: StoredMessage) {
        lock(&self.messages).push_back(msg);
        self.notify.notify_one();
    }

    fn push_front(&self, msg: StoredMessage) {
        lock(&self.messages).push_front(msg);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<StoredMessage> {
        lock(&self.messages).pop_front()
    }

    fn len(&self) -> usize {
        lock(&self.messages).len()
    }

    fn info(&self) -> QueueInfo {
        QueueInfo {
            name: self.name.clone(),
            message_count: u32::try_from(self.len()).unwrap_or(u32::MAX),
            consumer_count: u32::try_from(self.consumers.load(Ordering::Relaxed))
                .unwrap_or(u32::MAX),
        }
    }
}

impl Shared {
    fn ensure_open(&self) -> Result<(), BrokerError> {
        if self.closed.is_cancelled() {
            Err(BrokerError::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    /// Delivers a message to every queue bound to `exchange` whose binding
    /// key matches. A queue bound several times receives one copy.
    fn route(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Arc<[u8]>,
        content_type: &str,
    ) -> Result<usize, BrokerError> {
        let topology = lock(&self.topology);
        let decl = topology
            .exchanges
            .get(exchange)
            .ok_or_else(|| BrokerError::ExchangeNotFound(exchange.to_string()))?;

        let mut targets: Vec<&Arc<MemoryQueue>> = Vec::new();
        for binding in &topology.bindings {
            if binding.exchange != exchange
                || !decl.kind.matches(&binding.routing_key, routing_key)
            {
                continue;
            }
            if let Some(queue) = topology.queues.get(&binding.queue) {
                if !targets.iter().any(|q| q.name == queue.name) {
                    targets.push(queue);
                }
            }
        }

        if targets.is_empty() {
            tracing::trace!(exchange, routing_key, "unroutable message dropped");
        }
        for queue in &targets {
            queue.push_back(StoredMessage {
                routing_key: routing_key.to_string(),
                body: Arc::clone(&body),
                content_type: content_type.to_string(),
                redelivery_count: 0,
            });
        }
        Ok(targets.len())
    }

    fn dead_letter(&self, queue: &MemoryQueue, msg: StoredMessage) {
        let Some(dlx) = &queue.options.dead_letter_exchange else {
            tracing::debug!(queue = %queue.name, "discarded message dropped (no dead-letter exchange)");
            return;
        };
        match self.route(dlx, &msg.routing_key, msg.body, &msg.content_type) {
            Ok(_) => tracing::debug!(queue = %queue.name, %dlx, "message dead-lettered"),
            Err(e) => tracing::warn!(queue = %queue.name, %dlx, error = %e, "dead-letter routing failed"),
        }
    }

    fn remove_queue(&self, name: &str) -> Option<Arc<MemoryQueue>> {
        let mut topology = lock(&self.topology);
        let queue = topology.queues.remove(name)?;
        topology.bindings.retain(|b| b.queue != name);
        queue.deleted.cancel();
        Some(queue)
    }
}

// ---------------------------------------------------------------------------
// MemoryBroker
// ---------------------------------------------------------------------------

/// An in-process [`Broker`]. Cloning yields another handle to the same
/// broker, the way two processes would dial the same server.
#[derive(Clone)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    /// Creates an empty broker with no exchanges or queues.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                topology: Mutex::new(Topology::default()),
                closed: CancellationToken::new(),
            }),
        }
    }

    /// Number of ready (not in-flight) messages in a queue, or `None` if
    /// the queue doesn't exist.
    pub fn queue_len(&self, name: &str) -> Option<usize> {
        lock(&self.shared.topology).queues.get(name).map(|q| q.len())
    }

    /// The options a queue was declared with.
    pub fn queue_options(&self, name: &str) -> Option<QueueOptions> {
        lock(&self.shared.topology)
            .queues
            .get(name)
            .map(|q| q.options.clone())
    }

    /// Returns `true` if `queue` is bound to `exchange` with `routing_key`.
    pub fn has_binding(&self, exchange: &str, queue: &str, routing_key: &str) -> bool {
        lock(&self.shared.topology).bindings.iter().any(|b| {
            b.exchange == exchange && b.queue == queue && b.routing_key == routing_key
        })
    }

    /// Number of bindings attached to `queue`.
    pub fn binding_count(&self, queue: &str) -> usize {
        lock(&self.shared.topology)
            .bindings
            .iter()
            .filter(|b| b.queue == queue)
            .count()
    }
}

impl fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("closed", &self.shared.closed.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    type Channel = MemoryChannel;

    async fn channel(&self) -> Result<MemoryChannel, BrokerError> {
        self.shared.ensure_open()?;
        Ok(MemoryChannel {
            shared: Arc::clone(&self.shared),
        })
    }

    async fn close(&self) -> Result<(), BrokerError> {
        tracing::info!("memory broker closed");
        self.shared.closed.cancel();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryChannel
// ---------------------------------------------------------------------------

/// A channel on a [`MemoryBroker`].
pub struct MemoryChannel {
    shared: Arc<Shared>,
}

impl fmt::Debug for MemoryChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryChannel").finish_non_exhaustive()
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    type Consumer = MemoryConsumer;

    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> Result<(), BrokerError> {
        self.shared.ensure_open()?;
        if name.is_empty() {
            return Err(BrokerError::InvalidArgument("exchange name must not be empty".into()));
        }
        let decl = ExchangeDecl { kind, durable };
        let mut topology = lock(&self.shared.topology);
        match topology.exchanges.get(name) {
            Some(existing) if *existing == decl => Ok(()),
            Some(existing) => Err(BrokerError::PreconditionFailed(format!(
                "exchange {name} already declared as {}",
                existing.kind
            ))),
            None => {
                topology.exchanges.insert(name.to_string(), decl);
                tracing::debug!(exchange = name, %kind, "exchange declared");
                Ok(())
            }
        }
    }

    async fn declare_queue(
        &self,
        name: &str,
        options: &QueueOptions,
    ) -> Result<QueueInfo, BrokerError> {
        self.shared.ensure_open()?;
        if name.is_empty() {
            return Err(BrokerError::InvalidArgument("queue name must not be empty".into()));
        }
        let mut topology = lock(&self.shared.topology);
        if let Some(existing) = topology.queues.get(name) {
            if existing.options != *options {
                return Err(BrokerError::PreconditionFailed(format!(
                    "queue {name} already declared with different arguments"
                )));
            }
            return Ok(existing.info());
        }

        let queue = Arc::new(MemoryQueue {
            name: name.to_string(),
            options: options.clone(),
            messages: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            deleted: self.shared.closed.child_token(),
            consumers: AtomicUsize::new(0),
        });
        let info = queue.info();
        topology.queues.insert(name.to_string(), queue);
        tracing::debug!(queue = name, durable = options.durable, "queue declared");
        Ok(info)
    }

    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError> {
        self.shared.ensure_open()?;
        let mut topology = lock(&self.shared.topology);
        if !topology.exchanges.contains_key(exchange) {
            return Err(BrokerError::ExchangeNotFound(exchange.to_string()));
        }
        if !topology.queues.contains_key(queue) {
            return Err(BrokerError::QueueNotFound(queue.to_string()));
        }
        let binding = Binding {
            exchange: exchange.to_string(),
            queue: queue.to_string(),
            routing_key: routing_key.to_string(),
        };
        if !topology.bindings.contains(&binding) {
            topology.bindings.push(binding);
            tracing::debug!(queue, exchange, routing_key, "queue bound");
        }
        Ok(())
    }

    async fn delete_queue(&self, name: &str) -> Result<u32, BrokerError> {
        self.shared.ensure_open()?;
        let queue = self
            .shared
            .remove_queue(name)
            .ok_or_else(|| BrokerError::QueueNotFound(name.to_string()))?;
        tracing::debug!(queue = name, "queue deleted");
        Ok(u32::try_from(queue.len()).unwrap_or(u32::MAX))
    }

    async fn consume(&self, queue: &str) -> Result<MemoryConsumer, BrokerError> {
        self.shared.ensure_open()?;
        let queue = lock(&self.shared.topology)
            .queues
            .get(queue)
            .cloned()
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;
        queue.consumers.fetch_add(1, Ordering::Relaxed);
        Ok(MemoryConsumer {
            queue,
            shared: Arc::clone(&self.shared),
        })
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
    ) -> Result<(), BrokerError> {
        self.shared.ensure_open()?;
        let body: Arc<[u8]> = message.body.into();
        self.shared
            .route(exchange, routing_key, body, &message.content_type)
            .map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// MemoryConsumer
// ---------------------------------------------------------------------------

/// Consumes one queue of a [`MemoryBroker`].
///
/// Dropping the last consumer of an auto-delete queue deletes the queue.
pub struct MemoryConsumer {
    queue: Arc<MemoryQueue>,
    shared: Arc<Shared>,
}

#[async_trait]
impl Consumer for MemoryConsumer {
    type Delivery = MemoryDelivery;

    async fn next_delivery(&mut self) -> Result<Option<MemoryDelivery>, BrokerError> {
        loop {
            if self.queue.deleted.is_cancelled() {
                return Ok(None);
            }
            if let Some(message) = self.queue.pop() {
                return Ok(Some(MemoryDelivery {
                    message,
                    queue: Arc::clone(&self.queue),
                    shared: Arc::clone(&self.shared),
                    settled: AtomicBool::new(false),
                }));
            }
            tokio::select! {
                _ = self.queue.notify.notified() => {}
                _ = self.queue.deleted.cancelled() => {}
            }
        }
    }
}

impl fmt::Debug for MemoryConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryConsumer")
            .field("queue", &self.queue.name)
            .finish_non_exhaustive()
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        let remaining = self.queue.consumers.fetch_sub(1, Ordering::Relaxed) - 1;
        if remaining == 0 && self.queue.options.auto_delete {
            tracing::debug!(queue = %self.queue.name, "auto-deleting queue");
            self.shared.remove_queue(&self.queue.name);
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryDelivery
// ---------------------------------------------------------------------------

/// A message taken from a [`MemoryBroker`] queue.
///
/// Dropping it without settling puts it back on the queue, as a broker does
/// for unacknowledged messages when a consumer goes away.
pub struct MemoryDelivery {
    message: StoredMessage,
    queue: Arc<MemoryQueue>,
    shared: Arc<Shared>,
    settled: AtomicBool,
}

impl MemoryDelivery {
    fn settle(&self) -> Result<(), BrokerError> {
        if self.settled.swap(true, Ordering::AcqRel) {
            return Err(BrokerError::PreconditionFailed(
                "delivery already settled".into(),
            ));
        }
        Ok(())
    }

    fn requeue(&self) {
        let mut msg = self.message.clone();
        msg.redelivery_count += 1;
        self.queue.push_front(msg);
    }
}

#[async_trait]
impl Delivery for MemoryDelivery {
    fn body(&self) -> &[u8] {
        &self.message.body
    }

    fn content_type(&self) -> Option<&str> {
        Some(self.message.content_type.as_str())
    }

    fn routing_key(&self) -> &str {
        &self.message.routing_key
    }

    fn redelivery_count(&self) -> u32 {
        self.message.redelivery_count
    }

    async fn ack(&self) -> Result<(), BrokerError> {
        self.settle()
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        self.settle()?;
        if requeue {
            self.requeue();
        } else {
            self.shared.dead_letter(&self.queue, self.message.clone());
        }
        Ok(())
    }
}

impl fmt::Debug for MemoryDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDelivery")
            .field("queue", &self.queue.name)
            .field("routing_key", &self.message.routing_key)
            .field("redelivery_count", &self.message.redelivery_count)
            .finish_non_exhaustive()
    }
}

impl Drop for MemoryDelivery {
    fn drop(&mut self) {
        if !self.settled.load(Ordering::Acquire) && !self.queue.deleted.is_cancelled() {
            self.requeue();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(body: &str) -> OutboundMessage {
        OutboundMessage {
            body: body.as_bytes().to_vec(),
            content_type: "text/plain".into(),
        }
    }

    async fn setup() -> (MemoryBroker, MemoryChannel) {
        let broker = MemoryBroker::new();
        let ch = broker.channel().await.unwrap();
        ch.declare_exchange("peril_topic", ExchangeKind::Topic, true)
            .await
            .unwrap();
        ch.declare_exchange("peril_dlx", ExchangeKind::Fanout, true)
            .await
            .unwrap();
        (broker, ch)
    }

    fn durable_with_dlx() -> QueueOptions {
        QueueOptions {
            durable: true,
            dead_letter_exchange: Some("peril_dlx".into()),
            ..QueueOptions::default()
        }
    }

    #[tokio::test]
    async fn test_declare_queue_is_idempotent() {
        let (_broker, ch) = setup().await;
        ch.declare_queue("war", &durable_with_dlx()).await.unwrap();
        ch.declare_queue("war", &durable_with_dlx()).await.unwrap();
    }

    #[tokio::test]
    async fn test_declare_queue_with_conflicting_args_fails() {
        let (_broker, ch) = setup().await;
        ch.declare_queue("war", &durable_with_dlx()).await.unwrap();
        let err = ch
            .declare_queue("war", &QueueOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::PreconditionFailed(_)));
    }

    #[tokio::test]
    async fn test_bind_to_missing_exchange_fails() {
        let (_broker, ch) = setup().await;
        ch.declare_queue("war", &durable_with_dlx()).await.unwrap();
        let err = ch.bind_queue("war", "nope", "war.*").await.unwrap_err();
        assert!(matches!(err, BrokerError::ExchangeNotFound(name) if name == "nope"));
    }

    #[tokio::test]
    async fn test_rebinding_is_a_no_op() {
        let (broker, ch) = setup().await;
        ch.declare_queue("war", &durable_with_dlx()).await.unwrap();
        ch.bind_queue("war", "peril_topic", "war.*").await.unwrap();
        ch.bind_queue("war", "peril_topic", "war.*").await.unwrap();
        assert_eq!(broker.binding_count("war"), 1);
    }

    #[tokio::test]
    async fn test_publish_routes_by_topic() {
        let (broker, ch) = setup().await;
        ch.declare_queue("war", &durable_with_dlx()).await.unwrap();
        ch.bind_queue("war", "peril_topic", "war.*").await.unwrap();

        ch.publish("peril_topic", "war.alice", msg("a")).await.unwrap();
        ch.publish("peril_topic", "army_moves.alice", msg("b")).await.unwrap();

        assert_eq!(broker.queue_len("war"), Some(1));
    }

    #[tokio::test]
    async fn test_publish_to_missing_exchange_fails() {
        let (_broker, ch) = setup().await;
        let err = ch.publish("nope", "k", msg("x")).await.unwrap_err();
        assert!(matches!(err, BrokerError::ExchangeNotFound(_)));
    }

    #[tokio::test]
    async fn test_nack_requeue_redelivers_with_count() {
        let (_broker, ch) = setup().await;
        ch.declare_queue("war", &durable_with_dlx()).await.unwrap();
        ch.bind_queue("war", "peril_topic", "war.*").await.unwrap();
        ch.publish("peril_topic", "war.alice", msg("a")).await.unwrap();

        let mut consumer = ch.consume("war").await.unwrap();
        let first = consumer.next_delivery().await.unwrap().unwrap();
        assert_eq!(first.redelivery_count(), 0);
        first.nack(true).await.unwrap();

        let second = consumer.next_delivery().await.unwrap().unwrap();
        assert_eq!(second.body(), b"a");
        assert_eq!(second.redelivery_count(), 1);
        second.ack().await.unwrap();
    }

    #[tokio::test]
    async fn test_nack_discard_dead_letters() {
        let (broker, ch) = setup().await;
        ch.declare_queue("peril_dlq", &QueueOptions { durable: true, ..Default::default() })
            .await
            .unwrap();
        ch.bind_queue("peril_dlq", "peril_dlx", "").await.unwrap();
        ch.declare_queue("war", &durable_with_dlx()).await.unwrap();
        ch.bind_queue("war", "peril_topic", "war.*").await.unwrap();
        ch.publish("peril_topic", "war.alice", msg("a")).await.unwrap();

        let mut consumer = ch.consume("war").await.unwrap();
        let delivery = consumer.next_delivery().await.unwrap().unwrap();
        delivery.nack(false).await.unwrap();

        assert_eq!(broker.queue_len("war"), Some(0));
        assert_eq!(broker.queue_len("peril_dlq"), Some(1));
    }

    #[tokio::test]
    async fn test_double_settle_fails() {
        let (_broker, ch) = setup().await;
        ch.declare_queue("war", &durable_with_dlx()).await.unwrap();
        ch.bind_queue("war", "peril_topic", "#").await.unwrap();
        ch.publish("peril_topic", "war.alice", msg("a")).await.unwrap();

        let mut consumer = ch.consume("war").await.unwrap();
        let delivery = consumer.next_delivery().await.unwrap().unwrap();
        delivery.ack().await.unwrap();
        assert!(delivery.ack().await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_delivery_is_requeued() {
        let (broker, ch) = setup().await;
        ch.declare_queue("war", &durable_with_dlx()).await.unwrap();
        ch.bind_queue("war", "peril_topic", "war.*").await.unwrap();
        ch.publish("peril_topic", "war.alice", msg("a")).await.unwrap();

        let mut consumer = ch.consume("war").await.unwrap();
        drop(consumer.next_delivery().await.unwrap());
        assert_eq!(broker.queue_len("war"), Some(1));
    }

    #[tokio::test]
    async fn test_close_ends_consumers() {
        let (broker, ch) = setup().await;
        ch.declare_queue("war", &durable_with_dlx()).await.unwrap();
        let mut consumer = ch.consume("war").await.unwrap();

        let waiter = tokio::spawn(async move { consumer.next_delivery().await });
        broker.close().await.unwrap();

        assert!(waiter.await.unwrap().unwrap().is_none());
        assert!(matches!(broker.channel().await, Err(BrokerError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_auto_delete_queue_goes_away_with_last_consumer() {
        let (broker, ch) = setup().await;
        let transient = QueueOptions {
            auto_delete: true,
            exclusive: true,
            ..QueueOptions::default()
        };
        ch.declare_queue("army_moves.alice", &transient).await.unwrap();
        ch.bind_queue("army_moves.alice", "peril_topic", "army_moves.*")
            .await
            .unwrap();

        let consumer = ch.consume("army_moves.alice").await.unwrap();
        assert_eq!(broker.queue_len("army_moves.alice"), Some(0));
        drop(consumer);

        assert_eq!(broker.queue_len("army_moves.alice"), None);
        assert_eq!(broker.binding_count("army_moves.alice"), 0);
    }
}

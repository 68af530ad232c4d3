//! Broker abstraction layer for Peril.
//!
//! Provides the [`Broker`], [`Channel`], [`Consumer`], and [`Delivery`]
//! traits that abstract over an exchange/queue message broker, plus two
//! implementations:
//!
//! - [`MemoryBroker`]: in-process, with direct/topic/fanout exchanges,
//!   dead-lettering, and redelivery counting. Used by tests and by
//!   single-process setups.
//! - `AmqpBroker`: AMQP 0-9-1 (RabbitMQ) via `lapin`.
//!
//! # Feature Flags
//!
//! - `amqp`: AMQP transport via `lapin`

mod error;
mod memory;
mod topic;

#[cfg(feature = "amqp")]
mod amqp;

#[cfg(feature = "amqp")]
pub use amqp::{AmqpBroker, AmqpChannel, AmqpConsumer, AmqpDelivery};
pub use error::BrokerError;
pub use memory::{MemoryBroker, MemoryChannel, MemoryConsumer, MemoryDelivery};

use std::fmt;

use async_trait::async_trait;

/// How an exchange matches routing keys against its bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeKind {
    /// Binding key must equal the routing key.
    Direct,
    /// Binding key is a pattern: `*` matches one word, `#` zero or more.
    Topic,
    /// Every bound queue receives every message.
    Fanout,
}

impl ExchangeKind {
    /// Returns `true` if a message published with `routing_key` should
    /// reach a queue bound with `binding_key`.
    pub fn matches(self, binding_key: &str, routing_key: &str) -> bool {
        match self {
            Self::Direct => binding_key == routing_key,
            Self::Topic => topic::matches(binding_key, routing_key),
            Self::Fanout => true,
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Direct => "direct",
            Self::Topic => "topic",
            Self::Fanout => "fanout",
        };
        f.write_str(name)
    }
}

/// Arguments a queue is declared with.
///
/// Two declarations of the same queue name must carry equal options,
/// otherwise the second one fails with
/// [`BrokerError::PreconditionFailed`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueOptions {
    /// Survives a broker restart.
    pub durable: bool,
    /// Deleted once its last consumer goes away.
    pub auto_delete: bool,
    /// Usable only by the connection that declared it.
    pub exclusive: bool,
    /// Exchange that receives messages rejected without requeue.
    pub dead_letter_exchange: Option<String>,
}

/// What the broker reports back from a queue declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueInfo {
    pub name: String,
    pub message_count: u32,
    pub consumer_count: u32,
}

/// A message ready to be handed to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub body: Vec<u8>,
    pub content_type: String,
}

/// A connection to a broker. Channels are opened from it.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// The channel type produced by this broker.
    type Channel: Channel;

    /// Opens a new channel on this connection.
    async fn channel(&self) -> Result<Self::Channel, BrokerError>;

    /// Closes the connection. Every consumer opened through it ends.
    async fn close(&self) -> Result<(), BrokerError>;
}

/// A lightweight session on a broker connection.
///
/// Channels are not safe for unsynchronized concurrent publishing; callers
/// that share one across tasks serialize access themselves.
#[async_trait]
pub trait Channel: Send + Sync + 'static {
    /// The consumer type produced by [`consume`](Self::consume).
    type Consumer: Consumer;

    /// Declares an exchange. Idempotent for identical declarations.
    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> Result<(), BrokerError>;

    /// Declares a queue. Idempotent for identical options.
    async fn declare_queue(
        &self,
        name: &str,
        options: &QueueOptions,
    ) -> Result<QueueInfo, BrokerError>;

    /// Binds a queue to an exchange. Re-binding the same triple is a no-op.
    async fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), BrokerError>;

    /// Deletes a queue, returning how many messages were dropped with it.
    async fn delete_queue(&self, name: &str) -> Result<u32, BrokerError>;

    /// Starts consuming from a queue with manual acknowledgement.
    async fn consume(&self, queue: &str) -> Result<Self::Consumer, BrokerError>;

    /// Publishes a message. Fire-and-forget: no confirmation is awaited,
    /// and an unroutable message is silently dropped by the broker.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: OutboundMessage,
    ) -> Result<(), BrokerError>;
}

/// A stream of deliveries from one queue.
#[async_trait]
pub trait Consumer: Send + 'static {
    /// The delivery type yielded by this consumer.
    type Delivery: Delivery;

    /// Waits for the next delivery.
    ///
    /// Returns `Ok(None)` when the channel closes or the queue is deleted.
    async fn next_delivery(&mut self) -> Result<Option<Self::Delivery>, BrokerError>;
}

/// A single received message awaiting settlement.
#[async_trait]
pub trait Delivery: Send + Sync + 'static {
    /// The raw payload.
    fn body(&self) -> &[u8];

    /// The content type the publisher stamped on the message, if any.
    fn content_type(&self) -> Option<&str>;

    /// The routing key the message was published with.
    fn routing_key(&self) -> &str;

    /// How many times this message has been delivered before.
    /// 0 on first delivery.
    fn redelivery_count(&self) -> u32;

    /// Acknowledges the message; the broker forgets it.
    async fn ack(&self) -> Result<(), BrokerError>;

    /// Rejects the message. With `requeue` it goes back to the queue,
    /// otherwise it is dead-lettered (or dropped if the queue has no
    /// dead-letter exchange).
    async fn nack(&self, requeue: bool) -> Result<(), BrokerError>;
}

//! Queue declaration and binding.

use peril_broker::{Broker, Channel, QueueInfo, QueueOptions};

use crate::PubSubError;

/// The two durability classes Peril queues come in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimpleQueueType {
    /// Survives broker restarts and is shared between consumers.
    Durable,
    /// Private to one client and gone when that client disconnects.
    Transient,
}

impl SimpleQueueType {
    /// Broker-level queue options for this class.
    ///
    /// | class     | durable | auto-delete | exclusive |
    /// |-----------|---------|-------------|-----------|
    /// | Transient | no      | yes         | yes       |
    /// | Durable   | yes     | no          | no        |
    pub fn queue_options(self, dead_letter_exchange: Option<&str>) -> QueueOptions {
        let dead_letter_exchange = dead_letter_exchange.map(str::to_string);
        match self {
            Self::Durable => QueueOptions {
                durable: true,
                auto_delete: false,
                exclusive: false,
                dead_letter_exchange,
            },
            Self::Transient => QueueOptions {
                durable: false,
                auto_delete: true,
                exclusive: true,
                dead_letter_exchange,
            },
        }
    }
}

/// Where a subscription reads from: a queue and the binding that feeds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
    pub queue_type: SimpleQueueType,
}

impl QueueBinding {
    pub fn new(
        exchange: impl Into<String>,
        queue: impl Into<String>,
        routing_key: impl Into<String>,
        queue_type: SimpleQueueType,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            routing_key: routing_key.into(),
            queue_type,
        }
    }
}

/// Opens a channel, declares the queue, and binds it to the exchange.
///
/// Idempotent: binding the same (exchange, queue, key) again succeeds
/// without changes. Fails if the exchange doesn't exist or the queue was
/// previously declared with different arguments; neither is retried.
///
/// The returned channel is the one the queue should be consumed on.
pub async fn declare_and_bind<B: Broker>(
    broker: &B,
    binding: &QueueBinding,
    dead_letter_exchange: Option<&str>,
) -> Result<(B::Channel, QueueInfo), PubSubError> {
    let channel = broker.channel().await.map_err(PubSubError::Channel)?;
    let bind_err = |source| PubSubError::Bind {
        queue: binding.queue.clone(),
        exchange: binding.exchange.clone(),
        source,
    };

    let options = binding.queue_type.queue_options(dead_letter_exchange);
    let info = channel
        .declare_queue(&binding.queue, &options)
        .await
        .map_err(bind_err)?;
    channel
        .bind_queue(&binding.queue, &binding.exchange, &binding.routing_key)
        .await
        .map_err(bind_err)?;

    tracing::debug!(
        queue = %binding.queue,
        exchange = %binding.exchange,
        routing_key = %binding.routing_key,
        queue_type = ?binding.queue_type,
        "queue declared and bound"
    );
    Ok((channel, info))
}

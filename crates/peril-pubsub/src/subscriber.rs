//! Subscriptions and the delivery loop behind them.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use peril_broker::{Broker, Channel, Consumer, Delivery};
use peril_protocol::routing::EXCHANGE_PERIL_DLX;
use peril_protocol::Codec;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{declare_and_bind, AckType, Handler, PubSubError, QueueBinding};

/// Tuning for a single subscription.
#[derive(Debug, Clone)]
pub struct SubscribeOptions {
    /// Exchange that discarded messages are routed to. Defaults to
    /// [`EXCHANGE_PERIL_DLX`].
    pub dead_letter_exchange: Option<String>,
    /// Once a message has been redelivered this many times, a further
    /// requeue is turned into a discard. `None` requeues forever.
    pub max_redeliveries: Option<u32>,
    /// Parent token; cancelling it stops the subscription.
    pub cancel: CancellationToken,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            dead_letter_exchange: Some(EXCHANGE_PERIL_DLX.to_string()),
            max_redeliveries: None,
            cancel: CancellationToken::new(),
        }
    }
}

impl SubscribeOptions {
    pub fn with_max_redeliveries(mut self, max: u32) -> Self {
        self.max_redeliveries = Some(max);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn without_dead_letter(mut self) -> Self {
        self.dead_letter_exchange = None;
        self
    }
}

/// A running delivery loop.
///
/// Dropping a `Subscription` does not stop the loop; call
/// [`shutdown`](Self::shutdown) or cancel the parent token.
#[derive(Debug)]
pub struct Subscription {
    queue: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Asks the loop to stop after the message in hand, if any.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancels the loop and waits for it to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.join().await;
    }

    /// Waits for the loop to exit on its own.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!(queue = %self.queue, error = %e, "delivery loop aborted");
        }
    }
}

/// Binds `binding`, starts consuming, and spawns a delivery loop that
/// decodes each message with `codec` and hands it to `handler`.
///
/// Setup errors are returned here and the loop never starts. Once
/// running, the loop settles every delivery exactly once:
///
/// - undecodable payloads are discarded without reaching the handler;
/// - a handler that panics is treated as having returned
///   [`AckType::NackDiscard`];
/// - requeues past `max_redeliveries` become discards.
///
/// The loop ends when the subscription is cancelled or the broker closes
/// the consumer.
pub async fn subscribe<B, C, T, H>(
    broker: &B,
    binding: &QueueBinding,
    codec: C,
    handler: H,
    options: SubscribeOptions,
) -> Result<Subscription, PubSubError>
where
    B: Broker,
    C: Codec,
    T: DeserializeOwned + Send + 'static,
    H: Handler<T>,
{
    let (channel, _) =
        declare_and_bind(broker, binding, options.dead_letter_exchange.as_deref()).await?;
    let consumer = channel
        .consume(&binding.queue)
        .await
        .map_err(|source| PubSubError::Consume {
            queue: binding.queue.clone(),
            source,
        })?;

    let cancel = options.cancel.child_token();
    let worker = DeliveryLoop {
        queue: binding.queue.clone(),
        codec,
        handler,
        max_redeliveries: options.max_redeliveries,
        cancel: cancel.clone(),
    };
    let task = tokio::spawn(worker.run::<B::Channel, T>(channel, consumer));

    tracing::info!(queue = %binding.queue, routing_key = %binding.routing_key, "subscribed");
    Ok(Subscription {
        queue: binding.queue.clone(),
        cancel,
        task,
    })
}

struct DeliveryLoop<C, H> {
    queue: String,
    codec: C,
    handler: H,
    max_redeliveries: Option<u32>,
    cancel: CancellationToken,
}

impl<C: Codec, H> DeliveryLoop<C, H> {
    async fn run<Ch, T>(self, channel: Ch, mut consumer: Ch::Consumer)
    where
        Ch: Channel,
        T: DeserializeOwned + Send + 'static,
        H: Handler<T>,
    {
        // The consumer lives on this channel.
        let _channel = channel;

        loop {
            let delivery = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tracing::debug!(queue = %self.queue, "subscription cancelled");
                    break;
                }
                next = consumer.next_delivery() => match next {
                    Ok(Some(delivery)) => delivery,
                    Ok(None) => {
                        tracing::debug!(queue = %self.queue, "consumer closed by broker");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(queue = %self.queue, error = %e, "consumer failed");
                        break;
                    }
                },
            };
            self.process::<_, T>(&delivery).await;
        }
    }

    async fn process<D, T>(&self, delivery: &D)
    where
        D: Delivery,
        T: DeserializeOwned + Send + 'static,
        H: Handler<T>,
    {
        let routing_key = delivery.routing_key();
        if let Some(content_type) = delivery.content_type() {
            if content_type != self.codec.content_type() {
                tracing::debug!(
                    queue = %self.queue,
                    routing_key,
                    content_type,
                    expected = self.codec.content_type(),
                    "unexpected content type"
                );
            }
        }

        let ack = match self.codec.decode::<T>(delivery.body()) {
            Ok(message) => {
                match AssertUnwindSafe(self.handler.handle(message))
                    .catch_unwind()
                    .await
                {
                    Ok(ack) => ack,
                    Err(_) => {
                        tracing::error!(queue = %self.queue, routing_key, "handler panicked");
                        AckType::default()
                    }
                }
            }
            Err(e) => {
                tracing::warn!(queue = %self.queue, routing_key, error = %e, "undecodable message");
                AckType::NackDiscard
            }
        };

        let redeliveries = delivery.redelivery_count();
        let ack = ack.capped(redeliveries, self.max_redeliveries);
        match ack.resolve(delivery).await {
            Ok(()) => tracing::debug!(
                queue = %self.queue,
                routing_key,
                redeliveries,
                %ack,
                "delivery settled"
            ),
            Err(e) => tracing::warn!(
                queue = %self.queue,
                routing_key,
                %ack,
                error = %e,
                "failed to settle delivery"
            ),
        }
    }
}

//! Exchanges, queues, and bindings every Peril process agrees on.

use peril_broker::{Broker, Channel, ExchangeKind, QueueOptions};
use peril_protocol::routing::{
    scoped_key, wildcard_key, ARMY_MOVES_PREFIX, DEAD_LETTER_QUEUE, EXCHANGE_PERIL_DIRECT,
    EXCHANGE_PERIL_DLX, EXCHANGE_PERIL_TOPIC, GAME_LOG_SLUG, PAUSE_KEY, WAR_RECOGNITIONS_PREFIX,
};
use peril_pubsub::{QueueBinding, SimpleQueueType};

use crate::PerilError;

/// Declares the three exchanges and the dead-letter queue. Safe to call
/// from every process on every start.
pub async fn declare_topology<B: Broker>(broker: &B) -> Result<(), PerilError> {
    let channel = broker.channel().await?;
    channel
        .declare_exchange(EXCHANGE_PERIL_DIRECT, ExchangeKind::Direct, true)
        .await?;
    channel
        .declare_exchange(EXCHANGE_PERIL_TOPIC, ExchangeKind::Topic, true)
        .await?;
    channel
        .declare_exchange(EXCHANGE_PERIL_DLX, ExchangeKind::Fanout, true)
        .await?;

    let durable = QueueOptions {
        durable: true,
        ..QueueOptions::default()
    };
    channel.declare_queue(DEAD_LETTER_QUEUE, &durable).await?;
    channel
        .bind_queue(DEAD_LETTER_QUEUE, EXCHANGE_PERIL_DLX, "")
        .await?;

    tracing::debug!("topology declared");
    Ok(())
}

/// `pause.<username>`: this client's copy of pause/resume broadcasts.
pub fn pause_binding(username: &str) -> QueueBinding {
    QueueBinding::new(
        EXCHANGE_PERIL_DIRECT,
        scoped_key(PAUSE_KEY, username),
        PAUSE_KEY,
        SimpleQueueType::Transient,
    )
}

/// `army_moves.<username>`: every player's moves, for this client.
pub fn army_moves_binding(username: &str) -> QueueBinding {
    QueueBinding::new(
        EXCHANGE_PERIL_TOPIC,
        scoped_key(ARMY_MOVES_PREFIX, username),
        wildcard_key(ARMY_MOVES_PREFIX),
        SimpleQueueType::Transient,
    )
}

/// `war`: one queue shared by all clients.
pub fn war_binding() -> QueueBinding {
    QueueBinding::new(
        EXCHANGE_PERIL_TOPIC,
        WAR_RECOGNITIONS_PREFIX,
        wildcard_key(WAR_RECOGNITIONS_PREFIX),
        SimpleQueueType::Durable,
    )
}

/// `game_logs`: consumed by the server.
pub fn game_logs_binding() -> QueueBinding {
    QueueBinding::new(
        EXCHANGE_PERIL_TOPIC,
        GAME_LOG_SLUG,
        wildcard_key(GAME_LOG_SLUG),
        SimpleQueueType::Durable,
    )
}

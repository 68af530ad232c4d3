//! Error types for the pub/sub layer.

use peril_broker::BrokerError;
use peril_protocol::ProtocolError;

/// Errors returned when setting up a subscription or publishing.
///
/// Errors that happen *inside* a running delivery loop never surface here:
/// they are resolved per message (see [`AckType`](crate::AckType)).
#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    /// Opening a channel on the broker failed.
    #[error("failed to open channel: {0}")]
    Channel(#[source] BrokerError),

    /// Declaring or binding the queue failed. Fatal for the subscription:
    /// it never starts.
    #[error("failed to bind queue {queue} to exchange {exchange}: {source}")]
    Bind {
        queue: String,
        exchange: String,
        #[source]
        source: BrokerError,
    },

    /// The queue was bound but consuming from it failed.
    #[error("failed to consume from queue {queue}: {source}")]
    Consume {
        queue: String,
        #[source]
        source: BrokerError,
    },

    /// The broker refused a publish.
    #[error("failed to publish to {exchange} with key {routing_key}: {source}")]
    Publish {
        exchange: String,
        routing_key: String,
        #[source]
        source: BrokerError,
    },

    /// The value could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

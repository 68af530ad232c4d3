//! Encoding and publishing typed messages.

use std::sync::Arc;

use peril_broker::{Channel, OutboundMessage};
use peril_protocol::Codec;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::PubSubError;

/// Publishes values encoded with one [`Codec`] over a shared broker channel.
///
/// Cheap to clone; clones share the channel and take turns on it. Use
/// [`with_codec`](Self::with_codec) to publish another encoding on the same
/// channel.
pub struct Publisher<Ch, C> {
    channel: Arc<Mutex<Ch>>,
    codec: C,
}

impl<Ch: Channel, C: Codec> Publisher<Ch, C> {
    pub fn new(channel: Ch, codec: C) -> Self {
        Self {
            channel: Arc::new(Mutex::new(channel)),
            codec,
        }
    }

    /// A publisher on the same channel that encodes with `codec`.
    pub fn with_codec<C2: Codec>(&self, codec: C2) -> Publisher<Ch, C2> {
        Publisher {
            channel: Arc::clone(&self.channel),
            codec,
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Encodes `value` and publishes it to `exchange` with `routing_key`,
    /// tagging the message with the codec's content type.
    ///
    /// Returns once the broker accepted the publish; there is no delivery
    /// confirmation.
    pub async fn publish<T>(
        &self,
        exchange: &str,
        routing_key: &str,
        value: &T,
    ) -> Result<(), PubSubError>
    where
        T: Serialize + Sync,
    {
        let message = OutboundMessage {
            body: self.codec.encode(value)?,
            content_type: self.codec.content_type().to_string(),
        };
        self.channel
            .lock()
            .await
            .publish(exchange, routing_key, message)
            .await
            .map_err(|source| PubSubError::Publish {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                source,
            })?;
        tracing::trace!(exchange, routing_key, content_type = self.codec.content_type(), "published");
        Ok(())
    }
}

impl<Ch, C: Clone> Clone for Publisher<Ch, C> {
    fn clone(&self) -> Self {
        Self {
            channel: Arc::clone(&self.channel),
            codec: self.codec.clone(),
        }
    }
}

//! Delivery outcomes and how they map onto broker acknowledgements.

use std::fmt;

use peril_broker::{BrokerError, Delivery};

/// What a handler wants done with the message it just processed.
///
/// The default is [`NackDiscard`](Self::NackDiscard): when in doubt, a
/// message is dead-lettered rather than silently redelivered forever.
///
/// ## Picking an outcome
///
/// | situation                                | outcome       |
/// |------------------------------------------|---------------|
/// | handled, or nothing to do                | `Ack`         |
/// | a dependency failed and may recover      | `NackRequeue` |
/// | the message itself can never be handled  | `NackDiscard` |
///
/// A requeue goes back on the same queue. The subscription's redelivery
/// cap (see [`capped`](Self::capped)) turns a requeue that keeps failing
/// into a discard, so a poisoned message ends up in the dead-letter queue
/// instead of looping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AckType {
    /// Processed; remove it from the queue.
    Ack,
    /// Not processed; put it back so it is delivered again.
    NackRequeue,
    /// Can never be processed; dead-letter it.
    #[default]
    NackDiscard,
}

impl AckType {
    /// Applies a redelivery cap: a requeue of a message that has already
    /// been redelivered `max` times becomes a discard.
    pub fn capped(self, redelivery_count: u32, max_redeliveries: Option<u32>) -> Self {
        match (self, max_redeliveries) {
            (Self::NackRequeue, Some(max)) if redelivery_count >= max => Self::NackDiscard,
            (ack, _) => ack,
        }
    }

    /// Settles `delivery` with the broker according to this outcome.
    pub async fn resolve<D: Delivery>(self, delivery: &D) -> Result<(), BrokerError> {
        match self {
            Self::Ack => delivery.ack().await,
            Self::NackRequeue => delivery.nack(true).await,
            Self::NackDiscard => delivery.nack(false).await,
        }
    }
}

impl fmt::Display for AckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ack => "ack",
            Self::NackRequeue => "nack-requeue",
            Self::NackDiscard => "nack-discard",
        };
        f.write_str(name)
    }
}

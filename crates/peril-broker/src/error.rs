//! Error types for the broker layer.
//!
//! Both broker implementations report failures through [`BrokerError`],
//! so code above the broker seam matches one enum whichever broker sits
//! underneath. The in-memory broker builds the named variants directly.
//! The AMQP broker (feature `amqp`) passes client errors through as the
//! `Amqp` variant.

/// Errors that can occur while talking to the broker.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// Dialing the broker failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The connection or channel was closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The named exchange has not been declared.
    #[error("exchange {0} not found")]
    ExchangeNotFound(String),

    /// The named queue has not been declared (or was deleted).
    #[error("queue {0} not found")]
    QueueNotFound(String),

    /// A declaration conflicts with an existing one, or a delivery was
    /// settled twice.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// The request itself was malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An error reported by the AMQP client.
    #[cfg(feature = "amqp")]
    #[error(transparent)]
    Amqp(#[from] lapin::Error),
}

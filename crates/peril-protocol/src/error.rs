//! Error types for the protocol layer.
//!
//! Each crate in Peril defines its own error enum. A `ProtocolError` always
//! means the problem is in turning values into bytes or bytes into values,
//! never in the broker or the game rules.

/// Boxed source error, so every codec reports through the same variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into bytes).
    #[error("encode failed: {0}")]
    Encode(#[source] BoxError),

    /// Deserialization failed (turning bytes into a Rust value).
    ///
    /// Common causes: malformed or truncated payloads, missing fields,
    /// or a payload produced by a different codec. A decode failure is
    /// terminal for that message: retrying the same bytes cannot succeed.
    #[error("decode failed: {0}")]
    Decode(#[source] BoxError),

    /// The value decoded but violates a protocol rule (e.g. an unknown
    /// unit rank typed on the command line).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ProtocolError {
    pub(crate) fn encode(err: impl Into<BoxError>) -> Self {
        Self::Encode(err.into())
    }

    pub(crate) fn decode(err: impl Into<BoxError>) -> Self {
        Self::Decode(err.into())
    }
}

//! Unified error type for Peril.

use peril_broker::BrokerError;
use peril_game::GameError;
use peril_protocol::ProtocolError;
use peril_pubsub::PubSubError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant lets `?` convert sub-crate
/// errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum PerilError {
    /// Dialing, channels, or topology declaration.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Binding, consuming, or publishing.
    #[error(transparent)]
    PubSub(#[from] PubSubError),

    /// A refused game command.
    #[error(transparent)]
    Game(#[from] GameError),

    /// Reading input or writing the log file.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// An environment override could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_broker_error() {
        let err: PerilError = BrokerError::ConnectionFailed("refused".into()).into();
        assert!(matches!(err, PerilError::Broker(_)));
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn test_from_game_error() {
        let err: PerilError = GameError::Paused.into();
        assert!(matches!(err, PerilError::Game(GameError::Paused)));
    }

    #[test]
    fn test_from_pubsub_error() {
        let err: PerilError = PubSubError::Protocol(ProtocolError::InvalidMessage("x".into())).into();
        assert!(matches!(err, PerilError::PubSub(_)));
    }
}

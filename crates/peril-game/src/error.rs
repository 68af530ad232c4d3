//! Error types for the game layer.

use peril_protocol::ProtocolError;

/// Errors returned by game commands.
///
/// Incoming broker events never fail; their results are expressed as
/// [`MoveOutcome`](crate::MoveOutcome) and [`WarResolution`](crate::WarResolution).
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// Spawning and moving are refused while the game is paused.
    #[error("the game is paused, you can not perform any actions")]
    Paused,

    /// The command was malformed.
    #[error("usage: {0}")]
    Usage(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The rank word did not name a unit rank.
    #[error(transparent)]
    InvalidRank(#[from] ProtocolError),

    /// The player doesn't own a unit with this id.
    #[error("unit {0} not found")]
    UnitNotFound(u32),

    /// The state actor has stopped.
    #[error("game state is unavailable")]
    Unavailable,
}

//! Wire protocol for Peril.
//!
//! This crate defines the "language" every Peril process speaks over the
//! broker:
//!
//! - **Types** ([`PlayingState`], [`ArmyMove`], [`RecognitionOfWar`],
//!   [`GameLog`], ...): the messages themselves.
//! - **Routing** ([`routing`]): exchange names and routing keys.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`], [`MsgPackCodec`]): how
//!   messages become bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! It knows nothing about brokers or queues; it only describes payloads.

mod codec;
mod error;
pub mod routing;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
#[cfg(feature = "msgpack")]
pub use codec::MsgPackCodec;
pub use error::{BoxError, ProtocolError};
pub use types::{
    ArmyMove, GameLog, Location, Player, PlayingState, RecognitionOfWar, Unit, UnitRank,
};

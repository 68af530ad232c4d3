//! Game state for one Peril player.
//!
//! The state is owned by a single actor task; everything else (the command
//! shell, the delivery loops) talks to it through a cloneable
//! [`GameHandle`].
//!
//! # Key types
//!
//! - [`GameState`]: units, pause flag, and the transition rules
//! - [`GameHandle`]: send commands to the running state actor
//! - [`MoveOutcome`] / [`WarResolution`]: what an incoming event did
//! - [`ClientCommand`] / [`ServerCommand`]: parsed shell input

mod actor;
mod command;
mod error;
mod state;
pub mod war;

pub use actor::GameHandle;
pub use command::{ClientCommand, ServerCommand};
pub use error::GameError;
pub use state::{GameState, GameStatus, MoveOutcome, WarOutcome, WarResolution};

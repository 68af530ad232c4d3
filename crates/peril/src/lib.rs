//! # Peril
//!
//! A turn-based strategy game whose players run as separate processes and
//! stay in sync through a message broker.
//!
//! - [`PerilClient`]: one player: game state plus pause, army-move, and
//!   war subscriptions.
//! - [`PerilServer`]: broadcasts pause/resume and archives game logs.
//! - [`handlers`]: the glue between broker deliveries and game outcomes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use peril::prelude::*;
//!
//! # async fn run() -> Result<(), PerilError> {
//! let broker = MemoryBroker::new();
//! let config = PerilConfig::default();
//! let server = PerilServer::start(&broker, &config).await?;
//! let alice = PerilClient::connect(&broker, "alice", &config).await?;
//!
//! alice.spawn("europe".into(), UnitRank::Infantry).await?;
//! server.pause().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
pub mod gamelog;
pub mod handlers;
mod logging;
mod server;
pub mod topology;

pub use client::PerilClient;
pub use config::PerilConfig;
pub use error::PerilError;
pub use logging::init_tracing;
pub use server::PerilServer;

pub mod prelude {
    pub use crate::{PerilClient, PerilConfig, PerilError, PerilServer};
    pub use peril_broker::{Broker, MemoryBroker};
    pub use peril_game::{ClientCommand, GameStatus, ServerCommand};
    pub use peril_protocol::{ArmyMove, GameLog, Location, PlayingState, Unit, UnitRank};

    #[cfg(feature = "amqp")]
    pub use peril_broker::AmqpBroker;
}

//! Typed publish/subscribe on top of [`peril_broker`].
//!
//! - [`declare_and_bind`]: declare a queue and bind it to an exchange.
//! - [`subscribe`]: run a [`Handler`] over every message of a queue,
//!   settling each delivery according to the [`AckType`] it returns.
//! - [`Publisher`]: encode a value with a [`Codec`](peril_protocol::Codec)
//!   and publish it.
//!
//! # Example
//!
//! ```no_run
//! use peril_broker::MemoryBroker;
//! use peril_protocol::{JsonCodec, PlayingState};
//! use peril_pubsub::{
//!     handler_fn, subscribe, AckType, QueueBinding, SimpleQueueType, SubscribeOptions,
//! };
//!
//! # async fn run() -> Result<(), peril_pubsub::PubSubError> {
//! let broker = MemoryBroker::new();
//! let binding = QueueBinding::new("peril_direct", "pause.alice", "pause", SimpleQueueType::Transient);
//! let sub = subscribe(
//!     &broker,
//!     &binding,
//!     JsonCodec,
//!     handler_fn(|state: PlayingState| async move {
//!         println!("paused: {}", state.is_paused);
//!         AckType::Ack
//!     }),
//!     SubscribeOptions::default(),
//! )
//! .await?;
//! sub.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod ack;
mod binder;
mod error;
mod handler;
mod publisher;
mod subscriber;

pub use ack::AckType;
pub use binder::{declare_and_bind, QueueBinding, SimpleQueueType};
pub use error::PubSubError;
pub use handler::{handler_fn, Handler, HandlerFn};
pub use publisher::Publisher;
pub use subscriber::{subscribe, SubscribeOptions, Subscription};

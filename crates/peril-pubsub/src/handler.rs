//! The message handler seam.

use std::future::Future;

use async_trait::async_trait;

use crate::AckType;

/// Processes one decoded message and decides how it is acknowledged.
///
/// Implement this directly for handlers that carry state, or wrap an async
/// closure with [`handler_fn`].
///
/// ## Why the bounds
///
/// - `Send + Sync + 'static`: the handler is moved into the spawned
///   delivery loop and lives as long as the subscription does.
/// - `T: Send + 'static`: the decoded message crosses an `.await` inside
///   that task, so it has to own its data.
///
/// ## What the return value means
///
/// The returned [`AckType`] is applied to the delivery right after the
/// handler finishes. A handler never touches the broker delivery itself,
/// so it cannot settle a message twice or forget to settle it.
#[async_trait]
pub trait Handler<T: Send + 'static>: Send + Sync + 'static {
    async fn handle(&self, message: T) -> AckType;
}

/// A [`Handler`] backed by a closure returning a future.
#[derive(Clone)]
pub struct HandlerFn<F>(F);

/// Wraps `f` so it can be passed wherever a [`Handler`] is expected.
///
/// ```
/// use peril_pubsub::{handler_fn, AckType};
/// use peril_protocol::PlayingState;
///
/// let handler = handler_fn(|state: PlayingState| async move {
///     println!("paused: {}", state.is_paused);
///     AckType::Ack
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F> {
    HandlerFn(f)
}

#[async_trait]
impl<T, F, Fut> Handler<T> for HandlerFn<F>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AckType> + Send + 'static,
{
    async fn handle(&self, message: T) -> AckType {
        (self.0)(message).await
    }
}

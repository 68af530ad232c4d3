//! Exchange names and routing keys shared by every Peril process.

/// Direct exchange carrying pause/resume broadcasts.
pub const EXCHANGE_PERIL_DIRECT: &str = "peril_direct";

/// Topic exchange carrying moves, war declarations, and game logs.
pub const EXCHANGE_PERIL_TOPIC: &str = "peril_topic";

/// Fanout exchange that receives every dead-lettered message.
pub const EXCHANGE_PERIL_DLX: &str = "peril_dlx";

/// Durable queue bound to [`EXCHANGE_PERIL_DLX`].
pub const DEAD_LETTER_QUEUE: &str = "peril_dlq";

/// Routing key for [`PlayingState`](crate::PlayingState) messages.
pub const PAUSE_KEY: &str = "pause";

pub const ARMY_MOVES_PREFIX: &str = "army_moves";

pub const WAR_RECOGNITIONS_PREFIX: &str = "war";

pub const GAME_LOG_SLUG: &str = "game_logs";

/// Builds `<prefix>.<username>`, the key (or queue name) scoped to one player.
pub fn scoped_key(prefix: &str, username: &str) -> String {
    format!("{prefix}.{username}")
}

/// Builds `<prefix>.*`, the binding pattern matching every player's key.
pub fn wildcard_key(prefix: &str) -> String {
    format!("{prefix}.*")
}

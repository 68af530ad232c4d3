//! Handlers that connect incoming broker messages to the game state.
//!
//! Each handler turns a game outcome into an [`AckType`], publishing a
//! follow-up message where the outcome calls for one.

use async_trait::async_trait;
use peril_broker::Channel;
use peril_game::{GameHandle, MoveOutcome};
use peril_protocol::routing::{scoped_key, EXCHANGE_PERIL_TOPIC, GAME_LOG_SLUG, WAR_RECOGNITIONS_PREFIX};
use peril_protocol::{ArmyMove, GameLog, JsonCodec, MsgPackCodec, PlayingState, RecognitionOfWar};
use peril_pubsub::{AckType, Handler, Publisher};

use crate::gamelog::GameLogArchive;

/// Applies pause/resume broadcasts.
pub struct PauseHandler {
    game: GameHandle,
}

impl PauseHandler {
    pub fn new(game: GameHandle) -> Self {
        Self { game }
    }
}

#[async_trait]
impl Handler<PlayingState> for PauseHandler {
    async fn handle(&self, state: PlayingState) -> AckType {
        // Pause state is last-write-wins; a stopped game has nothing to apply it to.
        if let Err(e) = self.game.handle_pause(state).await {
            tracing::warn!(player = %self.game.username(), error = %e, "pause not applied");
        }
        AckType::Ack
    }
}

/// Classifies other players' moves and declares war when they land on
/// local units.
pub struct MoveHandler<Ch> {
    game: GameHandle,
    publisher: Publisher<Ch, JsonCodec>,
}

impl<Ch: Channel> MoveHandler<Ch> {
    pub fn new(game: GameHandle, publisher: Publisher<Ch, JsonCodec>) -> Self {
        Self { game, publisher }
    }
}

#[async_trait]
impl<Ch: Channel> Handler<ArmyMove> for MoveHandler<Ch> {
    async fn handle(&self, army_move: ArmyMove) -> AckType {
        let mover = army_move.player.username.clone();
        let outcome = match self.game.handle_move(army_move).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(player = %self.game.username(), error = %e, "move not handled");
                return AckType::NackRequeue;
            }
        };

        match outcome {
            MoveOutcome::Safe => AckType::Ack,
            MoveOutcome::SamePlayer | MoveOutcome::Unknown => {
                tracing::debug!(player = %self.game.username(), %mover, ?outcome, "move discarded");
                AckType::NackDiscard
            }
            MoveOutcome::MakeWar(recognition) => {
                let key = scoped_key(WAR_RECOGNITIONS_PREFIX, self.game.username());
                match self
                    .publisher
                    .publish(EXCHANGE_PERIL_TOPIC, &key, &recognition)
                    .await
                {
                    Ok(()) => {
                        tracing::info!(player = %self.game.username(), attacker = %mover, "war declared");
                        AckType::Ack
                    }
                    Err(e) => {
                        tracing::warn!(player = %self.game.username(), error = %e, "war declaration not published");
                        AckType::NackRequeue
                    }
                }
            }
        }
    }
}

/// Resolves wars and reports concluded ones as game logs.
pub struct WarHandler<Ch> {
    game: GameHandle,
    publisher: Publisher<Ch, MsgPackCodec>,
}

impl<Ch: Channel> WarHandler<Ch> {
    pub fn new(game: GameHandle, publisher: Publisher<Ch, MsgPackCodec>) -> Self {
        Self { game, publisher }
    }
}

#[async_trait]
impl<Ch: Channel> Handler<RecognitionOfWar> for WarHandler<Ch> {
    async fn handle(&self, recognition: RecognitionOfWar) -> AckType {
        let resolution = match self.game.handle_war(recognition).await {
            Ok(resolution) => resolution,
            Err(e) => {
                tracing::warn!(player = %self.game.username(), error = %e, "war not handled");
                return AckType::NackRequeue;
            }
        };

        let (Some(message), Some(opponent)) =
            (resolution.log_message(), resolution.opponent.as_deref())
        else {
            tracing::debug!(player = %self.game.username(), outcome = ?resolution.outcome, "war ignored");
            return AckType::Ack;
        };

        let log = GameLog::new(self.game.username(), message);
        let key = scoped_key(GAME_LOG_SLUG, opponent);
        match self.publisher.publish(EXCHANGE_PERIL_TOPIC, &key, &log).await {
            Ok(()) => AckType::Ack,
            Err(e) => {
                tracing::warn!(player = %self.game.username(), error = %e, "game log not published");
                AckType::NackRequeue
            }
        }
    }
}

/// Archives game logs received by the server.
pub struct LogHandler {
    archive: GameLogArchive,
}

impl LogHandler {
    pub fn new(archive: GameLogArchive) -> Self {
        Self { archive }
    }
}

#[async_trait]
impl Handler<GameLog> for LogHandler {
    async fn handle(&self, log: GameLog) -> AckType {
        match self.archive.append(&log).await {
            Ok(()) => AckType::Ack,
            Err(e) => {
                tracing::warn!(path = %self.archive.path().display(), error = %e, "game log not archived");
                AckType::NackRequeue
            }
        }
    }
}

//! State actor: a Tokio task that owns a player's [`GameState`].
//!
//! The command shell and every delivery loop share one [`GameHandle`];
//! requests are serialized through the actor's channel, so no lock guards
//! the state.

use std::sync::Arc;

use peril_protocol::{ArmyMove, Location, PlayingState, RecognitionOfWar, Unit, UnitRank};
use tokio::sync::{mpsc, oneshot};

use crate::{GameError, GameState, GameStatus, MoveOutcome, WarResolution};

/// Bound on queued requests before senders wait.
const COMMAND_BUFFER: usize = 64;

enum GameCommand {
    Spawn {
        location: Location,
        rank: UnitRank,
        reply: oneshot::Sender<Result<Unit, GameError>>,
    },
    Move {
        to: Location,
        unit_ids: Vec<u32>,
        reply: oneshot::Sender<Result<ArmyMove, GameError>>,
    },
    Status {
        reply: oneshot::Sender<GameStatus>,
    },
    GetUnit {
        id: u32,
        reply: oneshot::Sender<Option<Unit>>,
    },
    Pause {
        state: PlayingState,
        reply: oneshot::Sender<()>,
    },
    HandleMove {
        army_move: ArmyMove,
        reply: oneshot::Sender<MoveOutcome>,
    },
    HandleWar {
        recognition: RecognitionOfWar,
        reply: oneshot::Sender<WarResolution>,
    },
    Shutdown,
}

/// Handle to a running state actor.
///
/// Cheap to clone. The actor stops when [`shutdown`](Self::shutdown) is
/// called or every handle is dropped.
#[derive(Clone)]
pub struct GameHandle {
    username: Arc<str>,
    sender: mpsc::Sender<GameCommand>,
}

impl GameHandle {
    /// Starts an actor for a fresh player.
    pub fn start(username: impl Into<String>) -> Self {
        Self::start_with(GameState::new(username))
    }

    /// Starts an actor that owns `state`.
    pub fn start_with(state: GameState) -> Self {
        let (sender, receiver) = mpsc::channel(COMMAND_BUFFER);
        let username: Arc<str> = Arc::from(state.username());
        tokio::spawn(GameActor { state, receiver }.run());
        Self { username, sender }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub async fn spawn(&self, location: Location, rank: UnitRank) -> Result<Unit, GameError> {
        self.request(|reply| GameCommand::Spawn {
            location,
            rank,
            reply,
        })
        .await?
    }

    pub async fn move_units(
        &self,
        to: Location,
        unit_ids: Vec<u32>,
    ) -> Result<ArmyMove, GameError> {
        self.request(|reply| GameCommand::Move {
            to,
            unit_ids,
            reply,
        })
        .await?
    }

    pub async fn status(&self) -> Result<GameStatus, GameError> {
        self.request(|reply| GameCommand::Status { reply }).await
    }

    pub async fn get_unit(&self, id: u32) -> Result<Option<Unit>, GameError> {
        self.request(|reply| GameCommand::GetUnit { id, reply }).await
    }

    pub async fn handle_pause(&self, state: PlayingState) -> Result<(), GameError> {
        self.request(|reply| GameCommand::Pause { state, reply }).await
    }

    pub async fn handle_move(&self, army_move: ArmyMove) -> Result<MoveOutcome, GameError> {
        self.request(|reply| GameCommand::HandleMove { army_move, reply })
            .await
    }

    pub async fn handle_war(
        &self,
        recognition: RecognitionOfWar,
    ) -> Result<WarResolution, GameError> {
        self.request(|reply| GameCommand::HandleWar { recognition, reply })
            .await
    }

    /// Tells the actor to stop. Later requests fail with
    /// [`GameError::Unavailable`].
    pub async fn shutdown(&self) -> Result<(), GameError> {
        self.sender
            .send(GameCommand::Shutdown)
            .await
            .map_err(|_| GameError::Unavailable)
    }

    async fn request<R>(
        &self,
        command: impl FnOnce(oneshot::Sender<R>) -> GameCommand,
    ) -> Result<R, GameError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| GameError::Unavailable)?;
        reply_rx.await.map_err(|_| GameError::Unavailable)
    }
}

struct GameActor {
    state: GameState,
    receiver: mpsc::Receiver<GameCommand>,
}

impl GameActor {
    async fn run(mut self) {
        tracing::info!(player = %self.state.username(), "game state started");

        while let Some(command) = self.receiver.recv().await {
            match command {
                GameCommand::Spawn {
                    location,
                    rank,
                    reply,
                } => {
                    let _ = reply.send(self.state.spawn(location, rank));
                }
                GameCommand::Move {
                    to,
                    unit_ids,
                    reply,
                } => {
                    let _ = reply.send(self.state.move_units(to, &unit_ids));
                }
                GameCommand::Status { reply } => {
                    let _ = reply.send(self.state.status());
                }
                GameCommand::GetUnit { id, reply } => {
                    let _ = reply.send(self.state.get_unit(id));
                }
                GameCommand::Pause { state, reply } => {
                    self.state.handle_pause(state);
                    let _ = reply.send(());
                }
                GameCommand::HandleMove { army_move, reply } => {
                    let _ = reply.send(self.state.handle_move(&army_move));
                }
                GameCommand::HandleWar { recognition, reply } => {
                    let _ = reply.send(self.state.handle_war(&recognition));
                }
                GameCommand::Shutdown => break,
            }
        }

        tracing::info!(player = %self.state.username(), "game state stopped");
    }
}

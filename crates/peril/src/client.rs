//! A player's process: game state plus its three subscriptions.

use peril_broker::Broker;
use peril_game::{GameHandle, GameStatus};
use peril_protocol::routing::{scoped_key, ARMY_MOVES_PREFIX, EXCHANGE_PERIL_TOPIC, GAME_LOG_SLUG};
use peril_protocol::{ArmyMove, GameLog, JsonCodec, Location, MsgPackCodec, Unit, UnitRank};
use peril_pubsub::{subscribe, Publisher, Subscription};
use tokio_util::sync::CancellationToken;

use crate::handlers::{MoveHandler, PauseHandler, WarHandler};
use crate::topology::{army_moves_binding, declare_topology, pause_binding, war_binding};
use crate::{PerilConfig, PerilError};

/// Filler lines published by the `spam` command.
const SPAM_MESSAGES: [&str; 5] = [
    "Never interrupt your enemy when he is making a mistake.",
    "The hardest thing of all for a soldier is to retreat.",
    "A soldier will fight long and hard for a bit of colored ribbon.",
    "It should be our care to march on the flank.",
    "Victory belongs to the most persevering.",
];

/// A connected Peril player.
///
/// Holds the player's [`GameHandle`] and keeps the pause, army-move, and
/// war subscriptions running until [`shutdown`](Self::shutdown).
pub struct PerilClient<B: Broker> {
    game: GameHandle,
    moves: Publisher<B::Channel, JsonCodec>,
    logs: Publisher<B::Channel, MsgPackCodec>,
    subscriptions: Vec<Subscription>,
    cancel: CancellationToken,
}

impl<B: Broker> PerilClient<B> {
    /// Starts the player's state and subscribes to pause, army-move, and
    /// war queues. Any setup failure is returned and nothing keeps running.
    pub async fn connect(
        broker: &B,
        username: &str,
        config: &PerilConfig,
    ) -> Result<Self, PerilError> {
        if config.declare_topology {
            declare_topology(broker).await?;
        }

        let game = GameHandle::start(username);
        let moves = Publisher::new(broker.channel().await?, JsonCodec);
        let logs = moves.with_codec(MsgPackCodec);
        let cancel = CancellationToken::new();
        let options = config.subscribe_options().with_cancel(cancel.clone());

        let mut client = Self {
            game,
            moves,
            logs,
            subscriptions: Vec::with_capacity(3),
            cancel,
        };
        if let Err(e) = client.subscribe_all(broker, options).await {
            client.shutdown().await;
            return Err(e);
        }

        tracing::info!(player = %username, "client connected");
        Ok(client)
    }

    async fn subscribe_all(
        &mut self,
        broker: &B,
        options: peril_pubsub::SubscribeOptions,
    ) -> Result<(), PerilError> {
        let username = self.game.username().to_string();
        self.subscriptions.push(
            subscribe(
                broker,
                &pause_binding(&username),
                JsonCodec,
                PauseHandler::new(self.game.clone()),
                options.clone(),
            )
            .await?,
        );
        self.subscriptions.push(
            subscribe(
                broker,
                &army_moves_binding(&username),
                JsonCodec,
                MoveHandler::new(self.game.clone(), self.moves.clone()),
                options.clone(),
            )
            .await?,
        );
        self.subscriptions.push(
            subscribe(
                broker,
                &war_binding(),
                JsonCodec,
                WarHandler::new(self.game.clone(), self.logs.clone()),
                options,
            )
            .await?,
        );
        Ok(())
    }

    pub fn username(&self) -> &str {
        self.game.username()
    }

    pub fn game(&self) -> &GameHandle {
        &self.game
    }

    pub async fn spawn(&self, location: Location, rank: UnitRank) -> Result<Unit, PerilError> {
        Ok(self.game.spawn(location, rank).await?)
    }

    /// Moves units locally, then announces the move on
    /// `army_moves.<username>`.
    pub async fn move_units(
        &self,
        to: Location,
        unit_ids: Vec<u32>,
    ) -> Result<ArmyMove, PerilError> {
        let army_move = self.game.move_units(to, unit_ids).await?;
        let key = scoped_key(ARMY_MOVES_PREFIX, self.username());
        self.moves
            .publish(EXCHANGE_PERIL_TOPIC, &key, &army_move)
            .await?;
        Ok(army_move)
    }

    pub async fn status(&self) -> Result<GameStatus, PerilError> {
        Ok(self.game.status().await?)
    }

    pub async fn get_unit(&self, id: u32) -> Result<Option<Unit>, PerilError> {
        Ok(self.game.get_unit(id).await?)
    }

    /// Publishes `count` filler game logs under this player's name.
    pub async fn spam(&self, count: u32) -> Result<(), PerilError> {
        let key = scoped_key(GAME_LOG_SLUG, self.username());
        for line in SPAM_MESSAGES.iter().cycle().take(count as usize) {
            let log = GameLog::new(self.username(), *line);
            self.logs.publish(EXCHANGE_PERIL_TOPIC, &key, &log).await?;
        }
        tracing::info!(player = %self.username(), count, "spam published");
        Ok(())
    }

    /// Stops every subscription and the game state.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for subscription in self.subscriptions {
            subscription.join().await;
        }
        if let Err(e) = self.game.shutdown().await {
            tracing::debug!(error = %e, "game state already stopped");
        }
        tracing::info!(player = %self.game.username(), "client shut down");
    }
}

//! The game server: pause/resume broadcasts and the log archive.

use peril_broker::Broker;
use peril_game::ServerCommand;
use peril_protocol::routing::{EXCHANGE_PERIL_DIRECT, PAUSE_KEY};
use peril_protocol::{JsonCodec, MsgPackCodec, PlayingState};
use peril_pubsub::{subscribe, Publisher, Subscription};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::gamelog::GameLogArchive;
use crate::handlers::LogHandler;
use crate::topology::{declare_topology, game_logs_binding};
use crate::{PerilConfig, PerilError};

/// A running Peril server.
pub struct PerilServer<B: Broker> {
    publisher: Publisher<B::Channel, JsonCodec>,
    logs: Subscription,
}

impl<B: Broker> PerilServer<B> {
    /// Subscribes to `game_logs` and prepares the pause publisher.
    pub async fn start(broker: &B, config: &PerilConfig) -> Result<Self, PerilError> {
        if config.declare_topology {
            declare_topology(broker).await?;
        }

        let publisher = Publisher::new(broker.channel().await?, JsonCodec);
        let logs = subscribe(
            broker,
            &game_logs_binding(),
            MsgPackCodec,
            LogHandler::new(GameLogArchive::new(&config.log_file)),
            config.subscribe_options(),
        )
        .await?;

        tracing::info!(log_file = %config.log_file.display(), "server started");
        Ok(Self { publisher, logs })
    }

    pub async fn pause(&self) -> Result<(), PerilError> {
        self.broadcast(true).await
    }

    pub async fn resume(&self) -> Result<(), PerilError> {
        self.broadcast(false).await
    }

    async fn broadcast(&self, is_paused: bool) -> Result<(), PerilError> {
        self.publisher
            .publish(EXCHANGE_PERIL_DIRECT, PAUSE_KEY, &PlayingState { is_paused })
            .await?;
        tracing::info!(is_paused, "pause state broadcast");
        Ok(())
    }

    /// Reads commands from `input` until `quit` or end of input.
    ///
    /// A command that fails is reported on `output` and the loop moves on to
    /// the next line. Only I/O errors on the shell itself end it early.
    pub async fn run_shell<R, W>(&self, input: R, mut output: W) -> Result<(), PerilError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        loop {
            output.write_all(b"> ").await?;
            output.flush().await?;
            let Some(line) = lines.next_line().await? else {
                return Ok(());
            };

            let reply = match ServerCommand::parse(&line) {
                Ok(None) => continue,
                Ok(Some(ServerCommand::Quit)) => {
                    output.write_all(b"Exiting...\n").await?;
                    output.flush().await?;
                    return Ok(());
                }
                Ok(Some(ServerCommand::Help)) => format!("{}\n", ServerCommand::HELP),
                Ok(Some(command)) => self.execute(command).await,
                Err(e) => format!("{e}\n"),
            };
            output.write_all(reply.as_bytes()).await?;
        }
    }

    async fn execute(&self, command: ServerCommand) -> String {
        let (banner, result) = match command {
            ServerCommand::Pause => ("Sending pause message", self.pause().await),
            ServerCommand::Resume => ("Sending resume message", self.resume().await),
            ServerCommand::Help | ServerCommand::Quit => return String::new(),
        };
        match result {
            Ok(()) => format!("{banner}\n"),
            Err(e) => {
                tracing::warn!(error = %e, "broadcast failed");
                format!("{banner}\n{e}\n")
            }
        }
    }

    pub async fn shutdown(self) {
        self.logs.shutdown().await;
        tracing::info!("server shut down");
    }
}

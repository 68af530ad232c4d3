//! Interactive Peril client.

use std::process::ExitCode;

use peril::prelude::*;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

type Input = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> ExitCode {
    peril::init_tracing();
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "peril client failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), PerilError> {
    let config = PerilConfig::from_env()?;
    let broker = AmqpBroker::dial(&config.broker_url).await?;
    println!("Starting Peril client...");

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let Some(username) = read_username(&mut input).await? else {
        return Ok(());
    };

    let client = PerilClient::connect(&broker, &username, &config).await?;
    println!("{}", ClientCommand::HELP);

    loop {
        prompt("> ").await?;
        let line = tokio::select! {
            line = input.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let command = match ClientCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        if command == ClientCommand::Quit {
            println!("goodbye");
            break;
        }
        if let Err(e) = execute(&client, command).await {
            println!("{e}");
        }
    }

    client.shutdown().await;
    broker.close().await?;
    Ok(())
}

async fn execute(client: &PerilClient<AmqpBroker>, command: ClientCommand) -> Result<(), PerilError> {
    match command {
        ClientCommand::Spawn { location, rank } => {
            let unit = client.spawn(location, rank).await?;
            println!("Spawned a(n) {} in {} with id {}", unit.rank, unit.location, unit.id);
        }
        ClientCommand::Move { to, unit_ids } => {
            let army_move = client.move_units(to, unit_ids).await?;
            println!(
                "Moved {} units to {}",
                army_move.units.len(),
                army_move.to_location
            );
        }
        ClientCommand::Status => println!("{}", client.status().await?),
        ClientCommand::Spam { count } => {
            client.spam(count).await?;
            println!("Published {count} logs");
        }
        ClientCommand::Help => println!("{}", ClientCommand::HELP),
        ClientCommand::Quit => {}
    }
    Ok(())
}

async fn read_username(input: &mut Input) -> Result<Option<String>, PerilError> {
    loop {
        prompt("Please enter your username: ").await?;
        let Some(line) = input.next_line().await? else {
            return Ok(None);
        };
        let name = line.trim();
        if !name.is_empty() {
            return Ok(Some(name.to_string()));
        }
    }
}

async fn prompt(text: &str) -> Result<(), PerilError> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(text.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

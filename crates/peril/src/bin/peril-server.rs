//! Peril server: pause/resume control and game log archiving.

use std::process::ExitCode;

use peril::prelude::*;
use tokio::io::BufReader;

#[tokio::main]
async fn main() -> ExitCode {
    peril::init_tracing();
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "peril server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), PerilError> {
    let config = PerilConfig::from_env()?;
    let broker = AmqpBroker::dial(&config.broker_url).await?;
    let server = PerilServer::start(&broker, &config).await?;
    println!("Starting Peril server...");
    println!("{}", ServerCommand::HELP);

    let input = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = server.run_shell(input, tokio::io::stdout()) => result?,
        _ = tokio::signal::ctrl_c() => {}
    }

    server.shutdown().await;
    broker.close().await?;
    Ok(())
}

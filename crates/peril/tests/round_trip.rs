//! Server and clients sharing one in-memory broker.

use std::path::{Path, PathBuf};
use std::time::Duration;

use peril::prelude::*;
use peril_game::GameError;
use peril_broker::{Channel, ExchangeKind};
use peril_protocol::routing::DEAD_LETTER_QUEUE;

fn log_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("peril-{name}-{}.log", std::process::id()))
}

async fn within_deadline(work: impl std::future::Future<Output = ()>) {
    let result = tokio::time::timeout(Duration::from_secs(2), work).await;
    assert!(result.is_ok(), "condition not reached in time");
}

async fn wait_until_paused(client: &PerilClient<MemoryBroker>, paused: bool) {
    within_deadline(async {
        while client.status().await.unwrap().is_paused != paused {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}

async fn wait_for_log(path: &Path, check: impl Fn(&str) -> bool) {
    within_deadline(async {
        while !check(&read_log(path).await) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}

async fn read_log(path: &Path) -> String {
    tokio::fs::read_to_string(path).await.unwrap_or_default()
}

#[tokio::test]
async fn test_pause_reaches_every_client() {
    let broker = MemoryBroker::new();
    let config = PerilConfig::default().with_log_file(log_path("pause"));
    let server = PerilServer::start(&broker, &config).await.unwrap();
    let alice = PerilClient::connect(&broker, "alice", &config).await.unwrap();
    let bob = PerilClient::connect(&broker, "bob", &config).await.unwrap();

    server.pause().await.unwrap();
    wait_until_paused(&alice, true).await;
    wait_until_paused(&bob, true).await;
    assert!(matches!(
        alice.spawn("europe".into(), UnitRank::Infantry).await,
        Err(PerilError::Game(GameError::Paused))
    ));

    server.resume().await.unwrap();
    wait_until_paused(&alice, false).await;
    alice.spawn("europe".into(), UnitRank::Infantry).await.unwrap();

    alice.shutdown().await;
    bob.shutdown().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_war_ends_up_in_the_server_log() {
    let path = log_path("war");
    let _ = tokio::fs::remove_file(&path).await;
    let broker = MemoryBroker::new();
    let config = PerilConfig::default().with_log_file(&path);
    let server = PerilServer::start(&broker, &config).await.unwrap();
    let alice = PerilClient::connect(&broker, "alice", &config).await.unwrap();
    let bob = PerilClient::connect(&broker, "bob", &config).await.unwrap();

    alice.spawn("europe".into(), UnitRank::Infantry).await.unwrap();
    alice.spawn("europe".into(), UnitRank::Cavalry).await.unwrap();
    bob.spawn("asia".into(), UnitRank::Artillery).await.unwrap();
    let army_move = bob.move_units("europe".into(), vec![1]).await.unwrap();
    assert_eq!(army_move.player.username, "bob");

    wait_for_log(&path, |log| log.contains("bob won a war against alice")).await;
    let contents = read_log(&path).await;
    assert_eq!(contents.lines().count(), 1);

    // bob's own move echoed back to him is dead-lettered.
    within_deadline(async {
        while broker.queue_len(DEAD_LETTER_QUEUE) < Some(1) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;

    alice.shutdown().await;
    bob.shutdown().await;
    server.shutdown().await;
    let _ = tokio::fs::remove_file(&path).await;
}

#[tokio::test]
async fn test_spam_is_archived() {
    let path = log_path("spam");
    let _ = tokio::fs::remove_file(&path).await;
    let broker = MemoryBroker::new();
    let config = PerilConfig::default().with_log_file(&path);
    let server = PerilServer::start(&broker, &config).await.unwrap();
    let carol = PerilClient::connect(&broker, "carol", &config).await.unwrap();

    carol.spam(7).await.unwrap();
    wait_for_log(&path, |log| log.lines().count() == 7).await;
    assert!(read_log(&path).await.lines().all(|line| line.contains(" carol: ")));

    carol.shutdown().await;
    server.shutdown().await;
    let _ = tokio::fs::remove_file(&path).await;
}

#[tokio::test]
async fn test_client_setup_fails_without_topology() {
    let broker = MemoryBroker::new();
    let config = PerilConfig::default().with_declare_topology(false);
    let result = PerilClient::connect(&broker, "alice", &config).await;
    assert!(matches!(result, Err(PerilError::PubSub(_))));
}

#[tokio::test]
async fn test_shutdown_removes_transient_queues() {
    let broker = MemoryBroker::new();
    let config = PerilConfig::default();
    let alice = PerilClient::connect(&broker, "alice", &config).await.unwrap();
    assert_eq!(broker.queue_len("pause.alice"), Some(0));
    assert_eq!(broker.queue_len("army_moves.alice"), Some(0));

    alice.shutdown().await;
    assert_eq!(broker.queue_len("pause.alice"), None);
    assert_eq!(broker.queue_len("army_moves.alice"), None);
    assert_eq!(broker.queue_len("war"), Some(0));
}

#[tokio::test]
async fn test_failed_broadcast_keeps_the_shell_running() {
    // Only the topic exchange exists, so pause broadcasts have nowhere to go.
    let broker = MemoryBroker::new();
    broker
        .channel()
        .await
        .unwrap()
        .declare_exchange("peril_topic", ExchangeKind::Topic, true)
        .await
        .unwrap();
    let config = PerilConfig::default()
        .with_declare_topology(false)
        .with_log_file(log_path("shell"));
    let server = PerilServer::start(&broker, &config).await.unwrap();

    let mut output = Vec::new();
    let input: &[u8] = b"pause\nresume\nhelp\nquit\nstatus\n";
    server.run_shell(input, &mut output).await.unwrap();

    let output = String::from_utf8(output).unwrap();
    assert_eq!(output.matches("failed to publish").count(), 2);
    assert!(output.contains("Sending resume message"));
    assert!(output.contains(ServerCommand::HELP));
    assert!(output.ends_with("Exiting...\n"));
    server.shutdown().await;
}

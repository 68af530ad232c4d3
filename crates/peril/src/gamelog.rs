//! Append-only archive of game logs.

use std::path::{Path, PathBuf};

use chrono::SecondsFormat;
use peril_protocol::GameLog;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Renders one archive line: `<RFC3339 timestamp> <username>: <message>`.
pub fn format_log_line(log: &GameLog) -> String {
    format!(
        "{} {}: {}\n",
        log.current_time.to_rfc3339_opts(SecondsFormat::Secs, true),
        log.username,
        log.message
    )
}

/// Appends game logs to a text file.
///
/// The file is opened in append mode for each write and closed right
/// after, so rotating or deleting it between writes is safe.
#[derive(Debug, Clone)]
pub struct GameLogArchive {
    path: PathBuf,
}

impl GameLogArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, log: &GameLog) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(format_log_line(log).as_bytes()).await?;
        file.flush().await?;
        tracing::debug!(path = %self.path.display(), username = %log.username, "game log archived");
        Ok(())
    }
}

use crate::services::stager::STAGING_PREFIX;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::time::sleep;

/// Removes staging directories left behind by a crash or a killed process.
/// Live requests clean up after themselves; this only catches leftovers.
pub struct StagingSweeper {
    staging_dir: PathBuf,
    max_age: Duration,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl StagingSweeper {
    pub fn new(
        staging_dir: impl Into<PathBuf>,
        max_age: Duration,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            staging_dir: staging_dir.into(),
            max_age,
            interval,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Staging sweeper started ({})", self.staging_dir.display());

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Staging sweeper shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    match sweep(&self.staging_dir, self.max_age).await {
                        Ok(0) => {}
                        Ok(n) => tracing::info!("🧹 Removed {} stale staging directories", n),
                        Err(e) => tracing::warn!("Staging sweep failed: {}", e),
                    }
                }
            }
        }
    }
}

/// Deletes `relay-*` directories older than `max_age`; returns how many went
pub async fn sweep(staging_dir: &Path, max_age: Duration) -> std::io::Result<usize> {
    let mut entries = match tokio::fs::read_dir(staging_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
            continue;
        }
        let metadata = entry.metadata().await?;
        if !metadata.is_dir() {
            continue;
        }
        let age = metadata
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }

        match tokio::fs::remove_dir_all(entry.path()).await {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!("Could not remove {}: {}", entry.path().display(), e),
        }
    }
    Ok(removed)
}

use crate::models::{RemoteFileRef, StagedFile};
use crate::services::error::RelayError;
use crate::services::file_store::FileStore;
use crate::services::with_timeout;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Prefix of every per-request staging directory
pub const STAGING_PREFIX: &str = "relay-";

/// Downloads source files into per-request staging directories
pub struct Stager {
    store: Arc<dyn FileStore>,
    staging_dir: PathBuf,
    chunk_size: u64,
    timeout: Duration,
}

impl Stager {
    pub fn new(
        store: Arc<dyn FileStore>,
        staging_dir: impl Into<PathBuf>,
        chunk_size: u64,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            staging_dir: staging_dir.into(),
            chunk_size: chunk_size.max(1),
            timeout,
        }
    }

    /// Pulls chunks until the store reports completion. On error the
    /// staging directory is dropped with whatever was written.
    pub async fn stage(&self, file: &RemoteFileRef, filename: &str) -> Result<StagedFile, RelayError> {
        let io_err = |e: std::io::Error| RelayError::StoreIo(format!("staging write failed: {}", e));

        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .map_err(io_err)?;
        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.staging_dir)
            .map_err(io_err)?;
        let path = dir.path().join(filename);
        let mut out = tokio::fs::File::create(&path).await.map_err(io_err)?;

        let mut offset: u64 = 0;
        loop {
            let chunk = with_timeout(
                self.timeout,
                "Drive download",
                self.store.download_chunk(&file.id, offset, self.chunk_size),
            )
            .await
            .map_err(RelayError::store_io)?;

            out.write_all(&chunk.data).await.map_err(io_err)?;
            offset += chunk.data.len() as u64;
            tracing::debug!("Downloaded {} bytes of {} ({})", offset, filename, file.id);

            if chunk.done {
                break;
            }
            if chunk.data.is_empty() {
                return Err(RelayError::StoreIo(format!(
                    "download of {} stalled at {} bytes",
                    file.id, offset
                )));
            }
        }

        out.flush().await.map_err(io_err)?;
        out.sync_all().await.map_err(io_err)?;
        drop(out);

        tracing::info!("📥 Staged {} ({} bytes) at {}", filename, offset, path.display());
        Ok(StagedFile::new(dir, path, offset))
    }
}

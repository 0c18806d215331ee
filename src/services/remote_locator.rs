use crate::models::RemoteFileRef;
use crate::services::error::RelayError;
use crate::services::file_store::FileStore;
use crate::services::with_timeout;
use std::sync::Arc;
use std::time::Duration;

/// Finds source files by exact name in the configured Drive folder
pub struct RemoteLocator {
    store: Arc<dyn FileStore>,
    folder_id: String,
    timeout: Duration,
}

impl RemoteLocator {
    pub fn new(store: Arc<dyn FileStore>, folder_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            store,
            folder_id: folder_id.into(),
            timeout,
        }
    }

    /// First match in store order, or `None`. Extra matches are reported, never merged.
    pub async fn locate(&self, filename: &str) -> Result<Option<RemoteFileRef>, RelayError> {
        let matches = with_timeout(
            self.timeout,
            "Drive list",
            self.store.list_files(&self.folder_id, filename),
        )
        .await
        .map_err(RelayError::store_io)?;

        if matches.len() > 1 {
            tracing::warn!(
                "{} files named '{}' in folder {}; using the first ({})",
                matches.len(),
                filename,
                self.folder_id,
                matches[0].id
            );
        }

        Ok(matches.into_iter().next())
    }

    /// Deletes the source file after it has been relayed
    pub async fn remove(&self, file: &RemoteFileRef) -> Result<(), RelayError> {
        with_timeout(self.timeout, "Drive delete", self.store.delete(&file.id))
            .await
            .map_err(RelayError::store_io)
    }
}

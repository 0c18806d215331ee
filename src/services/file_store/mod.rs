use crate::models::RemoteFileRef;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

pub mod google_drive;

/// One ranged read of a file's content
#[derive(Debug, Clone)]
pub struct MediaChunk {
    pub data: Bytes,
    /// Set once the store reports there is nothing left to read
    pub done: bool,
}

/// Cloud file repository holding the source files
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Non-trashed files in `parent_id` named exactly `name`, in store order
    async fn list_files(&self, parent_id: &str, name: &str) -> Result<Vec<RemoteFileRef>>;

    /// Reads up to `len` bytes starting at `offset`
    async fn download_chunk(&self, file_id: &str, offset: u64, len: u64) -> Result<MediaChunk>;

    async fn delete(&self, file_id: &str) -> Result<()>;
}

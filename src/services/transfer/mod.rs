use crate::models::AccountCredential;
use anyhow::Result;
use std::path::Path;
use std::time::Duration;

pub mod sftp;

/// Opens authenticated sessions to the destination server.
/// Implementations are blocking; callers run them on the blocking pool.
pub trait TransferConnector: Send + Sync {
    fn connect(
        &self,
        host: &str,
        port: u16,
        credential: &AccountCredential,
        timeout: Duration,
    ) -> Result<Box<dyn TransferSession>>;
}

pub trait TransferSession: Send {
    /// Copies a local file to `remote_path`, returning the bytes written
    fn put(&mut self, local: &Path, remote_path: &str) -> Result<u64>;

    /// File names in a remote directory
    fn list(&mut self, remote_dir: &str) -> Result<Vec<String>>;

    fn close(&mut self) -> Result<()>;
}

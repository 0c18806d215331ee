use crate::models::{AccountCredential, StagedFile};
use crate::services::error::RelayError;
use crate::services::transfer::{TransferConnector, TransferSession};
use anyhow::anyhow;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub remote_path: String,
    pub bytes: u64,
    /// `None` when verification is off or the listing itself failed
    pub verified: Option<bool>,
}

/// Copies staged files to the fixed destination directory
pub struct TransferClient {
    connector: Arc<dyn TransferConnector>,
    host: String,
    port: u16,
    remote_dir: String,
    verify: bool,
    timeout: Duration,
}

fn put_and_verify(
    session: &mut dyn TransferSession,
    local: &Path,
    remote_dir: &str,
    remote_path: &str,
    filename: &str,
    verify: bool,
) -> anyhow::Result<TransferReport> {
    let bytes = session.put(local, remote_path)?;

    let verified = if verify {
        match session.list(remote_dir) {
            Ok(names) => {
                let present = names.iter().any(|n| n == filename);
                if !present {
                    tracing::warn!(
                        "⚠️  {} not listed in {} after a successful put",
                        filename,
                        remote_dir
                    );
                }
                Some(present)
            }
            Err(e) => {
                tracing::warn!("Could not list {} to verify upload: {}", remote_dir, e);
                None
            }
        }
    } else {
        None
    };

    Ok(TransferReport {
        remote_path: remote_path.to_string(),
        bytes,
        verified,
    })
}

impl TransferClient {
    pub fn new(
        connector: Arc<dyn TransferConnector>,
        host: impl Into<String>,
        port: u16,
        remote_dir: impl Into<String>,
        verify: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            connector,
            host: host.into(),
            port,
            remote_dir: remote_dir.into(),
            verify,
            timeout,
        }
    }

    pub fn remote_path_for(&self, filename: &str) -> String {
        format!("{}/{}", self.remote_dir.trim_end_matches('/'), filename)
    }

    /// The put's own acknowledgment decides the outcome; a verification
    /// mismatch only logs a warning. The timeout bounds each SFTP operation,
    /// not the whole upload, and the call returns only once the session has
    /// been closed.
    pub async fn transfer(
        &self,
        credential: &AccountCredential,
        staged: &StagedFile,
        filename: &str,
    ) -> Result<TransferReport, RelayError> {
        let connector = self.connector.clone();
        let host = self.host.clone();
        let port = self.port;
        let credential = credential.clone();
        let local = staged.path().to_path_buf();
        let remote_dir = self.remote_dir.clone();
        let remote_path = self.remote_path_for(filename);
        let filename = filename.to_string();
        let verify = self.verify;
        let timeout = self.timeout;

        let mut job = tokio::task::spawn_blocking(move || {
            let mut session = connector.connect(&host, port, &credential, timeout)?;
            let result = put_and_verify(
                session.as_mut(),
                &local,
                &remote_dir,
                &remote_path,
                &filename,
                verify,
            );
            if let Err(e) = session.close() {
                tracing::warn!("Failed to close SFTP session to {}: {}", host, e);
            }
            result
        });

        // The session enforces `timeout` per operation, so the job finishes
        // on its own and its result says whether the file landed.
        let joined = match tokio::time::timeout(self.timeout, &mut job).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!(
                    "⏳ Transfer to {}:{} still running after {:?}, waiting for it to finish",
                    self.host,
                    self.port,
                    self.timeout
                );
                job.await
            }
        };
        let report = joined
            .map_err(|join_err| anyhow!("transfer task failed: {}", join_err))
            .and_then(|result| result)
            .map_err(RelayError::transfer)?;

        tracing::info!(
            "📤 Uploaded {} bytes to {}:{}{}",
            report.bytes,
            self.host,
            self.port,
            report.remote_path
        );
        Ok(report)
    }
}

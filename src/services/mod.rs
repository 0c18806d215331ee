use anyhow::anyhow;
use std::future::Future;
use std::time::Duration;

pub mod account_resolver;
pub mod diagnostics;
pub mod error;
pub mod file_store;
pub mod orchestrator;
pub mod remote_locator;
pub mod retry;
pub mod stager;
pub mod staging_sweeper;
pub mod status_recorder;
pub mod tabular;
pub mod transfer;
pub mod transfer_client;

#[cfg(test)]
pub(crate) mod testing;

/// Bounds one external call. Expiry becomes an ordinary error for the caller
/// to classify.
pub(crate) async fn with_timeout<T>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow!("{} timed out after {:?}", what, limit)),
    }
}

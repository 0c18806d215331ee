use crate::config::RelayConfig;
use crate::models::{
    AccountCredential, RelayResponse, RelayStatus, RemoteFileRef, StagedFile, TransferRequest,
    UploadStatus, ValidatedRequest,
};
use crate::services::account_resolver::AccountResolver;
use crate::services::error::RelayError;
use crate::services::file_store::FileStore;
use crate::services::remote_locator::RemoteLocator;
use crate::services::retry::RetryPolicy;
use crate::services::stager::Stager;
use crate::services::status_recorder::StatusRecorder;
use crate::services::tabular::TabularStore;
use crate::services::transfer::TransferConnector;
use crate::services::transfer_client::{TransferClient, TransferReport};
use crate::utils::validation::validate_request;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Pipeline states, in the only order they may be visited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Validating,
    ResolvingAccount,
    LocatingFile,
    Staging,
    Transferring,
    Recording,
    Done(Outcome),
}

impl PipelineState {
    fn rank(self) -> u8 {
        match self {
            PipelineState::Validating => 0,
            PipelineState::ResolvingAccount => 1,
            PipelineState::LocatingFile => 2,
            PipelineState::Staging => 3,
            PipelineState::Transferring => 4,
            PipelineState::Recording => 5,
            PipelineState::Done(_) => 6,
        }
    }
}

/// Forward-only record of the states one request went through
#[derive(Debug, Default)]
struct StateTrace {
    states: Vec<PipelineState>,
}

impl StateTrace {
    fn enter(&mut self, state: PipelineState) {
        if let Some(last) = self.states.last() {
            debug_assert!(
                state.rank() > last.rank(),
                "pipeline moved from {:?} to {:?}",
                last,
                state
            );
        }
        tracing::debug!("→ {:?}", state);
        self.states.push(state);
    }
}

/// Terminal result of one relay request
#[derive(Debug)]
pub struct RelayOutcome {
    pub filename: Option<String>,
    pub message: String,
    /// The failing step's error; `None` on success
    pub error: Option<RelayError>,
    pub transfer: Option<TransferReport>,
    pub states: Vec<PipelineState>,
}

impl RelayOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn status(&self) -> RelayStatus {
        if self.is_success() {
            RelayStatus::Success
        } else {
            RelayStatus::Error
        }
    }

    pub fn final_state(&self) -> Option<PipelineState> {
        self.states.last().copied()
    }

    pub fn to_response(&self) -> RelayResponse {
        RelayResponse {
            status: self.status(),
            message: self.message.clone(),
        }
    }
}

pub fn success_message(filename: &str) -> String {
    format!("{} のアップロード成功", filename)
}

/// Runs one request through resolve → locate → stage → transfer → record
pub struct Orchestrator {
    resolver: AccountResolver,
    locator: RemoteLocator,
    stager: Stager,
    transfer: TransferClient,
    recorder: StatusRecorder,
    retry: RetryPolicy,
    delete_source_after_upload: bool,
}

impl Orchestrator {
    pub fn new(
        resolver: AccountResolver,
        locator: RemoteLocator,
        stager: Stager,
        transfer: TransferClient,
        recorder: StatusRecorder,
    ) -> Self {
        Self {
            resolver,
            locator,
            stager,
            transfer,
            recorder,
            retry: RetryPolicy::default(),
            delete_source_after_upload: false,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_source_cleanup(mut self, enabled: bool) -> Self {
        self.delete_source_after_upload = enabled;
        self
    }

    /// Wires the pipeline from configuration and the three store clients
    pub fn from_config(
        config: &RelayConfig,
        tabular: Arc<dyn TabularStore>,
        files: Arc<dyn FileStore>,
        connector: Arc<dyn TransferConnector>,
    ) -> Self {
        let resolver = AccountResolver::new(
            tabular.clone(),
            config.account_sheet.clone(),
            config.account_alias_sheet.clone(),
            config.account_columns.clone(),
            config.store_timeout,
        );
        let locator = RemoteLocator::new(
            files.clone(),
            config.drive_folder_id.clone(),
            config.store_timeout,
        );
        let stager = Stager::new(
            files,
            config.staging_dir.clone(),
            config.download_chunk_size,
            config.store_timeout,
        );
        let transfer = TransferClient::new(
            connector,
            config.sftp_host.clone(),
            config.sftp_port,
            config.sftp_upload_path.clone(),
            config.verify_upload,
            config.transfer_timeout,
        );
        let recorder = StatusRecorder::new(
            tabular,
            config.status_sheet.clone(),
            config.status_columns.clone(),
            config.store_timeout,
        );

        Self::new(resolver, locator, stager, transfer, recorder)
            .with_retry(config.retry)
            .with_source_cleanup(config.delete_source_after_upload)
    }

    /// Processes one request to exactly one terminal outcome
    pub async fn upload(&self, request: &TransferRequest) -> RelayOutcome {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "relay",
            %request_id,
            account = request.account.as_deref().unwrap_or(""),
            filename = request.filename.as_deref().unwrap_or(""),
        );
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: &TransferRequest) -> RelayOutcome {
        let mut trace = StateTrace::default();
        tracing::info!("📦 Relay request received");

        trace.enter(PipelineState::Validating);
        let valid = match validate_request(request) {
            Ok(valid) => valid,
            Err(rejection) => {
                let error = RelayError::Validation(rejection.reason);
                tracing::warn!("Rejected request: {}", error);
                if let Some(filename) = &rejection.filename {
                    trace.enter(PipelineState::Recording);
                    self.recorder
                        .record_or_log(filename, UploadStatus::Error, Some(&error.to_string()))
                        .await;
                }
                return Self::finish(trace, rejection.filename, Err(error));
            }
        };

        let result = self.relay(&valid, &mut trace).await;

        trace.enter(PipelineState::Recording);
        match &result {
            Ok(_) => {
                self.recorder
                    .record_or_log(&valid.filename, UploadStatus::UploadComplete, None)
                    .await;
            }
            Err(error) => {
                tracing::error!("❌ Relay failed at {}: {}", error.kind(), error);
                self.recorder
                    .record_or_log(&valid.filename, UploadStatus::Error, Some(&error.to_string()))
                    .await;
            }
        }

        Self::finish(trace, Some(valid.filename), result)
    }

    fn finish(
        mut trace: StateTrace,
        filename: Option<String>,
        result: Result<TransferReport, RelayError>,
    ) -> RelayOutcome {
        match result {
            Ok(report) => {
                trace.enter(PipelineState::Done(Outcome::Success));
                let name = filename.unwrap_or_default();
                tracing::info!("✅ アップロード成功: {}", name);
                RelayOutcome {
                    message: success_message(&name),
                    filename: Some(name),
                    error: None,
                    transfer: Some(report),
                    states: trace.states,
                }
            }
            Err(error) => {
                trace.enter(PipelineState::Done(Outcome::Failure));
                RelayOutcome {
                    filename,
                    message: error.to_string(),
                    error: Some(error),
                    transfer: None,
                    states: trace.states,
                }
            }
        }
    }

    async fn locate_required(&self, filename: &str) -> Result<RemoteFileRef, RelayError> {
        self.locator
            .locate(filename)
            .await?
            .ok_or_else(|| RelayError::RemoteFileNotFound(filename.to_string()))
    }

    async fn relay(
        &self,
        valid: &ValidatedRequest,
        trace: &mut StateTrace,
    ) -> Result<TransferReport, RelayError> {
        trace.enter(PipelineState::ResolvingAccount);
        let credential: AccountCredential = self
            .resolver
            .resolve(&valid.account)
            .await?
            .ok_or(RelayError::CredentialNotFound)?;

        // Locate and stage share one retry budget; states are entered once.
        trace.enter(PipelineState::LocatingFile);
        let located = AtomicBool::new(false);
        let staged = self
            .retry
            .run(
                |_attempt| {
                    let located = &located;
                    async move {
                        let file = self.locate_required(&valid.filename).await?;
                        located.store(true, Ordering::SeqCst);
                        let staged = self.stager.stage(&file, &valid.filename).await?;
                        Ok::<(RemoteFileRef, StagedFile), RelayError>((file, staged))
                    }
                },
                RelayError::is_retryable,
            )
            .await;
        if located.load(Ordering::SeqCst) {
            trace.enter(PipelineState::Staging);
        }
        let (file, staged) = staged?;

        trace.enter(PipelineState::Transferring);
        let report = self
            .transfer
            .transfer(&credential, &staged, &valid.filename)
            .await;
        // Staging directory goes away here, whatever the transfer did
        drop(staged);
        let report = report?;

        if self.delete_source_after_upload {
            match self.locator.remove(&file).await {
                Ok(()) => tracing::info!("🗑️  Deleted source {} ({})", file.name, file.id),
                Err(e) => tracing::warn!("Failed to delete source {}: {}", file.id, e),
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::services::retry::Backoff;
    use crate::services::testing::{FakeConnector, FakeDrive, FakeSheets};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const ACCOUNTS: &str = "アカウント管理";
    const STATUS: &str = "アップロード管理";
    const FILE: &str = "orders_20250402.csv";

    struct Harness {
        sheets: Arc<FakeSheets>,
        drive: Arc<FakeDrive>,
        connector: FakeConnector,
        orchestrator: Orchestrator,
        _staging: tempfile::TempDir,
    }

    fn sheets() -> FakeSheets {
        FakeSheets::new()
            .with_sheet(
                ACCOUNTS,
                &[
                    &["アカウント名", "FTP用ユーザー名", "FTP用パスワード"],
                    &["LIMITEST", "limi_user", "limi_pass"],
                ],
            )
            .with_sheet(
                STATUS,
                &[
                    &["ファイル名", "ステータス", "エラーメッセージ"],
                    &[FILE, "未処理", ""],
                    &["missing.csv", "未処理", ""],
                ],
            )
    }

    fn harness_with(sheets: FakeSheets, drive: FakeDrive, tweak: impl FnOnce(&mut RelayConfig)) -> Harness {
        let staging = tempfile::tempdir().unwrap();
        let mut config = RelayConfig {
            staging_dir: staging.path().to_path_buf(),
            drive_folder_id: "folder".to_string(),
            retry: RetryPolicy {
                max_attempts: 3,
                delay: Duration::from_millis(1),
                backoff: Backoff::Fixed,
            },
            download_chunk_size: 4,
            ..RelayConfig::default()
        };
        tweak(&mut config);

        let sheets = Arc::new(sheets);
        let drive = Arc::new(drive);
        let connector = FakeConnector::default();
        let orchestrator = Orchestrator::from_config(
            &config,
            sheets.clone(),
            drive.clone(),
            Arc::new(connector.clone()),
        );
        Harness {
            sheets,
            drive,
            connector,
            orchestrator,
            _staging: staging,
        }
    }

    fn harness() -> Harness {
        harness_with(
            sheets(),
            FakeDrive::new().with_file("id1", FILE, b"sku,qty\nA,1\n"),
            |_| {},
        )
    }

    fn status_row(h: &Harness, filename: &str) -> Vec<String> {
        h.sheets
            .sheet(STATUS)
            .into_iter()
            .find(|r| r[0] == filename)
            .unwrap()
    }

    #[tokio::test]
    async fn test_happy_path_records_upload_complete() {
        let h = harness();
        let outcome = h.orchestrator.upload(&TransferRequest::new("LIMITEST", FILE)).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.message, "orders_20250402.csv のアップロード成功");
        assert_eq!(
            outcome.states,
            vec![
                PipelineState::Validating,
                PipelineState::ResolvingAccount,
                PipelineState::LocatingFile,
                PipelineState::Staging,
                PipelineState::Transferring,
                PipelineState::Recording,
                PipelineState::Done(Outcome::Success),
            ]
        );
        assert_eq!(status_row(&h, FILE)[1], "アップロード完了");
        assert_eq!(status_row(&h, FILE)[2], "");

        let uploads = h.connector.server.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].1, "/ritem/batch/orders_20250402.csv");
        assert_eq!(uploads[0].2, b"sku,qty\nA,1\n");
    }

    #[tokio::test]
    async fn test_unknown_account_never_stages_or_transfers() {
        let h = harness();
        let outcome = h.orchestrator.upload(&TransferRequest::new("NOBODY", FILE)).await;

        assert!(matches!(outcome.error, Some(RelayError::CredentialNotFound)));
        assert_eq!(outcome.message, "FTPアカウント情報が見つかりません");
        assert_eq!(outcome.final_state(), Some(PipelineState::Done(Outcome::Failure)));
        assert_eq!(h.drive.lists.load(Ordering::SeqCst), 0);
        assert_eq!(h.drive.downloads.load(Ordering::SeqCst), 0);
        assert_eq!(h.connector.server.connects.load(Ordering::SeqCst), 0);

        let row = status_row(&h, FILE);
        assert_eq!(row[1], "エラー");
        assert_eq!(row[2], "FTPアカウント情報が見つかりません");
    }

    #[tokio::test]
    async fn test_missing_remote_file_no_transfer_after_retries() {
        let h = harness();
        let outcome = h
            .orchestrator
            .upload(&TransferRequest::new("LIMITEST", "missing.csv"))
            .await;

        assert!(matches!(outcome.error, Some(RelayError::RemoteFileNotFound(_))));
        assert_eq!(h.drive.lists.load(Ordering::SeqCst), 3);
        assert_eq!(h.connector.server.connects.load(Ordering::SeqCst), 0);
        assert!(!outcome.states.contains(&PipelineState::Staging));

        let row = status_row(&h, "missing.csv");
        assert_eq!(row[1], "エラー");
        assert!(row[2].contains("見つかりません"));
    }

    #[tokio::test]
    async fn test_eventually_visible_file_succeeds_on_retry() {
        let drive = FakeDrive::new().with_file("id1", FILE, b"x");
        drive.hidden_for.store(2, Ordering::SeqCst);
        let h = harness_with(sheets(), drive, |_| {});

        let outcome = h.orchestrator.upload(&TransferRequest::new("LIMITEST", FILE)).await;
        assert!(outcome.is_success());
        assert_eq!(h.drive.lists.load(Ordering::SeqCst), 3);
        // Retried states are not re-entered
        let locating = outcome
            .states
            .iter()
            .filter(|s| **s == PipelineState::LocatingFile)
            .count();
        assert_eq!(locating, 1);
    }

    #[tokio::test]
    async fn test_empty_filename_rejected_before_any_call() {
        let h = harness();
        let outcome = h.orchestrator.upload(&TransferRequest::new("LIMITEST", "")).await;

        assert!(matches!(outcome.error, Some(RelayError::Validation(_))));
        assert_eq!(
            outcome.states,
            vec![PipelineState::Validating, PipelineState::Done(Outcome::Failure)]
        );
        assert_eq!(h.sheets.reads.load(Ordering::SeqCst), 0);
        assert_eq!(h.sheets.writes.load(Ordering::SeqCst), 0);
        assert_eq!(h.drive.lists.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_account_still_records_against_filename() {
        let h = harness();
        let request = TransferRequest {
            account: Some("  ".to_string()),
            filename: Some(FILE.to_string()),
        };
        let outcome = h.orchestrator.upload(&request).await;

        assert!(matches!(outcome.error, Some(RelayError::Validation(_))));
        assert!(outcome.states.contains(&PipelineState::Recording));
        assert_eq!(status_row(&h, FILE)[1], "エラー");
        assert_eq!(h.drive.lists.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transfer_failure_recorded_and_staging_removed() {
        let h = harness();
        h.connector.server.fail_put.store(true, Ordering::SeqCst);
        let outcome = h.orchestrator.upload(&TransferRequest::new("LIMITEST", FILE)).await;

        assert!(matches!(outcome.error, Some(RelayError::Transfer(_))));
        assert_eq!(h.connector.server.closes.load(Ordering::SeqCst), 1);
        assert_eq!(status_row(&h, FILE)[1], "エラー");
        assert!(status_row(&h, FILE)[2].starts_with("SFTP"));
        assert_eq!(std::fs::read_dir(h._staging.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_recording_failure_does_not_change_success() {
        let h = harness();
        h.sheets.fail_writes.store(true, Ordering::SeqCst);
        let outcome = h.orchestrator.upload(&TransferRequest::new("LIMITEST", FILE)).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.final_state(), Some(PipelineState::Done(Outcome::Success)));
    }

    #[tokio::test]
    async fn test_sheet_outage_is_store_error() {
        let h = harness();
        h.sheets.fail_reads.store(true, Ordering::SeqCst);
        let outcome = h.orchestrator.upload(&TransferRequest::new("LIMITEST", FILE)).await;
        assert!(matches!(outcome.error, Some(RelayError::StoreIo(_))));
        assert_eq!(h.connector.server.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_source_deleted_only_when_enabled() {
        let h = harness();
        h.orchestrator.upload(&TransferRequest::new("LIMITEST", FILE)).await;
        assert!(h.drive.deleted.lock().unwrap().is_empty());

        let h = harness_with(
            sheets(),
            FakeDrive::new().with_file("id1", FILE, b"x"),
            |c| c.delete_source_after_upload = true,
        );
        let outcome = h.orchestrator.upload(&TransferRequest::new("LIMITEST", FILE)).await;
        assert!(outcome.is_success());
        assert_eq!(*h.drive.deleted.lock().unwrap(), vec!["id1".to_string()]);
    }

    #[tokio::test]
    async fn test_stalled_transfer_records_error_with_nothing_uploaded() {
        let h = harness_with(
            sheets(),
            FakeDrive::new().with_file("id1", FILE, b"x"),
            |c| c.transfer_timeout = Duration::from_millis(50),
        );
        h.connector.server.stall_put.store(true, Ordering::SeqCst);
        let outcome = h.orchestrator.upload(&TransferRequest::new("LIMITEST", FILE)).await;

        assert!(matches!(outcome.error, Some(RelayError::Transfer(_))));
        assert_eq!(status_row(&h, FILE)[1], "エラー");
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(h.connector.server.uploads.lock().unwrap().is_empty());
        assert_eq!(h.connector.server.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_slow_transfer_is_recorded_as_complete() {
        let h = harness_with(
            sheets(),
            FakeDrive::new().with_file("id1", FILE, b"x"),
            |c| c.transfer_timeout = Duration::from_millis(50),
        );
        *h.connector.server.put_delay.lock().unwrap() = Some(Duration::from_millis(300));
        let outcome = h.orchestrator.upload(&TransferRequest::new("LIMITEST", FILE)).await;

        assert!(outcome.is_success());
        assert_eq!(status_row(&h, FILE)[1], "アップロード完了");
        assert_eq!(h.connector.server.uploads.lock().unwrap().len(), 1);
    }
}

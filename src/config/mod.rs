use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::retry::{Backoff, RetryPolicy};

/// Header names looked up in the account sheet.
#[derive(Debug, Clone)]
pub struct AccountColumns {
    pub account: String,
    pub username: String,
    pub password: String,
    /// Alias sheet: display name column
    pub alias_display: String,
    /// Alias sheet: canonical account name column
    pub alias_account: String,
}

impl Default for AccountColumns {
    fn default() -> Self {
        Self {
            account: "アカウント名".to_string(),
            username: "FTP用ユーザー名".to_string(),
            password: "FTP用パスワード".to_string(),
            alias_display: "表示名".to_string(),
            alias_account: "アカウント名".to_string(),
        }
    }
}

/// Header names and cell values used in the status sheet.
#[derive(Debug, Clone)]
pub struct StatusColumns {
    pub filename: String,
    pub status: String,
    pub error_message: String,
    pub pending_label: String,
    pub complete_label: String,
    pub error_label: String,
}

impl Default for StatusColumns {
    fn default() -> Self {
        Self {
            filename: "ファイル名".to_string(),
            status: "ステータス".to_string(),
            error_message: "エラーメッセージ".to_string(),
            pending_label: "未処理".to_string(),
            complete_label: "アップロード完了".to_string(),
            error_label: "エラー".to_string(),
        }
    }
}

/// Relay configuration, loaded once at start-up
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Spreadsheet holding the account and status sheets
    pub spreadsheet_id: String,
    pub account_sheet: String,
    pub status_sheet: String,
    /// Optional sheet mapping display names to canonical account names
    pub account_alias_sheet: Option<String>,
    pub account_columns: AccountColumns,
    pub status_columns: StatusColumns,

    /// Drive folder searched for source files
    pub drive_folder_id: String,

    pub sftp_host: String,
    pub sftp_port: u16,
    /// Remote directory files are written to
    pub sftp_upload_path: String,

    /// Parent directory for per-request staging directories
    pub staging_dir: PathBuf,
    /// Range size for each download request (default: 8 MB)
    pub download_chunk_size: u64,

    /// Timeout for a single tabular/file store call
    pub store_timeout: Duration,
    /// Timeout for each blocking SFTP operation (connect, handshake, every
    /// read or write during the put, listing). A steadily progressing upload
    /// may take longer than this in total.
    pub transfer_timeout: Duration,

    /// Locate+stage retry (eventual consistency of the file store)
    pub retry: RetryPolicy,

    /// List the remote directory after the put and warn on a mismatch
    pub verify_upload: bool,
    /// Delete the source file from the file store after a successful transfer
    pub delete_source_after_upload: bool,

    /// Staging directory cleanup age in hours (default: 24)
    pub staging_cleanup_age_hours: u64,
    /// How often the staging sweeper runs
    pub staging_sweep_interval: Duration,

    /// Base64-encoded service account key (GOOGLE_CREDENTIALS_JSON)
    pub google_credentials_b64: Option<String>,
    /// Fixed bearer token (GOOGLE_ACCESS_TOKEN), used instead of the
    /// service account when set
    pub google_access_token: Option<String>,
    pub sheets_api_base: String,
    pub drive_api_base: String,

    /// Allowed CORS Origins (comma separated)
    pub allowed_origins: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            account_sheet: "アカウント管理".to_string(),
            status_sheet: "アップロード管理".to_string(),
            account_alias_sheet: None,
            account_columns: AccountColumns::default(),
            status_columns: StatusColumns::default(),
            drive_folder_id: String::new(),
            sftp_host: "upload.rakuten.ne.jp".to_string(),
            sftp_port: 22,
            sftp_upload_path: "/ritem/batch".to_string(),
            staging_dir: env::temp_dir().join("drive-sftp-relay"),
            download_chunk_size: 8 * 1024 * 1024,
            store_timeout: Duration::from_secs(30),
            transfer_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
            verify_upload: true,
            delete_source_after_upload: false,
            staging_cleanup_age_hours: 24,
            staging_sweep_interval: Duration::from_secs(3600),
            google_credentials_b64: None,
            google_access_token: None,
            sheets_api_base: "https://sheets.googleapis.com/v4".to_string(),
            drive_api_base: "https://www.googleapis.com/drive/v3".to_string(),
            allowed_origins: vec!["*".to_string()],
        }
    }
}

/// Typed reads over a key/value source
struct Lookup<F: Fn(&str) -> Option<String>>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    /// Set and not blank
    fn present(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        (self.0)(key).and_then(|v| v.trim().parse().ok())
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        (self.0)(key)
            .map(|v| {
                let v = v.trim().to_lowercase();
                v == "true" || v == "1" || v == "yes"
            })
            .unwrap_or(default)
    }

    fn string_or(&self, key: &str, default: String) -> String {
        self.present(key).unwrap_or(default)
    }

    fn secs_or(&self, key: &str, default: Duration) -> Duration {
        self.parsed::<u64>(key)
            .map(Duration::from_secs)
            .unwrap_or(default)
    }
}

impl RelayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source, keyed by the
    /// environment variable names
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let vars = Lookup(get);
        let default = Self::default();
        let default_accounts = AccountColumns::default();
        let default_status = StatusColumns::default();

        let retry = RetryPolicy {
            max_attempts: vars
                .parsed("RETRY_MAX_ATTEMPTS")
                .unwrap_or(default.retry.max_attempts),
            delay: vars
                .parsed::<u64>("RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.retry.delay),
            backoff: vars
                .parsed::<Backoff>("RETRY_BACKOFF")
                .unwrap_or(default.retry.backoff),
        };

        Self {
            spreadsheet_id: vars.string_or("SPREADSHEET_ID", default.spreadsheet_id),
            account_sheet: vars.string_or("ACCOUNT_SHEET", default.account_sheet),
            status_sheet: vars.string_or("STATUS_SHEET", default.status_sheet),
            account_alias_sheet: vars.present("ACCOUNT_ALIAS_SHEET"),
            account_columns: AccountColumns {
                account: vars.string_or("ACCOUNT_NAME_HEADER", default_accounts.account),
                username: vars.string_or("ACCOUNT_USERNAME_HEADER", default_accounts.username),
                password: vars.string_or("ACCOUNT_PASSWORD_HEADER", default_accounts.password),
                alias_display: vars
                    .string_or("ALIAS_DISPLAY_HEADER", default_accounts.alias_display),
                alias_account: vars
                    .string_or("ALIAS_ACCOUNT_HEADER", default_accounts.alias_account),
            },
            status_columns: StatusColumns {
                filename: vars.string_or("STATUS_FILENAME_HEADER", default_status.filename),
                status: vars.string_or("STATUS_STATUS_HEADER", default_status.status),
                error_message: vars.string_or("STATUS_ERROR_HEADER", default_status.error_message),
                pending_label: vars.string_or("STATUS_PENDING_LABEL", default_status.pending_label),
                complete_label: vars
                    .string_or("STATUS_COMPLETE_LABEL", default_status.complete_label),
                error_label: vars.string_or("STATUS_ERROR_LABEL", default_status.error_label),
            },
            drive_folder_id: vars.string_or("DRIVE_FOLDER_ID", default.drive_folder_id),
            sftp_host: vars.string_or("SFTP_HOST", default.sftp_host),
            sftp_port: vars.parsed("SFTP_PORT").unwrap_or(default.sftp_port),
            sftp_upload_path: vars.string_or("SFTP_UPLOAD_PATH", default.sftp_upload_path),
            staging_dir: vars
                .present("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.staging_dir),
            download_chunk_size: vars
                .parsed("DOWNLOAD_CHUNK_SIZE")
                .filter(|v: &u64| *v > 0)
                .unwrap_or(default.download_chunk_size),
            store_timeout: vars.secs_or("STORE_TIMEOUT_SECS", default.store_timeout),
            transfer_timeout: vars.secs_or("TRANSFER_TIMEOUT_SECS", default.transfer_timeout),
            retry,
            verify_upload: vars.flag("VERIFY_UPLOAD", default.verify_upload),
            delete_source_after_upload: vars.flag(
                "DELETE_SOURCE_AFTER_UPLOAD",
                default.delete_source_after_upload,
            ),
            staging_cleanup_age_hours: vars
                .parsed("STAGING_CLEANUP_AGE_HOURS")
                .unwrap_or(default.staging_cleanup_age_hours),
            staging_sweep_interval: vars
                .secs_or("STAGING_SWEEP_INTERVAL_SECS", default.staging_sweep_interval),
            google_credentials_b64: vars.present("GOOGLE_CREDENTIALS_JSON"),
            google_access_token: vars.present("GOOGLE_ACCESS_TOKEN"),
            sheets_api_base: vars.string_or("SHEETS_API_BASE", default.sheets_api_base),
            drive_api_base: vars.string_or("DRIVE_API_BASE", default.drive_api_base),
            allowed_origins: (vars.0)("ALLOWED_ORIGINS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(default.allowed_origins),
        }
    }
}

use thiserror::Error;

/// Failure of one pipeline step. `Display` is the caller-visible message.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("リクエストが不正です: {0}")]
    Validation(String),

    #[error("FTPアカウント情報が見つかりません")]
    CredentialNotFound,

    #[error("Google Drive にファイルが見つかりません: {0}")]
    RemoteFileNotFound(String),

    #[error("データストアへのアクセスに失敗しました: {0}")]
    StoreIo(String),

    #[error("SFTPアップロードに失敗しました: {0}")]
    Transfer(String),

    #[error("ステータスの記録に失敗しました: {0}")]
    Recording(String),
}

impl RelayError {
    pub fn store_io(err: impl std::fmt::Display) -> Self {
        RelayError::StoreIo(err.to_string())
    }

    pub fn transfer(err: impl std::fmt::Display) -> Self {
        RelayError::Transfer(err.to_string())
    }

    /// Short machine-friendly kind, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Validation(_) => "validation",
            RelayError::CredentialNotFound => "credential_not_found",
            RelayError::RemoteFileNotFound(_) => "remote_file_not_found",
            RelayError::StoreIo(_) => "store_io",
            RelayError::Transfer(_) => "transfer",
            RelayError::Recording(_) => "recording",
        }
    }

    /// Whether the locate+stage retry loop should try again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayError::RemoteFileNotFound(_) | RelayError::StoreIo(_)
        )
    }
}

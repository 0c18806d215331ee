use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use utoipa::ToSchema;
use validator::Validate;

/// Inbound relay request. Fields are optional at the wire level so that a
/// missing field is reported as a validation error, not a JSON rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, Validate)]
pub struct TransferRequest {
    #[serde(default)]
    #[validate(
        required(message = "account は必須です"),
        custom(function = "crate::utils::validation::non_blank_account")
    )]
    pub account: Option<String>,
    #[serde(default)]
    #[validate(
        required(message = "filename は必須です"),
        custom(function = "crate::utils::validation::bare_filename")
    )]
    pub filename: Option<String>,
}

impl TransferRequest {
    pub fn new(account: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            account: Some(account.into()),
            filename: Some(filename.into()),
        }
    }
}

/// A request that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub account: String,
    pub filename: String,
}

#[derive(Clone, PartialEq, Eq)]
pub struct AccountCredential {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for AccountCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredential")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileRef {
    pub id: String,
    pub name: String,
}

/// A fully downloaded file in a per-request staging directory.
/// Dropping it removes the directory and everything in it.
#[derive(Debug)]
pub struct StagedFile {
    dir: tempfile::TempDir,
    path: PathBuf,
    pub size: u64,
}

impl StagedFile {
    pub fn new(dir: tempfile::TempDir, path: PathBuf, size: u64) -> Self {
        Self { dir, path, size }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn staging_dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Value of the status cell for a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum UploadStatus {
    Pending,
    UploadComplete,
    Error,
}

/// Caller-facing result of one relay request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RelayStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RelayResponse {
    pub status: RelayStatus,
    pub message: String,
}

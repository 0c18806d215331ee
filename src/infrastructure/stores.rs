use crate::config::RelayConfig;
use crate::infrastructure::google_auth::{
    AccessTokenSource, ServiceAccountKey, ServiceAccountTokenProvider, StaticToken,
};
use crate::services::file_store::FileStore;
use crate::services::file_store::google_drive::GoogleDriveStore;
use crate::services::tabular::TabularStore;
use crate::services::tabular::google_sheets::GoogleSheetsStore;
use crate::services::transfer::TransferConnector;
use crate::services::transfer::sftp::Ssh2Connector;
use anyhow::{Context, Result, bail};
use std::sync::Arc;
use tracing::info;

/// External collaborators of the relay pipeline
#[derive(Clone)]
pub struct Stores {
    pub tabular: Arc<dyn TabularStore>,
    pub files: Arc<dyn FileStore>,
    pub connector: Arc<dyn TransferConnector>,
}

fn token_source(config: &RelayConfig, http: &reqwest::Client) -> Result<Arc<dyn AccessTokenSource>> {
    // Emulators and local testing can skip the service account entirely
    if let Some(token) = config.google_access_token.as_deref() {
        info!("🔑 Google auth: static access token");
        return Ok(Arc::new(StaticToken(token.trim().to_string())));
    }

    let Some(encoded) = config.google_credentials_b64.as_deref() else {
        bail!("GOOGLE_CREDENTIALS_JSON must be set");
    };
    let key = ServiceAccountKey::from_base64(encoded)?;
    let provider = ServiceAccountTokenProvider::new(http.clone(), key);
    info!("🔑 Google auth: service account {}", provider.client_email());
    Ok(Arc::new(provider))
}

pub fn setup_stores(config: &RelayConfig) -> Result<Stores> {
    if config.spreadsheet_id.is_empty() {
        bail!("SPREADSHEET_ID must be set");
    }
    if config.drive_folder_id.is_empty() {
        bail!("DRIVE_FOLDER_ID must be set");
    }

    let http = reqwest::Client::builder()
        .user_agent(concat!("drive-sftp-relay/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    let tokens = token_source(config, &http)?;

    info!("📊 Sheets: spreadsheet {}", config.spreadsheet_id);
    info!("📁 Drive: folder {}", config.drive_folder_id);
    info!(
        "📡 SFTP: {}:{}{}",
        config.sftp_host, config.sftp_port, config.sftp_upload_path
    );

    Ok(Stores {
        tabular: Arc::new(GoogleSheetsStore::new(
            http.clone(),
            tokens.clone(),
            config.sheets_api_base.clone(),
            config.spreadsheet_id.clone(),
        )),
        files: Arc::new(GoogleDriveStore::new(
            http,
            tokens,
            config.drive_api_base.clone(),
        )),
        connector: Arc::new(Ssh2Connector),
    })
}

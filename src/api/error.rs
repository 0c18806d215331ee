use crate::models::{RelayResponse, RelayStatus};
use crate::services::error::RelayError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Relay(#[from] RelayError),

    #[error("リクエストが不正です: {0}")]
    BadRequest(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

/// HTTP status for a failed relay step
pub fn status_for(error: &RelayError) -> StatusCode {
    match error {
        RelayError::Validation(_) | RelayError::CredentialNotFound => StatusCode::BAD_REQUEST,
        RelayError::RemoteFileNotFound(_) => StatusCode::NOT_FOUND,
        RelayError::StoreIo(_) | RelayError::Transfer(_) | RelayError::Recording(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Relay(e) => status_for(e),
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(RelayResponse {
            status: RelayStatus::Error,
            message: self.to_string(),
        });

        (status, body).into_response()
    }
}

use crate::AppState;
use crate::api::error::AppError;
use crate::models::{RelayResponse, TransferRequest};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};

#[utoipa::path(
    post,
    path = "/upload_sftp",
    request_body = TransferRequest,
    responses(
        (status = 200, description = "File relayed to the SFTP server", body = RelayResponse),
        (status = 400, description = "Invalid request or unknown account", body = RelayResponse),
        (status = 404, description = "File not found in the Drive folder", body = RelayResponse),
        (status = 500, description = "Store or transfer failure", body = RelayResponse)
    ),
    tag = "relay"
)]
pub async fn upload_sftp(
    State(state): State<AppState>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<Json<RelayResponse>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let outcome = state.orchestrator.upload(&request).await;
    let response = outcome.to_response();
    match outcome.error {
        None => Ok(Json(response)),
        Some(error) => Err(AppError::Relay(error)),
    }
}

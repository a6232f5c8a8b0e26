//! Chest creation: the only endpoint behind the optional TOTP gate.

use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::Utc;
use chestdrop_core::constants::UPLOAD_TOKEN_TTL_SECS;
use chestdrop_core::AppError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateChestRequest {
    /// TOTP code; required when the service is configured with
    /// `REQUIRE_TOTP=true`, ignored otherwise.
    #[serde(default)]
    pub totp_token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateChestResponse {
    pub session_id: Uuid,
    /// Bearer token authorizing uploads and the seal operation.
    pub upload_token: String,
    /// Upload-token lifetime in seconds.
    pub expires_in: i64,
}

/// Open a new chest and mint its upload token.
#[utoipa::path(
    post,
    path = "/api/chest",
    tag = "chest",
    request_body = CreateChestRequest,
    responses(
        (status = 200, description = "Chest created", body = CreateChestResponse),
        (status = 401, description = "TOTP required or invalid", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, body), fields(operation = "create_chest"))]
pub async fn create_chest(
    State(state): State<Arc<AppState>>,
    body: Result<ValidatedJson<CreateChestRequest>, HttpAppError>,
) -> Result<Json<CreateChestResponse>, HttpAppError> {
    if let Some(ref gate) = state.totp {
        // The body is optional when the gate is off, but mandatory here.
        let request = match body {
            Ok(ValidatedJson(request)) => request,
            Err(_) => CreateChestRequest::default(),
        };
        let code = request
            .totp_token
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AppError::Unauthorized("TOTP code required".to_string()))?;

        match gate.verify(code, Utc::now().timestamp() as u64) {
            Some(name) => {
                tracing::debug!(secret = %name, "TOTP admission granted");
            }
            None => {
                return Err(AppError::Unauthorized("Invalid TOTP code".to_string()).into());
            }
        }
    }

    let session_id = Uuid::new_v4();
    state.sessions.insert(session_id).await?;

    let upload_token = state.tokens.mint_upload(session_id)?;

    tracing::info!(session_id = %session_id, "Chest created");

    Ok(Json(CreateChestResponse {
        session_id,
        upload_token,
        expires_in: UPLOAD_TOKEN_TTL_SECS,
    }))
}

//! Sealing a chest: validity check, ownership check, retrieval-code
//! assignment with bounded collision retry.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use chestdrop_core::constants::{PERMANENT_VALIDITY_DAYS, SEAL_CODE_ATTEMPTS, VALIDITY_DAY_OPTIONS};
use chestdrop_core::ids::generate_retrieval_code;
use chestdrop_core::AppError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::extract::bearer_token;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SealChestRequest {
    /// Every file the client believes is in the chest; must match the stored
    /// set exactly.
    pub file_ids: Vec<String>,
    /// 1, 3, 7, or 15 days; -1 for a permanent chest.
    pub validity_days: i32,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SealChestResponse {
    pub retrieval_code: String,
    /// ISO-8601 expiry, or null for a permanent chest.
    pub expiry_date: Option<String>,
}

/// Translate `validityDays` into an absolute expiry.
pub fn compute_expiry(
    validity_days: i32,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, AppError> {
    if validity_days == PERMANENT_VALIDITY_DAYS {
        return Ok(None);
    }
    if VALIDITY_DAY_OPTIONS.contains(&validity_days) {
        return Ok(Some(now + Duration::seconds(i64::from(validity_days) * 86_400)));
    }
    Err(AppError::BadRequest(format!(
        "Invalid validityDays {}: expected one of {:?} or {}",
        validity_days, VALIDITY_DAY_OPTIONS, PERMANENT_VALIDITY_DAYS
    )))
}

fn is_unique_violation(err: &AppError) -> bool {
    matches!(
        err,
        AppError::Database(sqlx::Error::Database(db)) if db.is_unique_violation()
    )
}

/// Seal the chest and hand out its retrieval code.
///
/// The state transition is one conditional update; a concurrent second sealer
/// sees zero affected rows. A retrieval-code collision surfaces as a
/// unique-index violation and retries with a fresh code.
#[utoipa::path(
    post,
    path = "/api/chest/{sid}/complete",
    tag = "chest",
    params(("sid" = Uuid, Path, description = "Chest session ID")),
    request_body = SealChestRequest,
    responses(
        (status = 200, description = "Chest sealed", body = SealChestResponse),
        (status = 400, description = "Invalid validity or file list", body = ErrorResponse),
        (status = 401, description = "Missing or invalid upload token", body = ErrorResponse),
        (status = 404, description = "Chest not found or already sealed", body = ErrorResponse),
        (status = 409, description = "Retrieval-code allocation failed", body = ErrorResponse)
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip(state, headers, body), fields(session_id = %sid, operation = "seal_chest"))]
pub async fn seal_chest(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<Uuid>,
    headers: HeaderMap,
    body: ValidatedJson<SealChestRequest>,
) -> Result<Json<SealChestResponse>, HttpAppError> {
    let ValidatedJson(request) = body;

    let token = bearer_token(&headers)?;
    let claims = state.tokens.verify_upload(token)?;
    if claims.session_id != sid {
        return Err(AppError::Forbidden("Token does not authorize this chest".to_string()).into());
    }

    let expires_at = compute_expiry(request.validity_days, Utc::now())?;

    let mut submitted = HashSet::with_capacity(request.file_ids.len());
    for raw in &request.file_ids {
        let id = Uuid::parse_str(raw)
            .map_err(|_| AppError::BadRequest(format!("Invalid file id: {}", raw)))?;
        if !submitted.insert(id) {
            return Err(AppError::BadRequest(format!("Duplicate file id: {}", raw)).into());
        }
    }

    // Ownership: the submitted set must be exactly the chest's live files.
    let stored = state.files.list_for_session(sid).await?;
    if stored.len() != submitted.len() || stored.iter().any(|f| !submitted.contains(&f.id)) {
        return Err(AppError::BadRequest(
            "File list does not match the chest contents".to_string(),
        )
        .into());
    }

    for attempt in 1..=SEAL_CODE_ATTEMPTS {
        let code = generate_retrieval_code();
        match state.sessions.mark_sealed(sid, &code, expires_at).await {
            Ok(0) => {
                return Err(AppError::NotFound(
                    "Chest not found or already sealed".to_string(),
                )
                .into());
            }
            Ok(_) => {
                tracing::info!(
                    session_id = %sid,
                    retrieval_code = %code,
                    validity_days = request.validity_days,
                    expires_at = ?expires_at,
                    "Chest sealed"
                );
                return Ok(Json(SealChestResponse {
                    retrieval_code: code,
                    expiry_date: expires_at
                        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
                }));
            }
            Err(err) if is_unique_violation(&err) => {
                tracing::warn!(
                    session_id = %sid,
                    attempt,
                    "Retrieval code collision; retrying with a fresh code"
                );
            }
            Err(err) => return Err(err.into()),
        }
    }

    Err(AppError::Conflict(
        "Could not allocate a unique retrieval code".to_string(),
    )
    .into())
}

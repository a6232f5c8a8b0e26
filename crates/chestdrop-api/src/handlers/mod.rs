//! Request handlers for the chest lifecycle.

pub mod chest_create;
pub mod download;
pub mod multipart;
pub mod retrieve;
pub mod seal;
pub mod service_config;
pub mod upload;

use axum::http::HeaderMap;
use chestdrop_core::models::ChestSession;
use chestdrop_core::AppError;
use uuid::Uuid;

use crate::auth::extract::bearer_token;
use crate::auth::MultipartClaims;
use crate::error::HttpAppError;
use crate::state::AppState;

/// Upload-token authorization for operations that mutate an open chest:
/// verify the bearer token, bind it to the path's session, and require the
/// session to still be open.
pub(crate) async fn authorize_open_chest(
    state: &AppState,
    headers: &HeaderMap,
    session_id: Uuid,
) -> Result<ChestSession, HttpAppError> {
    let token = bearer_token(headers)?;
    let claims = state.tokens.verify_upload(token)?;
    if claims.session_id != session_id {
        return Err(AppError::Forbidden(
            "Token does not authorize this chest".to_string(),
        )
        .into());
    }

    state
        .sessions
        .get_open(session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Chest not found or already sealed".to_string()).into())
}

/// Multipart-token authorization: verify the bearer token and bind it to the
/// path's `{session_id, file_id}` pair. The token carries the whole upload
/// state, so no database read is needed here.
pub(crate) fn authorize_multipart(
    state: &AppState,
    headers: &HeaderMap,
    session_id: Uuid,
    file_id: Uuid,
) -> Result<MultipartClaims, HttpAppError> {
    let token = bearer_token(headers)?;
    let claims = state.tokens.verify_multipart(token)?;
    if claims.session_id != session_id || claims.file_id != file_id {
        return Err(AppError::Forbidden(
            "Token does not match the requested chest and file".to_string(),
        )
        .into());
    }
    Ok(claims)
}

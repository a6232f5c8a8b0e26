//! Retrieval by code: the public read side of a sealed chest.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{SecondsFormat, Utc};
use chestdrop_core::ids::is_valid_retrieval_code;
use chestdrop_core::AppError;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedFile {
    pub file_id: Uuid,
    pub filename: String,
    pub size: i64,
    pub mime_type: String,
    pub is_text: bool,
    pub file_extension: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveResponse {
    pub files: Vec<RetrievedFile>,
    /// Bearer token authorizing downloads from this chest until it expires.
    pub chest_token: String,
    /// ISO-8601 expiry, or null for a permanent chest.
    pub expiry_date: Option<String>,
}

/// List a sealed chest's contents and mint its download token. Knowing the
/// retrieval code is the whole credential; the minted chest token simply makes
/// that knowledge portable to the download endpoint.
#[utoipa::path(
    get,
    path = "/api/retrieve/{code}",
    tag = "retrieve",
    params(("code" = String, Path, description = "6-character retrieval code")),
    responses(
        (status = 200, description = "Chest contents", body = RetrieveResponse),
        (status = 400, description = "Malformed retrieval code", body = ErrorResponse),
        (status = 404, description = "Unknown or expired retrieval code", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state), fields(operation = "retrieve_by_code"))]
pub async fn retrieve_by_code(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<RetrieveResponse>, HttpAppError> {
    if !is_valid_retrieval_code(&code) {
        return Err(AppError::BadRequest(
            "Retrieval code must be 6 uppercase letters or digits".to_string(),
        )
        .into());
    }

    let session = state
        .sessions
        .get_sealed_by_code(&code, Utc::now())
        .await?
        .ok_or_else(|| AppError::NotFound("Unknown or expired retrieval code".to_string()))?;

    let stored = state.files.list_for_session(session.id).await?;
    let files = stored
        .into_iter()
        .map(|f| RetrievedFile {
            file_id: f.id,
            filename: f.original_filename,
            size: f.file_size,
            mime_type: f.mime_type,
            is_text: f.is_text,
            file_extension: f.file_extension,
        })
        .collect();

    let chest_token = state.tokens.mint_chest(session.id, session.expires_at)?;

    tracing::debug!(session_id = %session.id, "Chest retrieved by code");

    Ok(Json(RetrieveResponse {
        files,
        chest_token,
        expiry_date: session
            .expires_at
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
    }))
}

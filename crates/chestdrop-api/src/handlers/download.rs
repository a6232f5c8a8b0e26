//! Authenticated file download, streamed straight from the blob store.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, Response, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use chestdrop_core::AppError;
use chestdrop_storage::keys::object_key;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::extract::bearer_or_query;
use crate::error::HttpAppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    /// Chest token; alternative to the Authorization header so a plain
    /// `<a download>` link works.
    pub token: Option<String>,
    /// Optional filename override for the Content-Disposition header.
    pub filename: Option<String>,
}

/// Stream one file of a sealed chest.
#[utoipa::path(
    get,
    path = "/api/download/{fid}",
    tag = "retrieve",
    params(
        ("fid" = Uuid, Path, description = "File ID"),
        ("token" = Option<String>, Query, description = "Chest token (alternative to the Authorization header)"),
        ("filename" = Option<String>, Query, description = "Filename override for Content-Disposition")
    ),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 401, description = "Missing or invalid chest token"),
        (status = 404, description = "File not found or chest expired")
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip(state, headers, query), fields(file_id = %fid, operation = "download_file"))]
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(fid): Path<Uuid>,
    Query(query): Query<DownloadQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HttpAppError> {
    let token = bearer_or_query(&headers, query.token.as_deref())?;
    let claims = state.tokens.verify_chest(token)?;

    // One query answers existence, chest membership, and expiry at once.
    let file = state
        .files
        .get_in_session(claims.session_id, fid, Utc::now())
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    let body = state
        .storage
        .get(&object_key(file.session_id, file.id))
        .await?;

    let filename = query
        .filename
        .as_deref()
        .filter(|f| !f.is_empty())
        .unwrap_or(&file.original_filename);

    tracing::debug!(
        session_id = %file.session_id,
        file_id = %file.id,
        size = file.file_size,
        "Streaming download"
    );

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, file.mime_type.as_str())
        .header(header::CONTENT_LENGTH, file.file_size)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_attachment(filename),
        )
        .body(Body::from_stream(body.stream))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}

/// RFC 6266 attachment header. The quoted fallback escapes `"` and `\` and
/// strips control characters; non-ASCII names additionally get an RFC 5987
/// `filename*` parameter carrying the percent-encoded UTF-8 original.
fn content_disposition_attachment(filename: &str) -> String {
    let cleaned: String = filename.chars().filter(|c| !c.is_control()).collect();

    let fallback = cleaned
        .chars()
        .map(|c| if c.is_ascii() { c } else { '_' })
        .collect::<String>()
        .replace('\\', "\\\\")
        .replace('"', "\\\"");

    if cleaned.is_ascii() {
        format!("attachment; filename=\"{}\"", fallback)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            urlencoding::encode(&cleaned)
        )
    }
}

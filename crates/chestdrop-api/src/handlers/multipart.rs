//! Resumable chunked uploads.
//!
//! The create step asks the blob store for a multipart upload and folds the
//! whole in-flight state — upload id, filename, mime type, size — into a
//! signed multipart token. Part uploads and completion resume from that token
//! alone; the database sees nothing until assembly is confirmed, so an
//! abandoned upload never leaves a dangling file row.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chestdrop_core::constants::{MAX_PART_NUMBER, MIN_PART_NUMBER};
use chestdrop_core::models::NewStoredFile;
use chestdrop_core::AppError;
use chestdrop_storage::keys::object_key;
use chestdrop_storage::{ByteStream, PartRef, StorageError};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::handlers::{authorize_multipart, authorize_open_chest};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateMultipartRequest {
    pub filename: String,
    pub mime_type: String,
    pub file_size: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateMultipartResponse {
    pub file_id: Uuid,
    /// The multipart bearer token. Named `uploadId` in the external contract;
    /// its value is the signed token, not the blob store's raw handle.
    pub upload_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadPartResponse {
    pub etag: String,
    pub part_number: i32,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PartSpec {
    pub part_number: i32,
    pub etag: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteMultipartRequest {
    pub parts: Vec<PartSpec>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteMultipartResponse {
    pub file_id: Uuid,
    pub filename: String,
}

/// Begin a chunked upload for one large file.
#[utoipa::path(
    post,
    path = "/api/chest/{sid}/multipart/create",
    tag = "multipart",
    params(("sid" = Uuid, Path, description = "Chest session ID")),
    request_body = CreateMultipartRequest,
    responses(
        (status = 200, description = "Multipart upload started", body = CreateMultipartResponse),
        (status = 400, description = "Invalid metadata", body = ErrorResponse),
        (status = 401, description = "Missing or invalid upload token", body = ErrorResponse),
        (status = 404, description = "Chest not found or already sealed", body = ErrorResponse)
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip(state, headers, body), fields(session_id = %sid, operation = "create_multipart"))]
pub async fn create_multipart(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<Uuid>,
    headers: HeaderMap,
    body: ValidatedJson<CreateMultipartRequest>,
) -> Result<Json<CreateMultipartResponse>, HttpAppError> {
    let ValidatedJson(request) = body;

    authorize_open_chest(&state, &headers, sid).await?;

    if request.filename.trim().is_empty() {
        return Err(AppError::BadRequest("filename must not be empty".to_string()).into());
    }
    if request.mime_type.trim().is_empty() {
        return Err(AppError::BadRequest("mimeType must not be empty".to_string()).into());
    }
    if request.file_size <= 0 {
        return Err(AppError::BadRequest("fileSize must be positive".to_string()).into());
    }

    let file_id = Uuid::new_v4();
    let blob_upload_id = state
        .storage
        .multipart_create(&object_key(sid, file_id))
        .await?;

    let token = state.tokens.mint_multipart(
        sid,
        file_id,
        blob_upload_id,
        request.filename.clone(),
        request.mime_type,
        request.file_size,
    )?;

    tracing::info!(
        session_id = %sid,
        file_id = %file_id,
        filename = %request.filename,
        file_size = request.file_size,
        "Multipart upload created"
    );

    Ok(Json(CreateMultipartResponse {
        file_id,
        upload_id: token,
    }))
}

/// Upload (or retry) one part. Parts may arrive in any order; re-sending a
/// part number replaces the prior body.
#[utoipa::path(
    put,
    path = "/api/chest/{sid}/multipart/{fid}/part/{n}",
    tag = "multipart",
    params(
        ("sid" = Uuid, Path, description = "Chest session ID"),
        ("fid" = Uuid, Path, description = "File ID"),
        ("n" = i32, Path, description = "Part number (1-10000)")
    ),
    responses(
        (status = 200, description = "Part stored", body = UploadPartResponse),
        (status = 400, description = "Invalid part number or empty body", body = ErrorResponse),
        (status = 401, description = "Missing or invalid multipart token", body = ErrorResponse),
        (status = 403, description = "Token bound to another chest or file", body = ErrorResponse)
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip(state, headers, body), fields(session_id = %sid, file_id = %fid, part_number = n, operation = "upload_part"))]
pub async fn upload_part(
    State(state): State<Arc<AppState>>,
    Path((sid, fid, n)): Path<(Uuid, Uuid, i32)>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<UploadPartResponse>, HttpAppError> {
    let claims = authorize_multipart(&state, &headers, sid, fid)?;

    if !(MIN_PART_NUMBER..=MAX_PART_NUMBER).contains(&n) {
        return Err(AppError::BadRequest(format!(
            "Part number must be between {} and {}",
            MIN_PART_NUMBER, MAX_PART_NUMBER
        ))
        .into());
    }

    // Pull the first non-empty chunk so an empty body is rejected before
    // anything reaches the blob store; the rest streams straight through.
    let mut rest = body.into_data_stream();
    let first = loop {
        match rest.next().await {
            None => {
                return Err(
                    AppError::BadRequest("Part body must not be empty".to_string()).into(),
                );
            }
            Some(Err(e)) => {
                return Err(
                    AppError::BadRequest(format!("Failed to read part body: {}", e)).into(),
                );
            }
            Some(Ok(chunk)) if chunk.is_empty() => continue,
            Some(Ok(chunk)) => break chunk,
        }
    };

    let stream: ByteStream<'static> = Box::pin(
        futures::stream::once(async move { Ok::<_, StorageError>(first) }).chain(
            rest.map(|chunk| {
                chunk.map_err(|e| StorageError::Io(std::io::Error::other(format!(
                    "Failed to read part body: {}",
                    e
                ))))
            }),
        ),
    );

    let etag = state
        .storage
        .multipart_put_part(&object_key(sid, fid), &claims.upload_id, n, stream)
        .await?;

    Ok(Json(UploadPartResponse {
        etag,
        part_number: n,
    }))
}

/// Commit a chunked upload: assemble the parts, then insert the file row.
#[utoipa::path(
    post,
    path = "/api/chest/{sid}/multipart/{fid}/complete",
    tag = "multipart",
    params(
        ("sid" = Uuid, Path, description = "Chest session ID"),
        ("fid" = Uuid, Path, description = "File ID")
    ),
    request_body = CompleteMultipartRequest,
    responses(
        (status = 200, description = "Upload assembled", body = CompleteMultipartResponse),
        (status = 400, description = "Empty parts list", body = ErrorResponse),
        (status = 401, description = "Missing or invalid multipart token", body = ErrorResponse),
        (status = 403, description = "Token bound to another chest or file", body = ErrorResponse)
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip(state, headers, body), fields(session_id = %sid, file_id = %fid, operation = "complete_multipart"))]
pub async fn complete_multipart(
    State(state): State<Arc<AppState>>,
    Path((sid, fid)): Path<(Uuid, Uuid)>,
    headers: HeaderMap,
    body: ValidatedJson<CompleteMultipartRequest>,
) -> Result<Json<CompleteMultipartResponse>, HttpAppError> {
    let ValidatedJson(request) = body;
    let claims = authorize_multipart(&state, &headers, sid, fid)?;

    if request.parts.is_empty() {
        return Err(AppError::BadRequest("Parts list must not be empty".to_string()).into());
    }

    let mut parts: Vec<PartRef> = request
        .parts
        .iter()
        .map(|p| PartRef {
            part_number: p.part_number,
            etag: p.etag.clone(),
        })
        .collect();
    parts.sort_by_key(|p| p.part_number);

    state
        .storage
        .multipart_complete(&object_key(sid, fid), &claims.upload_id, &parts)
        .await?;

    // Assembly confirmed; only now does the file become durable metadata.
    let row = NewStoredFile {
        id: fid,
        session_id: sid,
        original_filename: claims.filename.clone(),
        mime_type: claims.mime_type,
        file_size: claims.file_size,
        file_extension: NewStoredFile::extension_of(&claims.filename),
        is_text: false,
    };
    state.files.insert_one(&row).await?;

    tracing::info!(
        session_id = %sid,
        file_id = %fid,
        parts = parts.len(),
        filename = %claims.filename,
        "Multipart upload completed"
    );

    Ok(Json(CompleteMultipartResponse {
        file_id: fid,
        filename: claims.filename,
    }))
}

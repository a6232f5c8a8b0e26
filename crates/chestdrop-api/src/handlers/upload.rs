//! Single-request upload path: multiple files and text items in one form.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::HeaderMap,
    Json,
};
use chestdrop_core::models::NewStoredFile;
use chestdrop_core::AppError;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ErrorResponse, HttpAppError};
use crate::handlers::authorize_open_chest;
use crate::services::upload::store_form_items;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub file_id: Uuid,
    pub filename: String,
    pub is_text: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadFilesResponse {
    pub uploaded_files: Vec<UploadedFile>,
}

/// Stream every part of the form into the blob store, then commit the batch
/// of file rows. File parts go to storage chunk by chunk as the form is read;
/// the row-insert batch afterwards is the commit point, so the client never
/// observes a row without its blob. Any failure fails the request as a unit
/// and leaves already-written blobs to the reaper.
#[utoipa::path(
    post,
    path = "/api/chest/{sid}/upload",
    tag = "chest",
    params(("sid" = Uuid, Path, description = "Chest session ID")),
    responses(
        (status = 200, description = "Files stored", body = UploadFilesResponse),
        (status = 400, description = "Invalid form", body = ErrorResponse),
        (status = 401, description = "Missing or invalid upload token", body = ErrorResponse),
        (status = 403, description = "Token bound to another chest", body = ErrorResponse),
        (status = 404, description = "Chest not found or already sealed", body = ErrorResponse)
    ),
    security(("bearer_token" = []))
)]
#[tracing::instrument(skip(state, headers, multipart), fields(session_id = %sid, operation = "upload_files"))]
pub async fn upload_files(
    State(state): State<Arc<AppState>>,
    Path(sid): Path<Uuid>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<UploadFilesResponse>, HttpAppError> {
    authorize_open_chest(&state, &headers, sid).await?;

    let items = store_form_items(&mut multipart, state.storage.as_ref(), sid).await?;
    if items.is_empty() {
        return Err(AppError::BadRequest(
            "Multipart form contained no files or text items".to_string(),
        )
        .into());
    }

    let rows: Vec<NewStoredFile> = items
        .iter()
        .map(|item| NewStoredFile {
            id: item.file_id,
            session_id: sid,
            original_filename: item.filename.clone(),
            mime_type: item.mime_type.clone(),
            file_size: item.file_size,
            file_extension: NewStoredFile::extension_of(&item.filename),
            is_text: item.is_text,
        })
        .collect();
    state.files.insert_many(&rows).await?;

    tracing::info!(
        session_id = %sid,
        files = items.iter().filter(|i| !i.is_text).count(),
        text_items = items.iter().filter(|i| i.is_text).count(),
        "Upload stored"
    );

    let uploaded_files = items
        .into_iter()
        .map(|item| UploadedFile {
            file_id: item.file_id,
            filename: item.filename,
            is_text: item.is_text,
        })
        .collect();

    Ok(Json(UploadFilesResponse { uploaded_files }))
}

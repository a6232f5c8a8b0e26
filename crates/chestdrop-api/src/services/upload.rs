//! Intake for the single-request upload form.
//!
//! The form carries two field kinds: `files` parts (binary bodies) and
//! `textItems` parts (JSON `{content, filename?}`). Multipart fields arrive
//! sequentially on the wire, so each `files` part is forwarded to the blob
//! store chunk by chunk as it is read — a whole file is never held in
//! memory. Text items are small JSON bodies; they are decoded in memory and
//! stored after the walk. The returned list preserves request order: files
//! first in form order, then text items in form order.

use axum::extract::multipart::{Field, Multipart};
use bytes::Bytes;
use chrono::Utc;
use chestdrop_core::constants::{DEFAULT_MIME_TYPE, DEFAULT_UPLOAD_FILENAME};
use chestdrop_core::AppError;
use chestdrop_storage::keys::object_key;
use chestdrop_storage::{bytes_stream, ByteStream, Storage, StorageError};
use serde::Deserialize;
use uuid::Uuid;

/// Metadata of one stored form item; the blob is already in the store.
#[derive(Debug, Clone)]
pub struct StoredItem {
    pub file_id: Uuid,
    pub filename: String,
    pub mime_type: String,
    pub is_text: bool,
    pub file_size: i64,
}

struct PendingText {
    file_id: Uuid,
    filename: String,
    content: Bytes,
}

#[derive(Debug, Deserialize)]
struct TextItemBody {
    content: String,
    filename: Option<String>,
}

/// Walk the multipart form, storing every item's blob as it is encountered.
/// Unknown field names are ignored. Errors reading, parsing, or storing any
/// part fail the whole request; blobs already written stay behind for the
/// reaper to collect with the abandoned session.
pub async fn store_form_items(
    multipart: &mut Multipart,
    storage: &dyn Storage,
    session_id: Uuid,
) -> Result<Vec<StoredItem>, AppError> {
    let mut files = Vec::new();
    let mut texts: Vec<PendingText> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read multipart form: {}", e)))?
    {
        let field_name = field.name().unwrap_or_default().to_string();

        match field_name.as_str() {
            "files" | "files[]" => {
                let filename = field
                    .file_name()
                    .map(|s| s.to_string())
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| DEFAULT_UPLOAD_FILENAME.to_string());
                let mime_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());

                let file_id = Uuid::new_v4();
                let file_size = stream_field_to_storage(storage, session_id, file_id, field).await?;

                files.push(StoredItem {
                    file_id,
                    filename,
                    mime_type,
                    is_text: false,
                    file_size,
                });
            }
            "textItems" | "textItems[]" => {
                let raw = field.text().await.map_err(|e| {
                    AppError::BadRequest(format!("Failed to read text item: {}", e))
                })?;
                let body: TextItemBody = serde_json::from_str(&raw).map_err(|e| {
                    AppError::BadRequest(format!("Invalid text item JSON: {}", e))
                })?;

                let filename = body
                    .filename
                    .filter(|f| !f.is_empty())
                    .unwrap_or_else(default_text_filename);

                texts.push(PendingText {
                    file_id: Uuid::new_v4(),
                    filename,
                    content: Bytes::from(body.content.into_bytes()),
                });
            }
            _ => {}
        }
    }

    // Text items are tiny and already materialized; store them together.
    let stored_texts = futures::future::try_join_all(texts.into_iter().map(|text| {
        let key = object_key(session_id, text.file_id);
        async move {
            let file_size = storage.put(&key, bytes_stream(text.content)).await?;
            Ok::<_, StorageError>(StoredItem {
                file_id: text.file_id,
                filename: text.filename,
                mime_type: "text/plain".to_string(),
                is_text: true,
                file_size: file_size as i64,
            })
        }
    }))
    .await
    .map_err(|e| AppError::Storage(format!("Failed to store text item: {}", e)))?;

    files.extend(stored_texts);
    Ok(files)
}

/// Forward one `files` part to the blob store as a byte stream; returns the
/// number of bytes stored.
async fn stream_field_to_storage(
    storage: &dyn Storage,
    session_id: Uuid,
    file_id: Uuid,
    field: Field<'_>,
) -> Result<i64, AppError> {
    let key = object_key(session_id, file_id);

    let stream: ByteStream<'_> =
        Box::pin(futures::stream::try_unfold(field, |mut field| async move {
            match field.chunk().await {
                Ok(Some(chunk)) => Ok(Some((chunk, field))),
                Ok(None) => Ok(None),
                Err(e) => Err(StorageError::Io(std::io::Error::other(format!(
                    "Failed to read file part: {}",
                    e
                )))),
            }
        }));

    let written = storage
        .put(&key, stream)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to store upload: {}", e)))?;

    Ok(written as i64)
}

fn default_text_filename() -> String {
    format!("text-{}.txt", Utc::now().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_text_filename_shape() {
        let name = default_text_filename();
        assert!(name.starts_with("text-"));
        assert!(name.ends_with(".txt"));
        let millis = &name["text-".len()..name.len() - ".txt".len()];
        assert!(millis.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn test_text_item_body_parsing() {
        let body: TextItemBody =
            serde_json::from_str(r#"{"content":"hi","filename":"b.txt"}"#).unwrap();
        assert_eq!(body.content, "hi");
        assert_eq!(body.filename.as_deref(), Some("b.txt"));

        let body: TextItemBody = serde_json::from_str(r#"{"content":"unnamed"}"#).unwrap();
        assert!(body.filename.is_none());

        assert!(serde_json::from_str::<TextItemBody>(r#"{"filename":"x"}"#).is_err());
    }
}

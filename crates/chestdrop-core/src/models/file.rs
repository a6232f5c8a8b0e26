use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// A stored-file row from the `files` table. A live row is durable evidence
/// of a blob at `{session_id}/{id}` in the blob store.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StoredFile {
    pub id: Uuid,
    pub session_id: Uuid,
    pub original_filename: String,
    pub mime_type: String,
    pub file_size: i64,
    pub file_extension: String,
    pub is_text: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

/// Insert payload for a file row. Metadata is uploader-reported and is not
/// re-validated against the blob.
#[derive(Debug, Clone)]
pub struct NewStoredFile {
    pub id: Uuid,
    pub session_id: Uuid,
    pub original_filename: String,
    pub mime_type: String,
    pub file_size: i64,
    pub file_extension: String,
    pub is_text: bool,
}

impl NewStoredFile {
    /// Lowercased extension after the last dot, empty when the name has none.
    pub fn extension_of(filename: &str) -> String {
        match filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_lowercase(),
            _ => String::new(),
        }
    }
}

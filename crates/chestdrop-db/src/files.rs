use chrono::{DateTime, Utc};
use chestdrop_core::models::{NewStoredFile, StoredFile};
use chestdrop_core::AppError;
use sqlx::{PgPool, QueryBuilder, Row};
use uuid::Uuid;

const FILE_COLUMNS: &str = "id, session_id, original_filename, mime_type, file_size, \
     file_extension, is_text, created_at, updated_at, is_deleted";

/// Repository for stored-file rows.
#[derive(Clone)]
pub struct FileRepository {
    pool: PgPool,
}

impl FileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Batch-insert file rows in one statement. The single-request upload path
    /// commits all its rows here after every blob put has succeeded.
    pub async fn insert_many(&self, files: &[NewStoredFile]) -> Result<(), AppError> {
        if files.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::new(
            "INSERT INTO files (id, session_id, original_filename, mime_type, file_size, \
             file_extension, is_text) ",
        );
        builder.push_values(files, |mut b, file| {
            b.push_bind(file.id)
                .push_bind(file.session_id)
                .push_bind(&file.original_filename)
                .push_bind(&file.mime_type)
                .push_bind(file.file_size)
                .push_bind(&file.file_extension)
                .push_bind(file.is_text);
        });

        builder.build().execute(&self.pool).await?;
        Ok(())
    }

    /// Insert a single file row (the multipart-complete commit point).
    pub async fn insert_one(&self, file: &NewStoredFile) -> Result<(), AppError> {
        self.insert_many(std::slice::from_ref(file)).await
    }

    /// Live files of a session, oldest first (id as a stable tiebreak).
    pub async fn list_for_session(&self, session_id: Uuid) -> Result<Vec<StoredFile>, AppError> {
        let rows = sqlx::query_as::<_, StoredFile>(&format!(
            r#"
            SELECT {FILE_COLUMNS}
            FROM files
            WHERE session_id = $1 AND is_deleted = FALSE
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Count of live files in a session.
    pub async fn count_for_session(&self, session_id: Uuid) -> Result<i64, AppError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM files WHERE session_id = $1 AND is_deleted = FALSE",
        )
        .bind(session_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("count"))
    }

    /// A live file in a live, sealed, non-expired session. The download path's
    /// single query: the session filter enforces both expiry and the
    /// token-to-file binding.
    pub async fn get_in_session(
        &self,
        session_id: Uuid,
        file_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<StoredFile>, AppError> {
        let row = sqlx::query_as::<_, StoredFile>(
            r#"
            SELECT f.id, f.session_id, f.original_filename, f.mime_type, f.file_size,
                   f.file_extension, f.is_text, f.created_at, f.updated_at, f.is_deleted
            FROM files f
            JOIN sessions s ON s.id = f.session_id
            WHERE f.id = $1
              AND f.session_id = $2
              AND f.is_deleted = FALSE
              AND s.is_deleted = FALSE
              AND s.upload_complete = TRUE
              AND (s.expires_at IS NULL OR s.expires_at > $3)
            "#,
        )
        .bind(file_id)
        .bind(session_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Soft-delete every live file of a session; returns how many rows turned.
    pub async fn soft_delete_for_session(&self, session_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE files
            SET is_deleted = TRUE, updated_at = NOW()
            WHERE session_id = $1 AND is_deleted = FALSE
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

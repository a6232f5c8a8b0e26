use chrono::{DateTime, Utc};
use chestdrop_core::models::ChestSession;
use chestdrop_core::AppError;
use sqlx::PgPool;
use uuid::Uuid;

const SESSION_COLUMNS: &str =
    "id, retrieval_code, upload_complete, expires_at, created_at, updated_at, is_deleted";

/// Repository for chest session rows.
#[derive(Clone)]
pub struct SessionRepository {
    pool: PgPool,
}

impl SessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a fresh open session.
    pub async fn insert(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("INSERT INTO sessions (id) VALUES ($1)")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Fetch a session that is still open (unsealed, live).
    pub async fn get_open(&self, id: Uuid) -> Result<Option<ChestSession>, AppError> {
        let row = sqlx::query_as::<_, ChestSession>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM sessions
            WHERE id = $1 AND upload_complete = FALSE AND is_deleted = FALSE
            "#
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Fetch a sealed, live, non-expired session by retrieval code.
    pub async fn get_sealed_by_code(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<ChestSession>, AppError> {
        let row = sqlx::query_as::<_, ChestSession>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM sessions
            WHERE retrieval_code = $1
              AND upload_complete = TRUE
              AND is_deleted = FALSE
              AND (expires_at IS NULL OR expires_at > $2)
            "#
        ))
        .bind(code)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Seal a session: assign its retrieval code and expiry in one conditional
    /// update. Returns the affected-row count; zero means the session does not
    /// exist, is deleted, or was already sealed by a concurrent writer. A
    /// unique-index violation on `retrieval_code` surfaces as a database error
    /// for the caller to retry with a fresh code.
    pub async fn mark_sealed(
        &self,
        id: Uuid,
        retrieval_code: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET retrieval_code = $2,
                upload_complete = TRUE,
                expires_at = $3,
                updated_at = NOW()
            WHERE id = $1 AND upload_complete = FALSE AND is_deleted = FALSE
            "#,
        )
        .bind(id)
        .bind(retrieval_code)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Soft-delete a session. Idempotent.
    pub async fn soft_delete(&self, id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET is_deleted = TRUE, updated_at = NOW()
            WHERE id = $1 AND is_deleted = FALSE
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Sealed sessions whose expiry has passed. Permanent sessions
    /// (`expires_at IS NULL`) are excluded.
    pub async fn select_expired(&self, now: DateTime<Utc>) -> Result<Vec<ChestSession>, AppError> {
        let rows = sqlx::query_as::<_, ChestSession>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM sessions
            WHERE upload_complete = TRUE
              AND is_deleted = FALSE
              AND expires_at IS NOT NULL
              AND expires_at <= $1
            ORDER BY expires_at ASC
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Open sessions created at or before `cutoff`; no token minted for them
    /// can still be live.
    pub async fn select_abandoned(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ChestSession>, AppError> {
        let rows = sqlx::query_as::<_, ChestSession>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM sessions
            WHERE upload_complete = FALSE
              AND is_deleted = FALSE
              AND created_at <= $1
            ORDER BY created_at ASC
            "#
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use crate::constants::MULTIPART_TOKEN_TTL_SECS;

/// The logical state of a chest at a point in time.
///
/// `Reaped` is not derivable from a live row: reaped chests are soft-deleted
/// and no longer surface through the repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChestState {
    /// Accepting uploads; no retrieval code yet.
    Open,
    /// Sealed with a retrieval code and a future expiry.
    Sealed,
    /// Sealed with `validityDays = -1`; never expires on its own.
    Permanent,
    /// Sealed and past its expiry; eligible for reaping.
    Expired,
}

/// A chest row from the `sessions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ChestSession {
    pub id: Uuid,
    pub retrieval_code: Option<String>,
    pub upload_complete: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

impl ChestSession {
    /// Derive the lifecycle state at `now`.
    pub fn state(&self, now: DateTime<Utc>) -> ChestState {
        if !self.upload_complete {
            return ChestState::Open;
        }
        match self.expires_at {
            None => ChestState::Permanent,
            Some(expires_at) if expires_at <= now => ChestState::Expired,
            Some(_) => ChestState::Sealed,
        }
    }

    /// An open chest older than the multipart-token horizon is abandoned: no
    /// token minted for it can still be live.
    pub fn is_abandoned(&self, now: DateTime<Utc>) -> bool {
        !self.upload_complete
            && self.created_at + Duration::seconds(MULTIPART_TOKEN_TTL_SECS) <= now
    }
}

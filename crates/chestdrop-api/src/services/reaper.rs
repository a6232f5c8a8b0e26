//! Background reaper: expires sealed chests past their deadline and collects
//! abandoned (never-sealed) chests once no token for them can still be live.
//!
//! One sweep per tick. Sweeps tolerate overlap: every step is idempotent per
//! session, and a session reaped by one sweep vanishes from the next sweep's
//! selects. Per-session failures are recorded and the sweep moves on; it never
//! propagates an error out.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use chestdrop_core::constants::MULTIPART_TOKEN_TTL_SECS;
use chestdrop_core::models::ChestSession;
use chestdrop_db::{FileRepository, SessionRepository};
use chestdrop_storage::keys::session_prefix;
use chestdrop_storage::Storage;
use serde::Serialize;

/// Why a session is being reaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReapReason {
    Expired,
    Abandoned,
}

impl ReapReason {
    fn as_str(self) -> &'static str {
        match self {
            ReapReason::Expired => "expired",
            ReapReason::Abandoned => "abandoned",
        }
    }
}

/// Outcome of one sweep.
#[derive(Debug, Default, Serialize)]
pub struct SweepSummary {
    pub expired: usize,
    pub abandoned: usize,
    pub deleted_files: u64,
    pub deleted_blobs: usize,
    pub errors: Vec<String>,
}

pub struct Reaper {
    sessions: SessionRepository,
    files: FileRepository,
    storage: Arc<dyn Storage>,
    interval: StdDuration,
}

impl Reaper {
    pub fn new(
        sessions: SessionRepository,
        files: FileRepository,
        storage: Arc<dyn Storage>,
        interval: StdDuration,
    ) -> Self {
        Self {
            sessions,
            files,
            storage,
            interval,
        }
    }

    /// Start the periodic sweep task. Returns a JoinHandle for shutdown.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(self.interval);
            // The first tick fires immediately; that gives a cleanup pass on
            // startup after downtime.
            loop {
                tick.tick().await;

                tracing::info!("Starting reaper sweep");
                let summary = self.sweep().await;
                tracing::info!(
                    expired = summary.expired,
                    abandoned = summary.abandoned,
                    deleted_files = summary.deleted_files,
                    deleted_blobs = summary.deleted_blobs,
                    errors = summary.errors.len(),
                    "Reaper sweep completed"
                );
            }
        })
    }

    /// One full sweep. Public so deployments can also run it on demand.
    pub async fn sweep(&self) -> SweepSummary {
        let mut summary = SweepSummary::default();
        let now = Utc::now();

        let expired = match self.sessions.select_expired(now).await {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::error!(error = %e, "Failed to select expired sessions");
                summary.errors.push(format!("select expired: {}", e));
                return summary;
            }
        };

        let cutoff = now - Duration::seconds(MULTIPART_TOKEN_TTL_SECS);
        let abandoned = match self.sessions.select_abandoned(cutoff).await {
            Ok(sessions) => sessions,
            Err(e) => {
                tracing::error!(error = %e, "Failed to select abandoned sessions");
                summary.errors.push(format!("select abandoned: {}", e));
                return summary;
            }
        };

        summary.expired = expired.len();
        summary.abandoned = abandoned.len();

        let tagged = expired
            .into_iter()
            .map(|s| (s, ReapReason::Expired))
            .chain(abandoned.into_iter().map(|s| (s, ReapReason::Abandoned)));

        for (session, reason) in tagged {
            self.reap_session(&session, reason, &mut summary).await;
        }

        summary
    }

    async fn reap_session(
        &self,
        session: &ChestSession,
        reason: ReapReason,
        summary: &mut SweepSummary,
    ) {
        let prefix = session_prefix(session.id);

        tracing::info!(
            session_id = %session.id,
            reason = reason.as_str(),
            expires_at = ?session.expires_at,
            "Reaping chest"
        );

        // Blobs first; row soft-deletes follow, so a crash mid-way leaves the
        // session still selectable by the next sweep.
        match self.storage.list(&prefix).await {
            Ok(keys) => {
                for key in keys {
                    match self.storage.delete(&key).await {
                        Ok(()) => summary.deleted_blobs += 1,
                        Err(e) => {
                            tracing::error!(error = %e, key = %key, "Failed to delete blob, continuing");
                            summary.errors.push(format!("delete {}: {}", key, e));
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, session_id = %session.id, "Failed to list blobs, continuing");
                summary.errors.push(format!("list {}: {}", prefix, e));
            }
        }

        // An abandoned chest may still hold in-flight multipart uploads; their
        // tokens are past the 48 h horizon, so nobody can resume them.
        if reason == ReapReason::Abandoned {
            match self.storage.multipart_list(&prefix).await {
                Ok(uploads) => {
                    for (key, upload_id) in uploads {
                        if let Err(e) = self.storage.multipart_abort(&key, &upload_id).await {
                            tracing::error!(
                                error = %e,
                                key = %key,
                                "Failed to abort multipart upload, continuing"
                            );
                            summary.errors.push(format!("abort {}: {}", key, e));
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, session_id = %session.id, "Failed to list multipart uploads, continuing");
                    summary.errors.push(format!("multipart list {}: {}", prefix, e));
                }
            }
        }

        match self.files.soft_delete_for_session(session.id).await {
            Ok(count) => summary.deleted_files += count,
            Err(e) => {
                tracing::error!(error = %e, session_id = %session.id, "Failed to soft-delete files");
                summary.errors.push(format!("files {}: {}", session.id, e));
            }
        }

        if let Err(e) = self.sessions.soft_delete(session.id).await {
            tracing::error!(error = %e, session_id = %session.id, "Failed to soft-delete session");
            summary.errors.push(format!("session {}: {}", session.id, e));
        }
    }
}

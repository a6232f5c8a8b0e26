//! Application assembly: database, storage, state, reaper, router.

pub mod database;
pub mod routes;
pub mod server;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use chestdrop_core::Config;
use chestdrop_db::{FileRepository, SessionRepository};

use crate::auth::{TokenService, TotpGate};
use crate::services::reaper::Reaper;
use crate::state::AppState;

/// Wire everything together. Returns the shared state, the router, and the
/// reaper task handle (when enabled) so the caller controls its lifetime.
pub async fn initialize_app(
    config: Config,
) -> Result<(Arc<AppState>, Router, Option<tokio::task::JoinHandle<()>>)> {
    let pool = database::setup_database(&config).await?;
    let storage = chestdrop_storage::create_storage(&config).await?;

    let totp = if config.require_totp {
        let gate = TotpGate::from_secrets(&config.totp_secrets)
            .map_err(|e| anyhow::anyhow!("TOTP configuration invalid: {}", e))?;
        tracing::info!(secrets = config.totp_secrets.len(), "TOTP admission gate enabled");
        Some(Arc::new(gate))
    } else {
        None
    };

    let state = Arc::new(AppState {
        sessions: SessionRepository::new(pool.clone()),
        files: FileRepository::new(pool.clone()),
        storage,
        tokens: TokenService::new(&config.jwt_secret),
        totp,
        pool,
        config: config.clone(),
    });

    let reaper_handle = if config.reaper_enabled {
        let reaper = Arc::new(Reaper::new(
            state.sessions.clone(),
            state.files.clone(),
            state.storage.clone(),
            Duration::from_secs(config.reaper_interval_secs),
        ));
        tracing::info!(
            interval_secs = config.reaper_interval_secs,
            "Reaper scheduled"
        );
        Some(reaper.start())
    } else {
        tracing::warn!("Reaper disabled; expired chests will not be collected");
        None
    };

    let router = routes::build_router(state.clone(), &config);

    Ok((state, router, reaper_handle))
}

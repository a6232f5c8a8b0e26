//! Application state shared by all handlers.

use std::sync::Arc;

use chestdrop_core::Config;
use chestdrop_db::{FileRepository, SessionRepository};
use chestdrop_storage::Storage;
use sqlx::PgPool;

use crate::auth::{TokenService, TotpGate};

/// Everything a request handler needs: repositories over the metadata store,
/// the blob store, the token service, and the optional TOTP admission gate.
/// No other shared mutable state exists in-process.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pool: PgPool,
    pub sessions: SessionRepository,
    pub files: FileRepository,
    pub storage: Arc<dyn Storage>,
    pub tokens: TokenService,
    pub totp: Option<Arc<TotpGate>>,
}

fn _assert_app_state_send_sync() {
    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}
    assert_send::<AppState>();
    assert_sync::<AppState>();
}

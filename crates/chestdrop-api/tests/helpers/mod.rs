//! Shared test harness: real Postgres (when configured) + in-memory blobs.
//!
//! Tests call [`setup_test_app`] and return early when
//! `CHESTDROP_TEST_DATABASE_URL` is unset, so the suite passes without
//! external services and exercises the full HTTP surface when a database is
//! available.

// Each test binary compiles this module separately and uses a different
// subset of it.
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use axum_test::TestServer;
use chestdrop_api::auth::{TokenService, TotpGate};
use chestdrop_api::setup::routes::build_router;
use chestdrop_api::state::AppState;
use chestdrop_core::config::{Config, StorageBackend};
use chestdrop_db::{FileRepository, SessionRepository};
use chestdrop_storage::MemoryStorage;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub const TEST_JWT_SECRET: &str = "integration-test-signing-key";

/// Serializes tests that run reaper sweeps, so one test's sweep cannot eat
/// another test's freshly backdated sessions mid-assertion.
static SWEEP_LOCK: std::sync::OnceLock<tokio::sync::Mutex<()>> = std::sync::OnceLock::new();

#[allow(dead_code)]
pub async fn sweep_lock() -> tokio::sync::MutexGuard<'static, ()> {
    SWEEP_LOCK
        .get_or_init(|| tokio::sync::Mutex::new(()))
        .lock()
        .await
}

pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub storage: MemoryStorage,
    pub pool: PgPool,
}

pub fn test_config() -> Config {
    Config {
        server_port: 0,
        database_url: String::new(),
        db_max_connections: 5,
        db_timeout_seconds: 30,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        require_totp: false,
        totp_secrets: Vec::new(),
        storage_backend: StorageBackend::Memory,
        s3_bucket: None,
        s3_region: None,
        s3_endpoint: None,
        local_storage_path: "./data".to_string(),
        reaper_enabled: false,
        reaper_interval_secs: 3600,
        max_body_bytes: 64 * 1024 * 1024,
        environment: "test".to_string(),
    }
}

/// Build the app against the test database, or `None` when DB-backed tests
/// are disabled in this environment.
pub async fn setup_test_app() -> Option<TestApp> {
    setup_test_app_with(test_config()).await
}

pub async fn setup_test_app_with(mut config: Config) -> Option<TestApp> {
    let url = match std::env::var("CHESTDROP_TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("CHESTDROP_TEST_DATABASE_URL not set; skipping integration test");
            return None;
        }
    };
    config.database_url = url.clone();

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("Failed to connect to test database");

    let migrations = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    sqlx::migrate::Migrator::new(migrations)
        .await
        .expect("Failed to load migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let storage = MemoryStorage::new();

    let totp = if config.require_totp {
        Some(Arc::new(
            TotpGate::from_secrets(&config.totp_secrets).expect("valid TOTP secrets"),
        ))
    } else {
        None
    };

    let state = Arc::new(AppState {
        sessions: SessionRepository::new(pool.clone()),
        files: FileRepository::new(pool.clone()),
        storage: Arc::new(storage.clone()),
        tokens: TokenService::new(&config.jwt_secret),
        totp,
        pool: pool.clone(),
        config: config.clone(),
    });

    let router = build_router(state.clone(), &config);
    let server = TestServer::new(router).expect("Failed to create test server");

    Some(TestApp {
        server,
        state,
        storage,
        pool,
    })
}

/// Open a chest and return `(session_id, upload_token)`.
pub async fn create_chest(app: &TestApp) -> (uuid::Uuid, String) {
    let response = app.server.post("/api/chest").await;
    assert_eq!(response.status_code(), 200);
    let body: serde_json::Value = response.json();
    let session_id = body["sessionId"]
        .as_str()
        .expect("sessionId")
        .parse()
        .expect("uuid");
    let upload_token = body["uploadToken"].as_str().expect("uploadToken").to_string();
    assert_eq!(body["expiresIn"], 86400);
    (session_id, upload_token)
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

//! Public service configuration and health probes.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct ServiceConfigResponse {
    /// Whether chest creation demands a TOTP code.
    #[serde(rename = "requireTOTP")]
    pub require_totp: bool,
}

/// Expose the knobs the upload frontend needs before it can create a chest.
#[utoipa::path(
    get,
    path = "/api/config",
    tag = "config",
    responses(
        (status = 200, description = "Service configuration", body = ServiceConfigResponse)
    )
)]
pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<ServiceConfigResponse> {
    Json(ServiceConfigResponse {
        require_totp: state.config.require_totp,
    })
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    tag = "config",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

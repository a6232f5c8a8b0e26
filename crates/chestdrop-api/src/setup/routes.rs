//! Route configuration and setup

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{get, post, put},
    Router,
};
use chestdrop_core::Config;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::api_doc;
use crate::handlers::{
    chest_create, download, multipart, retrieve, seal, service_config, upload,
};
use crate::state::AppState;

/// Assemble the application router with CORS, tracing, and body limits.
pub fn build_router(state: Arc<AppState>, config: &Config) -> Router {
    // Anyone holding a retrieval code may read from anywhere; CORS stays open.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(service_config::health))
        .route("/api/config", get(service_config::get_config))
        .route("/api/openapi.json", get(api_doc::openapi_json))
        .route("/api/chest", post(chest_create::create_chest))
        .route("/api/chest/{sid}/upload", post(upload::upload_files))
        .route(
            "/api/chest/{sid}/multipart/create",
            post(multipart::create_multipart),
        )
        .route(
            "/api/chest/{sid}/multipart/{fid}/part/{n}",
            put(multipart::upload_part),
        )
        .route(
            "/api/chest/{sid}/multipart/{fid}/complete",
            post(multipart::complete_multipart),
        )
        .route("/api/chest/{sid}/complete", post(seal::seal_chest))
        .route("/api/retrieve/{code}", get(retrieve::retrieve_by_code))
        .route("/api/download/{fid}", get(download::download_file))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

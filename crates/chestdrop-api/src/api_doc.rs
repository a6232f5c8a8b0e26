//! OpenAPI document assembly.

use axum::Json;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error::ErrorResponse;
use crate::handlers;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_token",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "chestdrop",
        description = "Ephemeral, code-addressed file and text sharing"
    ),
    paths(
        handlers::service_config::health,
        handlers::service_config::get_config,
        handlers::chest_create::create_chest,
        handlers::upload::upload_files,
        handlers::multipart::create_multipart,
        handlers::multipart::upload_part,
        handlers::multipart::complete_multipart,
        handlers::seal::seal_chest,
        handlers::retrieve::retrieve_by_code,
        handlers::download::download_file,
    ),
    components(schemas(
        ErrorResponse,
        handlers::service_config::ServiceConfigResponse,
        handlers::service_config::HealthResponse,
        handlers::chest_create::CreateChestRequest,
        handlers::chest_create::CreateChestResponse,
        handlers::upload::UploadedFile,
        handlers::upload::UploadFilesResponse,
        handlers::multipart::CreateMultipartRequest,
        handlers::multipart::CreateMultipartResponse,
        handlers::multipart::UploadPartResponse,
        handlers::multipart::PartSpec,
        handlers::multipart::CompleteMultipartRequest,
        handlers::multipart::CompleteMultipartResponse,
        handlers::seal::SealChestRequest,
        handlers::seal::SealChestResponse,
        handlers::retrieve::RetrievedFile,
        handlers::retrieve::RetrieveResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "chest", description = "Chest creation, upload, and sealing"),
        (name = "multipart", description = "Resumable chunked uploads"),
        (name = "retrieve", description = "Retrieval and download by code"),
        (name = "config", description = "Service configuration and health")
    )
)]
pub struct ApiDoc;

/// Serve the assembled OpenAPI document.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

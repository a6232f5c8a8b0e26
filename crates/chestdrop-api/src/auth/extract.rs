//! Bearer-token extraction from requests.

use axum::http::{header, HeaderMap};
use chestdrop_core::AppError;

/// Pull the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".to_string()))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization header".to_string()))
}

/// Bearer header or `?token=` fallback. The query form exists so plain
/// `<a download>` navigation can reach the download endpoint.
pub fn bearer_or_query<'a>(
    headers: &'a HeaderMap,
    query_token: Option<&'a str>,
) -> Result<&'a str, AppError> {
    if headers.contains_key(header::AUTHORIZATION) {
        return bearer_token(headers);
    }
    query_token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing token".to_string()))
}

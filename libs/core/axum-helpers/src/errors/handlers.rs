use axum::{http::StatusCode, response::Response};

use super::ErrorResponse;

/// Router fallback.
pub async fn not_found() -> Response {
    ErrorResponse::new("not_found", "The requested resource was not found")
        .into_response_with(StatusCode::NOT_FOUND)
}

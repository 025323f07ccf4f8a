use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Error type for the HTTP layer.
///
/// Implements [`IntoResponse`] so handlers can use `?` and still produce
/// the JSON error bodies the dashboard frontend expects.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not logged in")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("Device request failed: {0}")]
    Device(#[from] reqwest::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized => (
                StatusCode::FORBIDDEN,
                Json(json!({"error": "Not logged in"})),
            )
                .into_response(),

            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"ok": false, "error": message})),
            )
                .into_response(),

            ApiError::Device(e) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({"ok": false, "error": e.to_string()})),
            )
                .into_response(),

            ApiError::Internal(e) => {
                log::error!("Internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"ok": false, "error": "internal error"})),
                )
                    .into_response()
            }
        }
    }
}

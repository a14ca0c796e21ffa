use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::app::AdminError;
use crate::domain::{QueueName, StoreError, ValidationError};

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn validation_error(message: impl Into<String>) -> Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

pub fn validation_error_to_response(err: ValidationError) -> Response {
    validation_error(err.to_string())
}

pub fn store_error_to_response(err: StoreError) -> Response {
    match err {
        StoreError::NotFound { .. } => json_error(StatusCode::NOT_FOUND, "not_found", "Job not found"),
        StoreError::InvalidTransition { .. } => {
            json_error(StatusCode::CONFLICT, "invalid_state", err.to_string())
        }
        StoreError::Unavailable(_) => {
            tracing::error!(error = %err, "job store unavailable");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", err.to_string())
        }
        StoreError::Backend(_) | StoreError::Serialization(_) => {
            tracing::error!(error = %err, "job store error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", err.to_string())
        }
    }
}

pub fn admin_error_to_response(err: AdminError) -> Response {
    match err {
        AdminError::Validation(e) => validation_error_to_response(e),
        AdminError::Store(e) => store_error_to_response(e),
        AdminError::NotAMember(_) => json_error(StatusCode::NOT_FOUND, "not_found", err.to_string()),
        AdminError::Directory(_) => {
            tracing::error!(error = %err, "waitlist directory error");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "directory_unavailable", err.to_string())
        }
    }
}

pub fn parse_queue(s: &str) -> Result<QueueName, Response> {
    s.parse::<QueueName>().map_err(|_| {
        validation_error(format!(
            "Invalid queue name: {s}. Must be one of: email, waitlist"
        ))
    })
}

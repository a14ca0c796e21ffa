//! `/waitlist` handlers: stats, broadcast update, single-member update.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::{Json, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use super::AppState;
use super::errors::{admin_error_to_response, validation_error};

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub message: String,
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<Value>, Response> {
    let stats = state
        .admin
        .waitlist_stats()
        .await
        .map_err(admin_error_to_response)?;
    Ok(Json(json!({
        "success": true,
        "data": stats,
    })))
}

pub async fn broadcast(
    State(state): State<AppState>,
    body: Result<Json<BroadcastRequest>, JsonRejection>,
) -> Result<Json<Value>, Response> {
    let Json(req) = body.map_err(|e| validation_error(e.body_text()))?;
    let id = state
        .admin
        .broadcast_update(&req.message)
        .await
        .map_err(admin_error_to_response)?;
    Ok(Json(json!({
        "success": true,
        "message": "Bulk update queued",
        "jobId": id,
    })))
}

pub async fn notify(
    State(state): State<AppState>,
    body: Result<Json<NotifyRequest>, JsonRejection>,
) -> Result<Json<Value>, Response> {
    let Json(req) = body.map_err(|e| validation_error(e.body_text()))?;
    let id = state
        .admin
        .notify_member(&req.email, &req.message)
        .await
        .map_err(admin_error_to_response)?;
    Ok(Json(json!({
        "success": true,
        "message": "Update email queued",
        "jobId": id,
    })))
}

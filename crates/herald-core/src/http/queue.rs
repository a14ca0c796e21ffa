//! `/queue` handlers: overview, retry, clear failed, single job.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::{Json, Response};
use serde::Deserialize;
use serde_json::{Value, json};

use super::AppState;
use super::errors::{parse_queue, store_error_to_response, validation_error, validation_error_to_response};
use crate::domain::JobId;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryRequest {
    pub queue: Option<String>,
    pub job_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClearQuery {
    pub queue: Option<String>,
}

pub async fn overview(State(state): State<AppState>) -> Result<Json<Value>, Response> {
    let overview = state.admin.overview().await.map_err(store_error_to_response)?;
    Ok(Json(json!({"success": true, "data": overview})))
}

pub async fn retry(
    State(state): State<AppState>,
    body: Result<Json<RetryRequest>, JsonRejection>,
) -> Result<Json<Value>, Response> {
    let Json(req) = body.map_err(|e| validation_error(e.body_text()))?;
    let (Some(queue), Some(job_id)) = (non_empty(req.queue), non_empty(req.job_id)) else {
        return Err(validation_error("Queue and jobId are required"));
    };
    let queue = parse_queue(&queue)?;
    let id: JobId = job_id.parse().map_err(validation_error_to_response)?;

    let job = state.admin.retry(queue, id).await.map_err(store_error_to_response)?;
    Ok(Json(json!({
        "success": true,
        "message": "Job retried successfully",
        "data": {"jobId": job.id, "state": job.state},
    })))
}

pub async fn clear_failed(
    State(state): State<AppState>,
    Query(query): Query<ClearQuery>,
) -> Result<Json<Value>, Response> {
    let Some(queue) = non_empty(query.queue) else {
        return Err(validation_error("Queue parameter is required"));
    };
    let queue = parse_queue(&queue)?;

    let removed = state
        .admin
        .clear_failed(queue)
        .await
        .map_err(store_error_to_response)?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Cleared {removed} failed jobs from {queue} queue"),
        "data": {"removed": removed},
    })))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path((queue, id)): Path<(String, String)>,
) -> Result<Json<Value>, Response> {
    let queue = parse_queue(&queue)?;
    let id: JobId = id.parse().map_err(validation_error_to_response)?;
    let job = state.admin.job(queue, id).await.map_err(store_error_to_response)?;
    Ok(Json(json!({"success": true, "data": job})))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

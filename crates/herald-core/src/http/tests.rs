//! HTTP API tests.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use super::{AppState, create_router};
use crate::app::QueueAdmin;
use crate::domain::{DEFAULT_APP_SLUG, JobId, JobState, QueueName};
use crate::impls::InMemoryWaitlistDirectory;
use crate::queue::{InMemoryJobStore, JobStore, QueuePolicies};

struct TestApp {
    store: Arc<InMemoryJobStore>,
    directory: Arc<InMemoryWaitlistDirectory>,
    router: Router,
}

fn create_test_app() -> TestApp {
    let mut policies = QueuePolicies::default();
    policies.email.max_retries = 0;
    let store = Arc::new(InMemoryJobStore::new(policies));
    let directory = Arc::new(InMemoryWaitlistDirectory::new());
    let admin = QueueAdmin::new(store.clone(), directory.clone());
    TestApp {
        store,
        directory,
        router: create_router(AppState::new(admin)),
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn failed_job(store: &InMemoryJobStore) -> JobId {
    store
        .enqueue(QueueName::Email, json!({"to": "a@b.com"}))
        .await
        .unwrap();
    let job = store.dequeue_next(QueueName::Email).await.unwrap().unwrap();
    store
        .report_failure(QueueName::Email, job.id, job.attempts, "smtp down")
        .await
        .unwrap();
    job.id
}

#[tokio::test]
async fn test_overview() {
    let app = create_test_app();
    failed_job(&app.store).await;
    app.store
        .enqueue(QueueName::Waitlist, json!({"type": "welcome"}))
        .await
        .unwrap();

    let (status, body) = send(&app.router, Request::get("/queue").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["email"]["failed"], 1);
    assert_eq!(body["data"]["email"]["recentFailures"][0]["error"], "smtp down");
    assert_eq!(body["data"]["waitlist"]["waiting"], 1);
    assert_eq!(body["data"]["waitlist"]["health"]["waiting"], 1);
}

#[tokio::test]
async fn test_retry_failed_job() {
    let app = create_test_app();
    let id = failed_job(&app.store).await;

    let (status, body) = send(
        &app.router,
        json_request("POST", "/queue", json!({"queue": "email", "jobId": id.to_string()})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Job retried successfully");
    let job = app.store.get_job(QueueName::Email, id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Waiting);
}

#[tokio::test]
async fn test_retry_requires_queue_and_job_id() {
    let app = create_test_app();
    let (status, body) = send(&app.router, json_request("POST", "/queue", json!({"queue": "email"}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["message"], "Queue and jobId are required");
}

#[tokio::test]
async fn test_retry_unknown_queue() {
    let app = create_test_app();
    let (status, body) = send(
        &app.router,
        json_request("POST", "/queue", json!({"queue": "sms", "jobId": "01ARZ3NDEKTSV4RRFFQ69G5FAV"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("sms"));
}

#[tokio::test]
async fn test_retry_missing_job() {
    let app = create_test_app();
    let (status, body) = send(
        &app.router,
        json_request(
            "POST",
            "/queue",
            json!({"queue": "email", "jobId": "01ARZ3NDEKTSV4RRFFQ69G5FAV"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_retry_non_failed_job_conflicts() {
    let app = create_test_app();
    let job = app.store.enqueue(QueueName::Email, json!({})).await.unwrap();

    let (status, body) = send(
        &app.router,
        json_request("POST", "/queue", json!({"queue": "email", "jobId": job.id.to_string()})),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invalid_state");
}

#[tokio::test]
async fn test_clear_failed() {
    let app = create_test_app();
    failed_job(&app.store).await;
    failed_job(&app.store).await;

    let request = Request::delete("/queue?queue=email").body(Body::empty()).unwrap();
    let (status, body) = send(&app.router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["removed"], 2);
    assert_eq!(body["message"], "Cleared 2 failed jobs from email queue");
    assert_eq!(app.store.health(QueueName::Email).await.unwrap().failed, 0);
}

#[tokio::test]
async fn test_clear_failed_requires_queue() {
    let app = create_test_app();
    let (status, body) = send(&app.router, Request::delete("/queue").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Queue parameter is required");
}

#[tokio::test]
async fn test_get_job() {
    let app = create_test_app();
    let id = failed_job(&app.store).await;

    let uri = format!("/queue/email/jobs/{id}");
    let (status, body) = send(&app.router, Request::get(uri).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "failed");
    assert_eq!(body["data"]["lastError"], "smtp down");

    let uri = format!("/queue/waitlist/jobs/{id}");
    let (status, _) = send(&app.router, Request::get(uri).body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_job_rejects_bad_id() {
    let app = create_test_app();
    let (status, _) = send(
        &app.router,
        Request::get("/queue/email/jobs/not-a-ulid").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_waitlist_stats() {
    let app = create_test_app();
    app.directory.join("a@x.com", DEFAULT_APP_SLUG, Utc::now());
    app.directory.join("b@x.com", DEFAULT_APP_SLUG, Utc::now());

    let (status, body) = send(&app.router, Request::get("/waitlist").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["recent"], 2);
    assert_eq!(body["data"]["positions"][1]["email"], "b@x.com");
    assert!(body.get("total").is_none());
}

#[tokio::test]
async fn test_waitlist_broadcast() {
    let app = create_test_app();
    let (status, body) = send(
        &app.router,
        json_request("POST", "/waitlist", json!({"message": "We launched"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let id: JobId = body["jobId"].as_str().unwrap().parse().unwrap();
    let job = app.store.get_job(QueueName::Waitlist, id).await.unwrap().unwrap();
    assert_eq!(job.data["type"], "bulk_update");
}

#[tokio::test]
async fn test_waitlist_broadcast_rejects_empty_message() {
    let app = create_test_app();
    let (status, body) = send(&app.router, json_request("POST", "/waitlist", json!({}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "message is required");
}

#[tokio::test]
async fn test_waitlist_notify_member() {
    let app = create_test_app();
    app.directory.join("a@x.com", DEFAULT_APP_SLUG, Utc::now());

    let (status, body) = send(
        &app.router,
        json_request("PUT", "/waitlist", json!({"email": "a@x.com", "message": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["jobId"].is_string());

    let (status, _) = send(
        &app.router,
        json_request("PUT", "/waitlist", json!({"email": "ghost@x.com", "message": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

//! Admin HTTP surface.
//!
//! - `GET    /queue`                  overview of both queues
//! - `POST   /queue`                  retry a failed job (`{queue, jobId}`)
//! - `DELETE /queue?queue=<name>`     remove every failed job
//! - `GET    /queue/:queue/jobs/:id`  one job, including its result
//! - `GET    /waitlist`               waitlist stats
//! - `POST   /waitlist`               queue a bulk update (`{message}`)
//! - `PUT    /waitlist`               queue an update to one member (`{email, message}`)
//!
//! Authentication is left to whatever sits in front of this router.

mod errors;
mod queue;
mod waitlist;

#[cfg(test)]
mod tests;

use axum::Router;
use axum::routing::get;

use crate::app::QueueAdmin;

pub use self::errors::json_error;

#[derive(Clone)]
pub struct AppState {
    pub admin: QueueAdmin,
}

impl AppState {
    pub fn new(admin: QueueAdmin) -> Self {
        Self { admin }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/queue",
            get(queue::overview)
                .post(queue::retry)
                .delete(queue::clear_failed),
        )
        .route("/queue/:queue/jobs/:id", get(queue::get_job))
        .route(
            "/waitlist",
            get(waitlist::stats)
                .post(waitlist::broadcast)
                .put(waitlist::notify),
        )
        .with_state(state)
}

//! Domain model (ids, jobs, payloads, templates, events, errors).

pub mod errors;
pub mod events;
pub mod ids;
pub mod job;
pub mod payload;
pub mod queue_name;
pub mod template;
pub mod waitlist;

pub use self::errors::{JobError, StoreError, ValidationError};
pub use self::events::QueueEvent;
pub use self::ids::JobId;
pub use self::job::{Job, JobRange, JobState, QueueHealth};
pub use self::payload::{
    BulkUpdateData, BulkUpdateResult, DEFAULT_APP_SLUG, EmailJobData, UpdateEmailData,
    WaitlistJob, WelcomeEmailData,
};
pub use self::queue_name::QueueName;
pub use self::template::{EmailTemplate, OutgoingEmail};
pub use self::waitlist::WaitlistEntry;

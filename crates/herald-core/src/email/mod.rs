//! Template renderer.

pub mod format;
pub mod templates;

pub use self::templates::{
    WaitlistTemplates, generate_waitlist_update_email, generate_waitlist_welcome_email,
};

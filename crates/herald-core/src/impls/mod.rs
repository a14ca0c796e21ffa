//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **SmtpMailTransport**: lettre による SMTP 送信（本番用）
//! - **InMemoryMailTransport**: 送信内容を記録するだけの送信箱（開発用・テスト用）
//! - **InMemoryWaitlistDirectory**: 開発用の waitlist
//! - **event_sinks**: tracing / broadcast / fan-out の EventSink
//!
//! Job Store の実装は `queue` 側にあります。

pub mod event_sinks;
pub mod inmem_mail;
pub mod inmem_waitlist;
pub mod smtp;

pub use self::event_sinks::{BroadcastEventSink, NoopEventSink, TracingEventSink};
pub use self::inmem_mail::InMemoryMailTransport;
pub use self::inmem_waitlist::InMemoryWaitlistDirectory;
pub use self::smtp::{SmtpMailTransport, SmtpSetupError};

//! Ports - 抽象化レイヤー
//!
//! 外部システム（SMTP リレー、waitlist の永続化層、ログ基盤）と
//! テストで差し替えたいもの（時刻、ID）へのインターフェースです。
//! Job Store 自体の trait は `queue` にあります。

pub mod clock;
pub mod event_sink;
pub mod id_generator;
pub mod mail_transport;
pub mod waitlist_directory;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::EventSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::mail_transport::{BulkSendReport, MailTransport, RecipientResult, SendResult};
pub use self::waitlist_directory::{DirectoryError, WaitlistDirectory};

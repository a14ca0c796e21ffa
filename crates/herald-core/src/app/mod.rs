//! App - アプリケーション層
//!
//! ports と queue を組み合わせて、キューの消費・投入・管理を実装します。
//!
//! # 主要コンポーネント
//! - **JobProcessor / ProcessorRegistry**: キューごとの job 実行
//! - **WorkerGroup**: claim → process → ack/fail のループ
//! - **ReaperLoop**: 停止したワーカーの job を回収
//! - **QueueRuntime**: 上記の起動と graceful shutdown
//! - **Producer**: job の投入
//! - **QueueAdmin**: 管理操作（一覧、retry、failed の削除、waitlist 配信）

pub mod admin;
pub mod email_processor;
pub mod processor;
pub mod producer;
pub mod reaper_loop;
pub mod runtime;
pub mod waitlist_processor;
pub mod worker;

pub use self::admin::{AdminError, QueueAdmin, QueueOverview, QueuesOverview, WaitlistStats};
pub use self::email_processor::EmailProcessor;
pub use self::processor::{JobProcessor, ProcessorRegistry, RegistryError};
pub use self::producer::Producer;
pub use self::reaper_loop::ReaperLoop;
pub use self::runtime::{QueueRuntime, RuntimeError};
pub use self::waitlist_processor::WaitlistProcessor;
pub use self::worker::{WorkerGroup, WorkerOptions};

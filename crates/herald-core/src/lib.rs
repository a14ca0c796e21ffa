//! herald-core
//!
//! Background email job queue: producers enqueue, workers render and send,
//! the admin surface inspects, retries and clears.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, queue_name, job, payload, template, waitlist, errors, events）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator, EventSink, MailTransport, WaitlistDirectory）
//! - **queue**: JobStore port、retry policy、in-memory / Redis 実装
//! - **email**: テンプレート描画
//! - **impls**: port の実装（SMTP、開発用 in-memory、event sink）
//! - **app**: processor, worker, reaper, runtime, producer, admin
//! - **http**: admin 向け HTTP ルーター（axum）
//! - **config**: 環境変数からの設定
//! - **observability**: tracing の初期化

pub mod app;
pub mod config;
pub mod domain;
pub mod email;
pub mod http;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;

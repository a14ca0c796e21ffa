//! EventSink port - job ライフサイクルイベントの購読口
//!
//! 実装は `impls::event_sinks` にあります（tracing 出力、broadcast、fan-out）。

use std::sync::Arc;

use crate::domain::QueueEvent;

/// EventSink は Job Store の状態遷移を受け取る
///
/// store のロック内から呼ばれることがあるため、`emit` はブロックしないこと。
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &QueueEvent);
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn emit(&self, event: &QueueEvent) {
        (**self).emit(event)
    }
}

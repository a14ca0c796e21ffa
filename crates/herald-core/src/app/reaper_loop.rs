//! ReaperLoop - 停止したワーカーの job を回収
//!
//! # フロー
//! 1. `reap_interval` ごとに各キューで `JobStore::reclaim_stalled` を呼ぶ
//! 2. `stalled_after` より古い active job は waiting に戻る（attempts が尽きていれば failed）
//!
//! 回収に失敗しても loop は止めず、次の tick で再試行する。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::QueueName;
use crate::queue::JobStore;

pub struct ReaperLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ReaperLoop {
    pub fn spawn(store: Arc<dyn JobStore>, queues: Vec<QueueName>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        reap_once(store.as_ref(), &queues).await;
                    }
                }
            }
        });
        Self { shutdown_tx, join }
    }

    pub async fn shutdown_and_join(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.join.await;
    }
}

/// One reclaim pass over `queues`. Returns how many jobs were reclaimed.
pub async fn reap_once(store: &dyn JobStore, queues: &[QueueName]) -> usize {
    let mut total = 0;
    for &queue in queues {
        match store.reclaim_stalled(queue).await {
            Ok(ids) if ids.is_empty() => {}
            Ok(ids) => {
                tracing::warn!(queue = queue.as_str(), count = ids.len(), "reclaimed stalled jobs");
                total += ids.len();
            }
            Err(e) => {
                tracing::warn!(queue = queue.as_str(), error = %e, "stalled job check failed");
            }
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobState;
    use crate::ports::FixedClock;
    use crate::queue::{InMemoryJobStore, QueuePolicies};
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn reap_once_returns_stale_active_jobs_to_waiting() {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let store = InMemoryJobStore::new(QueuePolicies::default()).with_clock(clock.clone());

        let job = store.enqueue(QueueName::Email, json!({})).await.unwrap();
        store.dequeue_next(QueueName::Email).await.unwrap().unwrap();

        assert_eq!(reap_once(&store, &QueueName::ALL).await, 0);

        clock.advance(chrono::Duration::minutes(5));
        assert_eq!(reap_once(&store, &QueueName::ALL).await, 1);

        let job = store.get_job(QueueName::Email, job.id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Waiting);
        assert_eq!(job.last_error.as_deref(), Some("job stalled"));
    }

    #[tokio::test(start_paused = true)]
    async fn loop_stops_on_shutdown() {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new(QueuePolicies::default()));
        let reaper = ReaperLoop::spawn(store, QueueName::ALL.to_vec(), Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(95)).await;
        reaper.shutdown_and_join().await;
    }
}

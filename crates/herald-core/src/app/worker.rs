//! WorkerGroup - キューを消費するワーカー群
//!
//! # フロー（1 ワーカー）
//! 1. `JobLease::claim` で 1 件 claim（waiting -> active）
//! 2. processor を実行
//! 3. 成功なら `ack`、失敗なら `fail`（retry / failed の判断は store 側）
//!
//! キューが空のときは `poll_interval` だけ待つ。待機は shutdown と競合させるので、
//! 停止要求はすぐに届く。処理中の job は中断せず、完了を待ってから抜ける。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::processor::JobProcessor;
use crate::domain::QueueName;
use crate::queue::{JobLease, JobStore};

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub concurrency: usize,
    pub poll_interval: Duration,
    /// Wait after a store error before claiming again.
    pub error_backoff: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            concurrency: 1,
            poll_interval: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
        }
    }
}

/// Worker group handle.
/// - `request_shutdown` で新しい claim を止める
/// - `shutdown_and_join` で処理中の job の完了まで待つ
pub struct WorkerGroup {
    queue: QueueName,
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `options.concurrency` workers for one queue.
    pub fn spawn(
        queue: QueueName,
        store: Arc<dyn JobStore>,
        processor: Arc<dyn JobProcessor>,
        options: WorkerOptions,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let n = options.concurrency.max(1);
        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let worker = Worker {
                id: worker_id,
                queue,
                store: Arc::clone(&store),
                processor: Arc::clone(&processor),
                options: options.clone(),
            };
            let mut rx = shutdown_rx.clone();
            joins.push(tokio::spawn(async move {
                worker.run(&mut rx).await;
            }));
        }

        tracing::info!(queue = queue.as_str(), workers = n, "worker group started");
        Self {
            queue,
            shutdown_tx,
            joins,
        }
    }

    pub fn queue(&self) -> QueueName {
        self.queue
    }

    /// Stop claiming new jobs. In-flight jobs run to completion.
    pub fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            let _ = j.await;
        }
        tracing::info!(queue = self.queue.as_str(), "worker group stopped");
    }
}

struct Worker {
    id: usize,
    queue: QueueName,
    store: Arc<dyn JobStore>,
    processor: Arc<dyn JobProcessor>,
    options: WorkerOptions,
}

impl Worker {
    async fn run(&self, shutdown_rx: &mut watch::Receiver<bool>) {
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let lease = match JobLease::claim(&self.store, self.queue).await {
                Ok(Some(lease)) => lease,
                Ok(None) => {
                    if !idle(shutdown_rx, self.options.poll_interval).await {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        queue = self.queue.as_str(),
                        worker = self.id,
                        error = %e,
                        "claim failed"
                    );
                    if !idle(shutdown_rx, self.options.error_backoff).await {
                        break;
                    }
                    continue;
                }
            };

            let span = tracing::info_span!(
                "job",
                queue = self.queue.as_str(),
                job_id = %lease.job().id,
                kind = lease.job().kind().unwrap_or("-"),
                attempt = lease.job().attempts,
                worker = self.id,
            );
            self.execute(lease).instrument(span).await;
        }
    }

    async fn execute(&self, lease: JobLease) {
        // 別タスクで実行して、processor の panic でワーカーが落ちないようにする
        let processor = Arc::clone(&self.processor);
        let job = lease.job().clone();
        let outcome = tokio::spawn(async move { processor.process(&job).await }).await;

        let reported = match outcome {
            Ok(Ok(result)) => lease.ack(result).await,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "job failed");
                lease.fail(&err.to_string()).await
            }
            Err(join_err) => {
                tracing::error!(error = %join_err, "job processing panicked");
                lease.fail("job processing panicked").await
            }
        };

        if let Err(e) = reported {
            tracing::error!(error = %e, "could not report job outcome");
        }
    }
}

/// Sleeps for `dur` or until shutdown is requested.
/// Returns `false` once the worker should stop.
async fn idle(shutdown_rx: &mut watch::Receiver<bool>, dur: Duration) -> bool {
    tokio::select! {
        changed = shutdown_rx.changed() => changed.is_ok() && !*shutdown_rx.borrow(),
        _ = tokio::time::sleep(dur) => true,
    }
}

//! Redis job store.
//!
//! # Key layout（`{ns}` = namespace, `{q}` = queue name）
//! - `{ns}:{q}:job:{id}`   job record (JSON)
//! - `{ns}:{q}:waiting`    list of ids, claimed from the left
//! - `{ns}:{q}:delayed`    zset of ids scored by `run_at` (ms)
//! - `{ns}:{q}:active`     list of claimed ids
//! - `{ns}:{q}:succeeded`  list of ids, oldest first (trimmed to retention)
//! - `{ns}:{q}:failed`     list of ids, oldest first (trimmed to retention)
//! - `{ns}:seq`            sequence counter
//!
//! Ownership of a job moves with its id: `LMOVE` out of waiting claims it,
//! `LREM` out of active reports it, `ZREM` out of delayed promotes it. Only
//! the caller that actually moved the id touches the record, so concurrent
//! workers and reapers never report the same job twice.
//!
//! A report also names the claim it belongs to (the `attempts` value handed
//! out by `dequeue_next`). `RELEASE_CLAIM` checks it against the record and
//! removes the id from active in one step, so a worker whose job was
//! reclaimed and claimed again cannot release the newer claim.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use serde_json::Value;

use super::{JobStore, QueuePolicies, QueuePolicy};
use crate::domain::{
    Job, JobId, JobRange, JobState, QueueEvent, QueueHealth, QueueName, StoreError,
};
use crate::impls::event_sinks::NoopEventSink;
use crate::ports::{Clock, EventSink, IdGenerator, SystemClock, UlidGenerator};

/// KEYS[1] = job record, KEYS[2] = active list; ARGV[1] = id, ARGV[2] = attempt.
/// Returns 1 when the caller's claim was current and has been released.
const RELEASE_CLAIM: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then
  return 0
end
local job = cjson.decode(raw)
if job.state ~= 'active' or tonumber(job.attempts) ~= tonumber(ARGV[2]) then
  return 0
end
return redis.call('LREM', KEYS[2], 0, ARGV[1])
"#;

pub struct RedisJobStore {
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
    namespace: String,
    policies: QueuePolicies,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    events: Arc<dyn EventSink>,
}

impl RedisJobStore {
    pub fn new(client: redis::Client, namespace: impl Into<String>, policies: QueuePolicies) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            client,
            conn: Mutex::new(None),
            namespace: namespace.into(),
            policies,
            ids: Arc::new(UlidGenerator::new(Arc::clone(&clock))),
            clock,
            events: Arc::new(NoopEventSink),
        }
    }

    pub fn open(url: &str, namespace: impl Into<String>, policies: QueuePolicies) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(classify)?;
        Ok(Self::new(client, namespace, policies))
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Round-trips a `PING`.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| self.err(e))?;
        Ok(())
    }

    async fn conn(&self) -> Result<MultiplexedConnection, StoreError> {
        if let Some(conn) = self.cached_conn() {
            return Ok(conn);
        }
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(classify)?;
        *self.conn.lock().unwrap_or_else(PoisonError::into_inner) = Some(conn.clone());
        Ok(conn)
    }

    fn cached_conn(&self) -> Option<MultiplexedConnection> {
        self.conn
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Classifies the error and drops the cached connection when it is broken.
    fn err(&self, e: redis::RedisError) -> StoreError {
        let err = classify(e);
        if err.is_transient() {
            *self.conn.lock().unwrap_or_else(PoisonError::into_inner) = None;
        }
        err
    }

    fn key(&self, queue: QueueName, suffix: &str) -> String {
        format!("{}:{}:{}", self.namespace, queue, suffix)
    }

    fn key_job(&self, queue: QueueName, id: JobId) -> String {
        format!("{}:{}:job:{}", self.namespace, queue, id)
    }

    fn key_seq(&self) -> String {
        format!("{}:seq", self.namespace)
    }

    fn emit_all(&self, events: Vec<QueueEvent>) {
        for event in &events {
            self.events.emit(event);
        }
    }

    async fn load(
        &self,
        conn: &mut MultiplexedConnection,
        queue: QueueName,
        id: JobId,
    ) -> Result<Option<Job>, StoreError> {
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.key_job(queue, id))
            .query_async(conn)
            .await
            .map_err(|e| self.err(e))?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn load_many(
        &self,
        conn: &mut MultiplexedConnection,
        queue: QueueName,
        ids: &[JobId],
    ) -> Result<Vec<Job>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = ids.iter().map(|id| self.key_job(queue, *id)).collect();
        let raws: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(conn)
            .await
            .map_err(|e| self.err(e))?;
        let mut jobs = Vec::with_capacity(raws.len());
        for raw in raws.into_iter().flatten() {
            jobs.push(serde_json::from_str(&raw)?);
        }
        Ok(jobs)
    }

    async fn save(&self, conn: &mut MultiplexedConnection, job: &Job) -> Result<(), StoreError> {
        let data = serde_json::to_string(job)?;
        let _: () = redis::cmd("SET")
            .arg(self.key_job(job.queue, job.id))
            .arg(data)
            .query_async(conn)
            .await
            .map_err(|e| self.err(e))?;
        Ok(())
    }

    async fn push(&self, conn: &mut MultiplexedConnection, key: &str, id: JobId) -> Result<usize, StoreError> {
        let len: usize = redis::cmd("RPUSH")
            .arg(key)
            .arg(id.to_string())
            .query_async(conn)
            .await
            .map_err(|e| self.err(e))?;
        Ok(len)
    }

    /// Removes `id` from a list. Returns whether this call removed it.
    async fn take(&self, conn: &mut MultiplexedConnection, key: &str, id: JobId) -> Result<bool, StoreError> {
        let removed: i64 = redis::cmd("LREM")
            .arg(key)
            .arg(0)
            .arg(id.to_string())
            .query_async(conn)
            .await
            .map_err(|e| self.err(e))?;
        Ok(removed > 0)
    }

    /// Runs `RELEASE_CLAIM`. Returns whether this caller owned the claim.
    async fn release_claim(
        &self,
        conn: &mut MultiplexedConnection,
        queue: QueueName,
        id: JobId,
        attempt: u32,
    ) -> Result<bool, StoreError> {
        let script = redis::Script::new(RELEASE_CLAIM);
        let released: i64 = script
            .key(self.key_job(queue, id))
            .key(self.key(queue, "active"))
            .arg(id.to_string())
            .arg(attempt)
            .invoke_async(conn)
            .await
            .map_err(|e| self.err(e))?;
        Ok(released > 0)
    }

    async fn list_ids(&self, conn: &mut MultiplexedConnection, key: &str) -> Result<Vec<JobId>, StoreError> {
        let raw: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(-1)
            .query_async(conn)
            .await
            .map_err(|e| self.err(e))?;
        parse_ids(raw)
    }

    async fn next_sequence(&self, conn: &mut MultiplexedConnection) -> Result<u64, StoreError> {
        let seq: u64 = redis::cmd("INCR")
            .arg(self.key_seq())
            .query_async(conn)
            .await
            .map_err(|e| self.err(e))?;
        Ok(seq)
    }

    /// Moves due ids from delayed to the back of waiting.
    async fn promote_delayed(
        &self,
        conn: &mut MultiplexedConnection,
        queue: QueueName,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let delayed = self.key(queue, "delayed");
        let due: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&delayed)
            .arg("-inf")
            .arg(now.timestamp_millis())
            .query_async(conn)
            .await
            .map_err(|e| self.err(e))?;

        let waiting = self.key(queue, "waiting");
        for id in parse_ids(due)? {
            let owned: i64 = redis::cmd("ZREM")
                .arg(&delayed)
                .arg(id.to_string())
                .query_async(conn)
                .await
                .map_err(|e| self.err(e))?;
            if owned > 0 {
                self.push(conn, &waiting, id).await?;
            }
        }
        Ok(())
    }

    /// Appends to a retention list and evicts the oldest records beyond `keep`.
    async fn retain(
        &self,
        conn: &mut MultiplexedConnection,
        queue: QueueName,
        list: &str,
        id: JobId,
        keep: usize,
        events: &mut Vec<QueueEvent>,
    ) -> Result<(), StoreError> {
        let key = self.key(queue, list);
        let mut len = self.push(conn, &key, id).await?;
        while len > keep {
            let oldest: Option<String> = redis::cmd("LPOP")
                .arg(&key)
                .query_async(conn)
                .await
                .map_err(|e| self.err(e))?;
            let Some(oldest) = oldest else {
                break;
            };
            let old = parse_id(&oldest)?;
            let _: i64 = redis::cmd("DEL")
                .arg(self.key_job(queue, old))
                .query_async(conn)
                .await
                .map_err(|e| self.err(e))?;
            events.push(QueueEvent::Evicted { queue, job_id: old });
            len -= 1;
        }
        Ok(())
    }

    async fn fail_terminally(
        &self,
        conn: &mut MultiplexedConnection,
        mut job: Job,
        error: String,
        policy: &QueuePolicy,
        now: DateTime<Utc>,
        events: &mut Vec<QueueEvent>,
    ) -> Result<(), StoreError> {
        job.mark_failed(error.clone(), now);
        self.save(conn, &job).await?;
        events.push(QueueEvent::Failed {
            queue: job.queue,
            job_id: job.id,
            attempts: job.attempts,
            error,
        });
        self.retain(conn, job.queue, "failed", job.id, policy.remove_on_failure, events)
            .await
    }
}

fn classify(e: redis::RedisError) -> StoreError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_timeout() || e.is_connection_refusal() {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Backend(e.to_string())
    }
}

fn parse_id(raw: &str) -> Result<JobId, StoreError> {
    raw.parse()
        .map_err(|e| StoreError::Backend(format!("corrupt job id in redis: {e}")))
}

fn parse_ids(raw: Vec<String>) -> Result<Vec<JobId>, StoreError> {
    raw.iter().map(|id| parse_id(id)).collect()
}

fn chrono_delay(delay: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::weeks(52))
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn enqueue(&self, queue: QueueName, data: Value) -> Result<Job, StoreError> {
        let now = self.clock.now();
        let policy = self.policies.get(queue);
        let mut conn = self.conn().await?;

        let sequence = self.next_sequence(&mut conn).await?;
        let job = Job::new(
            self.ids.generate_job_id(),
            queue,
            data,
            policy.max_retries,
            sequence,
            now,
        );
        self.save(&mut conn, &job).await?;
        self.push(&mut conn, &self.key(queue, "waiting"), job.id).await?;

        self.events.emit(&QueueEvent::Enqueued {
            queue,
            job_id: job.id,
        });
        Ok(job)
    }

    async fn dequeue_next(&self, queue: QueueName) -> Result<Option<Job>, StoreError> {
        let now = self.clock.now();
        let mut conn = self.conn().await?;
        self.promote_delayed(&mut conn, queue, now).await?;

        let waiting = self.key(queue, "waiting");
        let active = self.key(queue, "active");
        loop {
            let moved: Option<String> = redis::cmd("LMOVE")
                .arg(&waiting)
                .arg(&active)
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut conn)
                .await
                .map_err(|e| self.err(e))?;
            let Some(raw) = moved else {
                return Ok(None);
            };
            let id = parse_id(&raw)?;

            // stale ids (removed, already claimed) are dropped
            let Some(mut job) = self.load(&mut conn, queue, id).await? else {
                self.take(&mut conn, &active, id).await?;
                continue;
            };
            if !job.is_claimable(now) {
                self.take(&mut conn, &active, id).await?;
                continue;
            }

            job.start_attempt(now);
            self.save(&mut conn, &job).await?;
            self.events.emit(&QueueEvent::Claimed {
                queue,
                job_id: id,
                attempts: job.attempts,
            });
            return Ok(Some(job));
        }
    }

    async fn report_success(
        &self,
        queue: QueueName,
        id: JobId,
        attempt: u32,
        result: Value,
    ) -> Result<(), StoreError> {
        let now = self.clock.now();
        let policy = self.policies.get(queue);
        let mut conn = self.conn().await?;

        if !self.release_claim(&mut conn, queue, id, attempt).await? {
            return Ok(());
        }
        let Some(mut job) = self.load(&mut conn, queue, id).await? else {
            return Ok(());
        };

        job.mark_succeeded(result.clone(), now);
        self.save(&mut conn, &job).await?;
        let mut events = vec![QueueEvent::Succeeded {
            queue,
            job_id: id,
            result,
        }];
        self.retain(&mut conn, queue, "succeeded", id, policy.remove_on_success, &mut events)
            .await?;
        self.emit_all(events);
        Ok(())
    }

    async fn report_failure(
        &self,
        queue: QueueName,
        id: JobId,
        attempt: u32,
        error: &str,
    ) -> Result<(), StoreError> {
        let now = self.clock.now();
        let policy = self.policies.get(queue);
        let mut conn = self.conn().await?;

        if !self.release_claim(&mut conn, queue, id, attempt).await? {
            return Ok(());
        }
        let Some(mut job) = self.load(&mut conn, queue, id).await? else {
            return Ok(());
        };

        let mut events = Vec::new();
        if job.has_attempts_left() {
            let delay = policy.retry.next_delay(job.attempts);
            let run_at = now + chrono_delay(delay);
            job.schedule_retry(run_at, error.to_string(), now);
            self.save(&mut conn, &job).await?;
            let _: i64 = redis::cmd("ZADD")
                .arg(self.key(queue, "delayed"))
                .arg(run_at.timestamp_millis())
                .arg(id.to_string())
                .query_async(&mut conn)
                .await
                .map_err(|e| self.err(e))?;
            events.push(QueueEvent::RetryScheduled {
                queue,
                job_id: id,
                attempts: job.attempts,
                delay,
                error: error.to_string(),
            });
        } else {
            self.fail_terminally(&mut conn, job, error.to_string(), policy, now, &mut events)
                .await?;
        }
        self.emit_all(events);
        Ok(())
    }

    async fn get_jobs_by_state(
        &self,
        queue: QueueName,
        state: JobState,
        range: JobRange,
    ) -> Result<Vec<Job>, StoreError> {
        let mut conn = self.conn().await?;
        let mut ids = match state {
            JobState::Waiting => self.list_ids(&mut conn, &self.key(queue, "waiting")).await?,
            JobState::Active => self.list_ids(&mut conn, &self.key(queue, "active")).await?,
            JobState::Succeeded => self.list_ids(&mut conn, &self.key(queue, "succeeded")).await?,
            JobState::Failed => self.list_ids(&mut conn, &self.key(queue, "failed")).await?,
        };
        if state == JobState::Waiting {
            let delayed: Vec<String> = redis::cmd("ZRANGE")
                .arg(self.key(queue, "delayed"))
                .arg(0)
                .arg(-1)
                .query_async(&mut conn)
                .await
                .map_err(|e| self.err(e))?;
            ids.extend(parse_ids(delayed)?);
        }
        ids.sort();
        ids.dedup();

        let mut jobs: Vec<Job> = self
            .load_many(&mut conn, queue, &ids)
            .await?
            .into_iter()
            .filter(|job| job.state == state)
            .collect();
        jobs.sort_by_key(|job| job.sequence);
        Ok(range.slice(jobs))
    }

    async fn get_job(&self, queue: QueueName, id: JobId) -> Result<Option<Job>, StoreError> {
        let mut conn = self.conn().await?;
        self.load(&mut conn, queue, id).await
    }

    async fn retry_job(&self, queue: QueueName, id: JobId) -> Result<Job, StoreError> {
        let now = self.clock.now();
        let mut conn = self.conn().await?;

        let Some(mut job) = self.load(&mut conn, queue, id).await? else {
            return Err(StoreError::NotFound { queue, id });
        };
        if job.state != JobState::Failed
            || !self.take(&mut conn, &self.key(queue, "failed"), id).await?
        {
            return Err(StoreError::InvalidTransition {
                id,
                expected: JobState::Failed,
                actual: job.state,
            });
        }

        let sequence = self.next_sequence(&mut conn).await?;
        job.reset_for_retry(sequence, now);
        self.save(&mut conn, &job).await?;
        self.push(&mut conn, &self.key(queue, "waiting"), id).await?;

        self.events.emit(&QueueEvent::Retried { queue, job_id: id });
        Ok(job)
    }

    async fn remove_job(&self, queue: QueueName, id: JobId) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let deleted: i64 = redis::cmd("DEL")
            .arg(self.key_job(queue, id))
            .query_async(&mut conn)
            .await
            .map_err(|e| self.err(e))?;
        for list in ["waiting", "active", "succeeded", "failed"] {
            self.take(&mut conn, &self.key(queue, list), id).await?;
        }
        let _: i64 = redis::cmd("ZREM")
            .arg(self.key(queue, "delayed"))
            .arg(id.to_string())
            .query_async(&mut conn)
            .await
            .map_err(|e| self.err(e))?;

        let removed = deleted > 0;
        if removed {
            self.events.emit(&QueueEvent::Removed { queue, job_id: id });
        }
        Ok(removed)
    }

    async fn health(&self, queue: QueueName) -> Result<QueueHealth, StoreError> {
        let mut conn = self.conn().await?;
        let mut lens = [0usize; 4];
        for (slot, list) in ["waiting", "active", "succeeded", "failed"].into_iter().enumerate() {
            lens[slot] = redis::cmd("LLEN")
                .arg(self.key(queue, list))
                .query_async(&mut conn)
                .await
                .map_err(|e| self.err(e))?;
        }
        let delayed: usize = redis::cmd("ZCARD")
            .arg(self.key(queue, "delayed"))
            .query_async(&mut conn)
            .await
            .map_err(|e| self.err(e))?;

        Ok(QueueHealth {
            waiting: lens[0] + delayed,
            active: lens[1],
            succeeded: lens[2],
            failed: lens[3],
            delayed,
        })
    }

    async fn reclaim_stalled(&self, queue: QueueName) -> Result<Vec<JobId>, StoreError> {
        let now = self.clock.now();
        let policy = self.policies.get(queue);
        let cutoff = now - chrono_delay(policy.stalled_after);
        let mut conn = self.conn().await?;

        let active = self.key(queue, "active");
        let waiting = self.key(queue, "waiting");
        let mut events = Vec::new();
        let mut reclaimed = Vec::new();
        for id in self.list_ids(&mut conn, &active).await? {
            let Some(mut job) = self.load(&mut conn, queue, id).await? else {
                self.take(&mut conn, &active, id).await?;
                continue;
            };
            let stalled = job.state == JobState::Active
                && job.claimed_at.is_some_and(|at| at <= cutoff);
            if !stalled || !self.take(&mut conn, &active, id).await? {
                continue;
            }

            let requeued = job.has_attempts_left();
            if requeued {
                job.schedule_retry(now, "job stalled".to_string(), now);
                self.save(&mut conn, &job).await?;
                self.push(&mut conn, &waiting, id).await?;
            } else {
                self.fail_terminally(&mut conn, job, "job stalled".to_string(), policy, now, &mut events)
                    .await?;
            }
            events.push(QueueEvent::Stalled {
                queue,
                job_id: id,
                requeued,
            });
            reclaimed.push(id);
        }
        self.emit_all(events);
        Ok(reclaimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RedisJobStore {
        RedisJobStore::open("redis://127.0.0.1/", "herald", QueuePolicies::default()).unwrap()
    }

    #[test]
    fn keys_are_namespaced_per_queue() {
        let store = store();
        let id: JobId = "01ARZ3NDEKTSV4RRFFQ69G5FAV".parse().unwrap();
        assert_eq!(store.key(QueueName::Email, "waiting"), "herald:email:waiting");
        assert_eq!(
            store.key_job(QueueName::Waitlist, id),
            "herald:waitlist:job:job-01ARZ3NDEKTSV4RRFFQ69G5FAV"
        );
        assert_eq!(store.key_seq(), "herald:seq");
    }

    #[test]
    fn io_errors_are_transient() {
        let io = redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(classify(io).is_transient());

        let resp = redis::RedisError::from((redis::ErrorKind::ResponseError, "WRONGTYPE"));
        assert!(matches!(classify(resp), StoreError::Backend(_)));
    }

    #[test]
    fn corrupt_ids_are_backend_errors() {
        assert!(matches!(parse_id("not-an-id"), Err(StoreError::Backend(_))));
    }

    /// Needs a live server: `REDIS_URL=redis://127.0.0.1/ cargo test --features redis -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn claim_and_report_against_live_redis() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
        let namespace = format!("herald-test-{}", ulid::Ulid::new());
        let store = RedisJobStore::open(&url, namespace, QueuePolicies::default()).unwrap();

        let job = store
            .enqueue(QueueName::Email, serde_json::json!({"to": "a@b.com"}))
            .await
            .unwrap();
        let claimed = store.dequeue_next(QueueName::Email).await.unwrap().unwrap();
        assert_eq!(claimed.id, job.id);
        assert_eq!(claimed.attempts, 1);
        assert!(store.dequeue_next(QueueName::Email).await.unwrap().is_none());

        // a report naming another claim is ignored
        store
            .report_failure(QueueName::Email, job.id, 7, "not mine")
            .await
            .unwrap();
        let held = store.get_job(QueueName::Email, job.id).await.unwrap().unwrap();
        assert!(held.is_claimed_by(1));

        store
            .report_success(QueueName::Email, job.id, claimed.attempts, serde_json::json!({"ok": true}))
            .await
            .unwrap();
        // second report is a no-op
        store
            .report_success(QueueName::Email, job.id, claimed.attempts, serde_json::json!({"ok": false}))
            .await
            .unwrap();

        let done = store.get_job(QueueName::Email, job.id).await.unwrap().unwrap();
        assert_eq!(done.state, JobState::Succeeded);
        assert_eq!(done.result, Some(serde_json::json!({"ok": true})));
        assert_eq!(store.health(QueueName::Email).await.unwrap().succeeded, 1);
    }
}

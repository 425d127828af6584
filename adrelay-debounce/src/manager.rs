//! The Redis-backed debounce manager (spec.md §4.9).
//!
//! Grounded on `acteon-state-redis`'s `RedisDistributedLock` for the
//! deadpool-redis/`redis::Script` plumbing, and on
//! `original_source/app/services/debounce_redis.py` for the exact key
//! layout, submit script and worker-loop algorithm.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::{AsyncCommands, Script};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use adrelay_core::config::{DebounceSettings, RedisPoolSettings, RedisSettings};

use crate::dispatch::JobDispatcher;
use crate::error::DebounceError;
use crate::job::DebounceJob;
use crate::keys;
use crate::scripts;

const LOCK_TTL_MS: i64 = 30_000;

fn build_pool(redis: &RedisSettings, pool: Option<&RedisPoolSettings>) -> Result<Pool, DebounceError> {
    let cfg = PoolConfig::from_url(redis.url());
    let max_size = pool
        .and_then(|p| p.max_connections)
        .unwrap_or(200) as usize;

    cfg.builder()
        .map(|b| b.max_size(max_size).runtime(Runtime::Tokio1).build())
        .map_err(|e| DebounceError::Connection(e.to_string()))?
        .map_err(|e| DebounceError::Connection(e.to_string()))
}

/// Coalesces bursts of same-key submits into a single delayed dispatch,
/// safely across multiple process instances sharing one Redis.
pub struct RedisDebounceManager {
    writer: Pool,
    worker: Pool,
    prefix: String,
    shards: u32,
    batch: usize,
    concurrency: usize,
    latest_ttl_ms: i64,
    running: Arc<AtomicBool>,
    worker_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    dispatcher: Arc<dyn JobDispatcher>,
}

impl RedisDebounceManager {
    /// # Errors
    ///
    /// Returns [`DebounceError::Connection`] if either Redis pool fails to
    /// build.
    pub fn new(
        redis: &RedisSettings,
        settings: &DebounceSettings,
        dispatcher: Arc<dyn JobDispatcher>,
    ) -> Result<Self, DebounceError> {
        let writer = build_pool(redis, settings.writer_pool.as_ref())?;
        let worker = build_pool(redis, settings.worker_pool.as_ref())?;

        Ok(Self {
            writer,
            worker,
            prefix: settings.key_prefix.clone(),
            shards: settings.shards,
            batch: settings.batch,
            concurrency: settings.concurrency,
            latest_ttl_ms: i64::try_from(settings.latest_ttl_ms).unwrap_or(i64::MAX),
            running: Arc::new(AtomicBool::new(false)),
            worker_task: std::sync::Mutex::new(None),
            dispatcher,
        })
    }

    async fn writer_conn(&self) -> Result<deadpool_redis::Connection, DebounceError> {
        self.writer
            .get()
            .await
            .map_err(|e| DebounceError::Connection(e.to_string()))
    }

    async fn worker_conn(&self) -> Result<deadpool_redis::Connection, DebounceError> {
        self.worker
            .get()
            .await
            .map_err(|e| DebounceError::Connection(e.to_string()))
    }

    /// Submit a job under `key`, extending the fixed wait window from the
    /// first submit seen for that key. On script failure, degrades to a
    /// direct dispatch (spec.md §7).
    #[instrument(skip(self, job), fields(key))]
    pub async fn submit_job(&self, key: &str, order_ts_ms: i64, max_wait_ms: u64, job: DebounceJob) {
        let now_ms = now_ms();
        let job_json = match serde_json::to_string(&job) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "debounce job serialization failed, dispatching directly");
                self.dispatcher.dispatch(job).await;
                return;
            }
        };

        let shard = keys::shard_index(key, self.shards);
        let latest = keys::latest_key(&self.prefix, shard, key);
        let due = keys::due_key(&self.prefix, shard);

        let result = async {
            let mut conn = self.writer_conn().await?;
            let script = Script::new(scripts::SUBMIT);
            let _new_due: i64 = script
                .key(&latest)
                .key(&due)
                .arg(key)
                .arg(now_ms)
                .arg(max_wait_ms)
                .arg(order_ts_ms)
                .arg(&job_json)
                .arg(self.latest_ttl_ms)
                .invoke_async(&mut conn)
                .await
                .map_err(|e| DebounceError::Backend(e.to_string()))?;
            Ok::<(), DebounceError>(())
        }
        .await;

        if let Err(e) = result {
            warn!(error = %e, "redis debounce submit failed, dispatching directly");
            self.dispatcher.dispatch(job).await;
        }
    }

    /// Start the background worker loop. Idempotent.
    pub fn start(self: &Arc<Self>) {
        self.running.store(true, Ordering::SeqCst);
        let mut guard = self.worker_task.lock().expect("lock poisoned");
        if guard.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let this = Arc::clone(self);
        *guard = Some(tokio::spawn(async move { this.worker_loop().await }));
        info!("debounce manager started");
    }

    /// Stop the worker loop and wait for it to exit.
    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.worker_task.lock().expect("lock poisoned").take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        info!("debounce manager stopped");
    }

    fn iter_due_keys(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.shards.max(1)).map(|i| keys::due_key(&self.prefix, i))
    }

    async fn worker_loop(self: Arc<Self>) {
        let sem = Arc::new(Semaphore::new(self.concurrency.max(1)));
        while self.running.load(Ordering::SeqCst) {
            let mut any_popped = false;
            let due_keys: Vec<String> = self.iter_due_keys().collect();

            for due in due_keys {
                let popped = match self.pop_due(&due).await {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(due_key = %due, error = %e, "zpopmin failed");
                        continue;
                    }
                };
                if popped.is_empty() {
                    continue;
                }
                any_popped = true;

                let mut handles = Vec::with_capacity(popped.len());
                for task_key in popped {
                    let this = Arc::clone(&self);
                    let permit = Arc::clone(&sem);
                    handles.push(tokio::spawn(async move {
                        let _permit = permit
                            .acquire()
                            .await
                            .expect("semaphore should never be closed");
                        this.process_member(&task_key).await;
                    }));
                }
                for h in handles {
                    let _ = h.await;
                }
            }

            if !any_popped {
                tokio::time::sleep(Duration::from_millis(200)).await;
            } else {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }

    async fn pop_due(&self, due_key: &str) -> Result<Vec<String>, DebounceError> {
        let mut conn = self.worker_conn().await?;
        let popped: Vec<(String, f64)> = conn
            .zpopmin(due_key, self.batch as isize)
            .await
            .map_err(|e| DebounceError::Backend(e.to_string()))?;
        Ok(popped.into_iter().map(|(member, _score)| member).collect())
    }

    #[instrument(skip(self))]
    async fn process_member(&self, task_key: &str) {
        let shard = keys::shard_index(task_key, self.shards);
        let lock = keys::lock_key(&self.prefix, shard, task_key);
        let latest = keys::latest_key(&self.prefix, shard, task_key);
        let due = keys::due_key(&self.prefix, shard);

        let Ok(mut writer) = self.writer_conn().await else {
            warn!("process_member: writer pool unavailable");
            return;
        };

        let script = Script::new(scripts::LOCK_ACQUIRE);
        let acquired: i64 = script
            .key(&lock)
            .arg(LOCK_TTL_MS)
            .invoke_async(&mut writer)
            .await
            .unwrap_or(0);
        if acquired != 1 {
            return;
        }

        let Ok(mut worker_conn) = self.worker_conn().await else {
            let _: Result<(), _> = writer.unlink(&lock).await;
            return;
        };

        let data: std::collections::HashMap<String, String> = worker_conn
            .hgetall(&latest)
            .await
            .unwrap_or_default();

        if data.is_empty() {
            let _: Result<(), _> = writer.zrem(&due, task_key).await;
            let _: Result<(), _> = writer.unlink(&lock).await;
            return;
        }

        let due_at_ms: i64 = data.get("due_at_ms").and_then(|s| s.parse().ok()).unwrap_or(0);
        if due_at_ms > now_ms() {
            let _: Result<(), _> = writer.zadd(&due, task_key, due_at_ms).await;
            let _: Result<(), _> = writer.unlink(&lock).await;
            return;
        }

        let job_json = data.get("job_json").cloned();
        let job: Option<DebounceJob> = job_json.and_then(|s| serde_json::from_str(&s).ok());

        if let Some(job) = job {
            self.dispatcher.dispatch(job).await;
        }

        let _: Result<(), _> = writer.unlink(&latest).await;
        let _: Result<(), _> = writer.zrem(&due, task_key).await;
        let _: Result<(), _> = writer.unlink(&lock).await;
    }

    /// Best-effort drain used at graceful shutdown: optionally pulls every
    /// member's score forward to "now" so nothing due later is missed,
    /// then processes up to `max_items` through the normal path.
    pub async fn flush_all(&self, force: bool, max_items: usize) -> usize {
        if force {
            for due in self.iter_due_keys() {
                if let Ok(mut conn) = self.writer_conn().await {
                    let members: Vec<String> = conn
                        .zrange(&due, 0, (max_items as isize) - 1)
                        .await
                        .unwrap_or_default();
                    if !members.is_empty() {
                        let now = now_ms();
                        let pairs: Vec<(i64, String)> = members.into_iter().map(|m| (now, m)).collect();
                        let _: Result<(), _> = conn.zadd_multiple(&due, &pairs).await;
                    }
                }
            }
        }

        let mut processed = 0usize;
        while processed < max_items {
            let mut any = false;
            for due in self.iter_due_keys() {
                let remaining = max_items - processed;
                let popped = match self.pop_due_limited(&due, remaining).await {
                    Ok(p) => p,
                    Err(_) => continue,
                };
                if popped.is_empty() {
                    continue;
                }
                any = true;
                for task_key in &popped {
                    self.process_member(task_key).await;
                    processed += 1;
                    if processed >= max_items {
                        break;
                    }
                }
            }
            if !any {
                break;
            }
        }
        processed
    }

    async fn pop_due_limited(&self, due_key: &str, limit: usize) -> Result<Vec<String>, DebounceError> {
        let mut conn = self.worker_conn().await?;
        let popped: Vec<(String, f64)> = conn
            .zpopmin(due_key, limit.min(self.batch) as isize)
            .await
            .map_err(|e| DebounceError::Backend(e.to_string()))?;
        Ok(popped.into_iter().map(|(member, _score)| member).collect())
    }
}

fn now_ms() -> i64 {
    i64::try_from(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0),
    )
    .unwrap_or(i64::MAX)
}

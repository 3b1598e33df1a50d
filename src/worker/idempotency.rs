//! Idempotency layer (C10, §4.10): deduplicates job execution by a
//! business key, backed by an external KV store with atomic
//! set-if-absent (Redis `SET key value NX EX ttl`).

use async_trait::async_trait;
use deadpool_redis::Pool as RedisPool;

use crate::config::IdempotencyConfig;
use crate::error::{Error, Result};

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically marks `key` as seen if absent, returning `true` if this
    /// call was the first to see it.
    async fn set_if_absent(&self, key: &str, ttl_secs: u64) -> Result<bool>;

    /// Deletes `key`, allowing a retried task to be reprocessed after a
    /// failed first attempt.
    async fn delete(&self, key: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct RedisIdempotencyStore {
    pool: RedisPool,
}

impl RedisIdempotencyStore {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn set_if_absent(&self, key: &str, ttl_secs: u64) -> Result<bool> {
        use std::ops::DerefMut;
        let mut conn = self.pool.get().await.map_err(|e| Error::Internal(format!("redis connection failed: {e}")))?;
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(conn.deref_mut())
            .await?;
        Ok(result.is_some())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        use std::ops::DerefMut;
        let mut conn = self.pool.get().await.map_err(|e| Error::Internal(format!("redis connection failed: {e}")))?;
        let _: () = redis::cmd("DEL").arg(key).query_async(conn.deref_mut()).await?;
        Ok(())
    }
}

/// Extracts the business key a job should be deduplicated on. An empty
/// key means "no idempotency": the job is always processed.
pub type KeyExtractor = fn(&crate::worker::job::Job) -> String;

/// Wraps a [`crate::worker::JobHandler`] so duplicate jobs are skipped
/// before `inner` ever runs, and a claimed key is released on failure so
/// the retried job isn't permanently locked out (§4.10 step 5).
pub struct IdempotentHandler<H: crate::worker::JobHandler> {
    guard: IdempotencyGuard,
    key_of: KeyExtractor,
    inner: H,
}

impl<H: crate::worker::JobHandler> IdempotentHandler<H> {
    pub fn new(store: std::sync::Arc<dyn IdempotencyStore>, config: IdempotencyConfig, key_of: KeyExtractor, inner: H) -> Self {
        Self { guard: IdempotencyGuard::new(store, config), key_of, inner }
    }
}

#[async_trait]
impl<H: crate::worker::JobHandler> crate::worker::JobHandler for IdempotentHandler<H> {
    async fn handle(&self, job: &crate::worker::job::Job) -> std::result::Result<(), crate::worker::WorkerError> {
        let key = (self.key_of)(job);

        match self.guard.check(&key).await {
            Ok(GuardDecision::Duplicate) => return Ok(()),
            Ok(GuardDecision::Proceed) => {}
            Err(err) => return Err(crate::worker::WorkerError::retryable(err.to_string())),
        }

        let result = self.inner.handle(job).await;
        if result.is_err() {
            if let Err(release_err) = self.guard.release(&key).await {
                tracing::warn!(error = %release_err, key, "failed to release idempotency key after handler failure");
            }
        }
        result
    }
}

pub struct IdempotencyGuard {
    store: std::sync::Arc<dyn IdempotencyStore>,
    config: IdempotencyConfig,
}

#[derive(Debug, PartialEq, Eq)]
pub enum GuardDecision {
    /// First time seeing this key: the handler must run.
    Proceed,
    /// A prior invocation already claimed this key: skip the handler,
    /// report success.
    Duplicate,
}

impl IdempotencyGuard {
    pub fn new(store: std::sync::Arc<dyn IdempotencyStore>, config: IdempotencyConfig) -> Self {
        Self { store, config }
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    /// `Ok(Proceed)` means the caller must run the handler and, on
    /// failure, call [`IdempotencyGuard::release`] so a retry is
    /// possible. A store failure degrades per [`IdempotencyConfig::fail_open`]:
    /// `true` treats it as `Proceed` (process anyway), `false` propagates
    /// the error so the task is retried later (§4.10 step 5).
    pub async fn check(&self, key: &str) -> Result<GuardDecision> {
        if key.is_empty() {
            return Ok(GuardDecision::Proceed);
        }

        match self.store.set_if_absent(&self.namespaced(key), self.config.ttl_secs).await {
            Ok(true) => Ok(GuardDecision::Proceed),
            Ok(false) => Ok(GuardDecision::Duplicate),
            Err(err) if self.config.fail_open => {
                tracing::warn!(error = %err, key, "idempotency store unavailable, failing open");
                Ok(GuardDecision::Proceed)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn release(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Ok(());
        }
        self.store.delete(&self.namespaced(key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct FakeStore {
        seen: Mutex<HashSet<String>>,
        fail: bool,
    }

    #[async_trait]
    impl IdempotencyStore for FakeStore {
        async fn set_if_absent(&self, key: &str, _ttl_secs: u64) -> Result<bool> {
            if self.fail {
                return Err(Error::Internal("store down".to_string()));
            }
            Ok(self.seen.lock().unwrap().insert(key.to_string()))
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.seen.lock().unwrap().remove(key);
            Ok(())
        }
    }

    fn config() -> IdempotencyConfig {
        IdempotencyConfig { ttl_secs: 60, fail_open: true, key_prefix: "idempotency:".to_string() }
    }

    #[tokio::test]
    async fn second_check_with_same_key_is_a_duplicate() {
        let store = std::sync::Arc::new(FakeStore { seen: Mutex::new(HashSet::new()), fail: false });
        let guard = IdempotencyGuard::new(store, config());
        assert_eq!(guard.check("order:123").await.unwrap(), GuardDecision::Proceed);
        assert_eq!(guard.check("order:123").await.unwrap(), GuardDecision::Duplicate);
    }

    #[tokio::test]
    async fn release_allows_a_subsequent_retry() {
        let store = std::sync::Arc::new(FakeStore { seen: Mutex::new(HashSet::new()), fail: false });
        let guard = IdempotencyGuard::new(store, config());
        assert_eq!(guard.check("order:123").await.unwrap(), GuardDecision::Proceed);
        guard.release("order:123").await.unwrap();
        assert_eq!(guard.check("order:123").await.unwrap(), GuardDecision::Proceed);
    }

    #[tokio::test]
    async fn empty_key_always_proceeds() {
        let store = std::sync::Arc::new(FakeStore { seen: Mutex::new(HashSet::new()), fail: false });
        let guard = IdempotencyGuard::new(store, config());
        assert_eq!(guard.check("").await.unwrap(), GuardDecision::Proceed);
        assert_eq!(guard.check("").await.unwrap(), GuardDecision::Proceed);
    }

    #[tokio::test]
    async fn store_failure_fails_open_by_default() {
        let store = std::sync::Arc::new(FakeStore { seen: Mutex::new(HashSet::new()), fail: true });
        let guard = IdempotencyGuard::new(store, config());
        assert_eq!(guard.check("order:123").await.unwrap(), GuardDecision::Proceed);
    }

    #[tokio::test]
    async fn store_failure_propagates_when_fail_closed() {
        let store = std::sync::Arc::new(FakeStore { seen: Mutex::new(HashSet::new()), fail: true });
        let mut cfg = config();
        cfg.fail_open = false;
        let guard = IdempotencyGuard::new(store, cfg);
        assert!(guard.check("order:123").await.is_err());
    }

    struct CountingHandler {
        calls: std::sync::atomic::AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl crate::worker::JobHandler for CountingHandler {
        async fn handle(&self, _job: &crate::worker::job::Job) -> std::result::Result<(), crate::worker::WorkerError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if self.fail {
                return Err(crate::worker::WorkerError::retryable("boom"));
            }
            Ok(())
        }
    }

    fn key_of(job: &crate::worker::job::Job) -> String {
        job.task_type.clone()
    }

    #[tokio::test]
    async fn duplicate_job_never_reaches_the_inner_handler() {
        use crate::worker::JobHandler;

        let store = std::sync::Arc::new(FakeStore { seen: Mutex::new(HashSet::new()), fail: false });
        let handler = IdempotentHandler::new(store, config(), key_of, CountingHandler { calls: Default::default(), fail: false });
        let job = crate::worker::job::Job::new("send-invoice", vec![], crate::worker::job::Queue::Default);

        handler.handle(&job).await.unwrap();
        handler.handle(&job).await.unwrap();

        assert_eq!(handler.inner.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_handler_releases_the_key_so_a_retry_can_proceed() {
        use crate::worker::JobHandler;

        let store = std::sync::Arc::new(FakeStore { seen: Mutex::new(HashSet::new()), fail: false });
        let handler = IdempotentHandler::new(store, config(), key_of, CountingHandler { calls: Default::default(), fail: true });
        let job = crate::worker::job::Job::new("send-invoice", vec![], crate::worker::job::Queue::Default);

        assert!(handler.handle(&job).await.is_err());
        assert!(handler.handle(&job).await.is_err());

        assert_eq!(handler.inner.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}

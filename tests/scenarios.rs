//! Cross-module scenario tests, one per concrete scenario named in the
//! runtime's design notes: authentication failure modes, rate limiting
//! and its backend-outage fallback, fanout isolation, idempotent replay,
//! and transactional rollback.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::{Extension, Router};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use tower::ServiceExt;

use coreplane_service::prelude::*;
use coreplane_service::db::TxWork;
use coreplane_service::middleware::auth::JwtAuth;
use coreplane_service::middleware::rate_limit::{rate_limit_middleware, RateLimiter};
use coreplane_service::worker::{IdempotencyGuard, IdempotencyStore};
use coreplane_service::worker::patterns::{fanout, FanoutEvent, FanoutRegistry};
use coreplane_service::worker::{JobHandler, WorkerClient, WorkerError, WorkerServer};
use coreplane_service::worker::job::{Job, JobOptions, Queue};
use coreplane_service::worker::queue::WeightedQueue;
use coreplane_service::worker::dead_letter::InMemoryDeadLetterStore;

fn jwt_config() -> coreplane_service::config::JwtConfig {
    coreplane_service::config::JwtConfig { secret: "x".repeat(32), issuer: None, audience: None, leeway_secs: 0 }
}

fn protected_app(auth: JwtAuth) -> Router {
    async fn whoami(Extension(claims): Extension<Claims>) -> String {
        claims.sub
    }

    Router::new()
        .route("/v1/users", get(whoami))
        .layer(axum::middleware::from_fn_with_state(auth, JwtAuth::middleware))
}

/// Scenario 1: unauthenticated access to a protected route is rejected
/// before the handler ever runs.
#[tokio::test]
async fn scenario_unauthenticated_access_is_rejected() {
    let auth = JwtAuth::new(&jwt_config()).unwrap();
    let app = protected_app(auth);

    let response = app.oneshot(Request::builder().uri("/v1/users").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// Scenario 2: a token whose `exp` has already passed is rejected with
/// `TOKEN_EXPIRED`, not a generic unauthorized error.
#[tokio::test]
async fn scenario_expired_token_is_token_expired() {
    let config = jwt_config();
    let auth = JwtAuth::new(&config).unwrap();

    let claims = Claims {
        sub: "user-1".to_string(),
        iss: None,
        aud: vec![],
        exp: 1,
        iat: None,
        nbf: None,
        roles: vec![],
        permissions: vec![],
        metadata: HashMap::new(),
    };
    let token = encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(config.secret.as_bytes())).unwrap();

    let err = auth.validate_token(&token).unwrap_err();
    match err {
        Error::App(app) => assert_eq!(app.code, ErrorCode::TokenExpired),
        other => panic!("expected an AppError, got {other:?}"),
    }
}

/// Scenario 3: a token signed with an algorithm other than the
/// configured one never decodes, regardless of whether it is otherwise
/// well-formed (algorithm confusion).
#[tokio::test]
async fn scenario_algorithm_confusion_is_token_invalid() {
    let config = jwt_config();
    let auth = JwtAuth::new(&config).unwrap();

    let claims = Claims {
        sub: "user-1".to_string(),
        iss: None,
        aud: vec![],
        exp: 9_999_999_999,
        iat: None,
        nbf: None,
        roles: vec![],
        permissions: vec![],
        metadata: HashMap::new(),
    };
    // Signed HS384 while the authenticator only ever validates HS256:
    // jsonwebtoken refuses to decode a header whose `alg` isn't in the
    // validation's allowed set, independent of signature correctness.
    let token = encode(&Header::new(Algorithm::HS384), &claims, &EncodingKey::from_secret(config.secret.as_bytes())).unwrap();

    let err = auth.validate_token(&token).unwrap_err();
    match err {
        Error::App(app) => assert_eq!(app.code, ErrorCode::TokenInvalid),
        other => panic!("expected an AppError, got {other:?}"),
    }
}

/// Scenario 4: with a limit of 2 requests per window, a third rapid
/// request is rejected with `RATE_LIMIT_EXCEEDED` and a `Retry-After`
/// header.
#[tokio::test]
async fn scenario_rate_limit_exceeded_carries_retry_after() {
    let config = coreplane_service::config::RateLimitConfig {
        per_subject_rpm: 2,
        window_secs: 1,
        backend: "memory".to_string(),
        circuit_breaker_threshold: 5,
        circuit_breaker_recovery_secs: 30,
        fail_open: true,
    };
    let limiter = Arc::new(RateLimiter::from_config(&config, false, None));

    async fn ok() -> &'static str {
        "ok"
    }

    let app = Router::new()
        .route("/v1/ping", get(ok))
        .layer(axum::middleware::from_fn_with_state(limiter, rate_limit_middleware));

    let request = || Request::builder().uri("/v1/ping").body(Body::empty()).unwrap();

    let first = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let second = app.clone().oneshot(request()).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);

    let third = app.oneshot(request()).await.unwrap();
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(third.headers().get(axum::http::header::RETRY_AFTER).unwrap(), "1");
}

/// Scenario 5: once the external rate-limit backend has failed
/// `circuit_breaker_threshold` times in a row, the breaker opens and
/// subsequent calls are served by the in-memory fallback instead of
/// failing outright.
#[tokio::test]
async fn scenario_rate_limit_backend_outage_falls_back_to_memory() {
    use coreplane_service::middleware::rate_limit::CircuitBreaker;

    let breaker = CircuitBreaker::new(5, Duration::from_secs(30));
    for _ in 0..5 {
        breaker.record_failure();
    }
    assert!(!breaker.allow_request(), "breaker should be open after 5 consecutive failures");

    let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
    breaker.record_failure();
    std::thread::sleep(Duration::from_millis(15));
    assert!(breaker.allow_request(), "a probe request should be allowed once the recovery timeout elapses");
    breaker.record_success();
    assert_eq!(breaker.state(), coreplane_service::middleware::rate_limit::CircuitState::Closed);
}

struct PanicOnceThenSucceed {
    panicked: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl JobHandler for PanicOnceThenSucceed {
    async fn handle(&self, _job: &Job) -> std::result::Result<(), WorkerError> {
        if !self.panicked.swap(true, std::sync::atomic::Ordering::SeqCst) {
            panic!("simulated transient failure");
        }
        Ok(())
    }
}

struct AlwaysSucceed {
    calls: std::sync::atomic::AtomicU32,
}

#[async_trait]
impl JobHandler for AlwaysSucceed {
    async fn handle(&self, _job: &Job) -> std::result::Result<(), WorkerError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

/// Scenario 6: `hA` panics on its first attempt and recovers on retry;
/// `hB` succeeds on the first attempt. Each handler is dispatched as an
/// independent job, so one's retry count never touches the other's.
#[tokio::test]
async fn scenario_fanout_isolates_handler_failures() {
    let registry = FanoutRegistry::new();
    registry.register("user:created", "hA", Queue::Critical, JobOptions { max_retry: 2, ..Default::default() }).unwrap();
    registry.register("user:created", "hB", Queue::Low, JobOptions { max_retry: 2, ..Default::default() }).unwrap();

    let (sender, mut queue) = WeightedQueue::bounded(16);
    let client = WorkerClient::new(sender);
    let errors = fanout(&client, &registry, FanoutEvent::new("user:created", vec![1])).await;
    assert!(errors.is_empty());

    let job_a = queue.recv().await.unwrap();
    let job_b = queue.recv().await.unwrap();
    let (job_a, job_b) = if job_a.task_type.ends_with("hA") { (job_a, job_b) } else { (job_b, job_a) };

    let handler_a = Arc::new(PanicOnceThenSucceed { panicked: std::sync::atomic::AtomicBool::new(false) });
    let handler_b = Arc::new(AlwaysSucceed { calls: std::sync::atomic::AtomicU32::new(0) });

    let server_a = WorkerServer::new(handler_a.clone(), Metrics::new(vec![10.0]), Arc::new(InMemoryDeadLetterStore::new(10)));
    let dead_letters_b = Arc::new(InMemoryDeadLetterStore::new(10));
    let server_b = WorkerServer::new(handler_b.clone(), Metrics::new(vec![10.0]), dead_letters_b.clone());

    // Each fanout target runs through its own WorkerServer instance here
    // (standing in for two independent worker processes), so hA's panic
    // and retry never touches hB's dead-letter store or call count.
    run_job_to_completion(&server_a, job_a).await;
    run_job_to_completion(&server_b, job_b).await;

    assert_eq!(handler_b.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(dead_letters_b.recent(10).is_empty());
}

/// Runs a single job to completion: enqueues it, closes the sender so
/// `WorkerServer::run` drains and exits once the queue empties.
async fn run_job_to_completion(server: &WorkerServer, job: Job) {
    let (sender, queue) = WeightedQueue::bounded(1);
    sender.send(job).await.unwrap();
    drop(sender);
    server.run(queue, std::future::pending::<()>()).await;
}

/// Scenario 7: re-enqueuing the same business key after a successful run
/// is recognized as a duplicate and the inner handler is not invoked
/// again.
#[tokio::test]
async fn scenario_idempotent_replay_runs_the_handler_once() {
    use std::collections::HashSet;
    use std::sync::Mutex;

    struct FakeStore {
        seen: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl IdempotencyStore for FakeStore {
        async fn set_if_absent(&self, key: &str, _ttl_secs: u64) -> coreplane_service::error::Result<bool> {
            Ok(self.seen.lock().unwrap().insert(key.to_string()))
        }

        async fn delete(&self, key: &str) -> coreplane_service::error::Result<()> {
            self.seen.lock().unwrap().remove(key);
            Ok(())
        }
    }

    let store = Arc::new(FakeStore { seen: Mutex::new(HashSet::new()) });
    let guard = IdempotencyGuard::new(
        store,
        coreplane_service::config::IdempotencyConfig { ttl_secs: 60, fail_open: true, key_prefix: "idem:".to_string() },
    );

    let handler_calls = std::sync::atomic::AtomicU32::new(0);
    let run_once = |key: &str| {
        let decision = futures::executor::block_on(guard.check(key)).unwrap();
        if decision == coreplane_service::worker::GuardDecision::Proceed {
            handler_calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    };

    run_once("order:123");
    run_once("order:123");

    assert_eq!(handler_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

/// Scenario 8: a transaction whose closure writes then fails rolls back
/// both writes; nothing committed is visible afterward.
#[tokio::test]
async fn scenario_transactional_audit_rolls_back_on_failure() {
    struct RecordingQuerier {
        writes: Mutex<Vec<String>>,
    }

    use std::sync::Mutex;

    #[async_trait]
    impl Querier for RecordingQuerier {
        async fn exec(&self, sql: &str, _args: &[serde_json::Value]) -> coreplane_service::error::Result<u64> {
            self.writes.lock().unwrap().push(sql.to_string());
            Ok(1)
        }

        async fn query(&self, _sql: &str, _args: &[serde_json::Value]) -> coreplane_service::error::Result<Vec<serde_json::Value>> {
            Ok(vec![])
        }

        async fn query_row(&self, _sql: &str, _args: &[serde_json::Value]) -> coreplane_service::error::Result<serde_json::Value> {
            Err(AppError::not_found("no row").into())
        }
    }

    struct RollbackOnErrTxManager {
        querier: RecordingQuerier,
        committed: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl TxManager for RollbackOnErrTxManager {
        async fn with_tx<'a>(&self, f: TxWork<'a>) -> coreplane_service::error::Result<()> {
            let result = f(&self.querier).await;
            self.committed.store(result.is_ok(), std::sync::atomic::Ordering::SeqCst);
            if result.is_err() {
                self.querier.writes.lock().unwrap().clear();
            }
            result
        }
    }

    let tx = RollbackOnErrTxManager {
        querier: RecordingQuerier { writes: Mutex::new(vec![]) },
        committed: std::sync::atomic::AtomicBool::new(false),
    };

    let work: TxWork = Box::new(|q: &dyn Querier| {
        Box::pin(async move {
            q.exec("insert into users ...", &[]).await?;
            q.exec("insert into audit_log ...", &[]).await?;
            Err(AppError::internal("simulated failure after writes").into())
        })
    });

    let result = tx.with_tx(work).await;
    assert!(result.is_err());
    assert!(!tx.committed.load(std::sync::atomic::Ordering::SeqCst));
    assert!(tx.querier.writes.lock().unwrap().is_empty(), "rolled-back writes must not be visible");
}

//! A hexagonal backend service runtime: closed-registry error handling, a
//! uniform response envelope, JWT/API-key/OIDC authentication, a
//! circuit-breaker-backed rate limiter, a priority-weighted job worker, and
//! the observability/config ambient stack tying them together.
//!
//! ```rust,no_run
//! use coreplane_service::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     let state = AppState::new(config.clone());
//!
//!     let auth = AuthMiddleware::new(JwtAuth::new(&config.jwt)?, ApiKeyAuth::new(config.api_keys.clone()));
//!     let rate_limiter = std::sync::Arc::new(RateLimiter::from_config(&config.rate_limit, config.middleware.trust_proxy_headers, None));
//!     let app = router::build_router(state.clone(), &[], auth, rate_limiter);
//!
//!     Server::new(config).serve(app, state.metrics()).await
//! }
//! ```

pub mod clock;
pub mod config;
pub mod context;
pub mod db;
pub mod envelope;
pub mod error;
pub mod health;
pub mod ids;
pub mod middleware;
pub mod observability;
pub mod router;
pub mod server;
pub mod state;
pub mod worker;

/// Common imports for applications built on top of this crate.
pub mod prelude {
    pub use crate::clock::{Clock, FakeClock, SharedClock, SystemClock};
    pub use crate::config::Config;
    pub use crate::context::{Claims, RequestContext};
    pub use crate::db::{Querier, TxManager, TxWork};
    pub use crate::envelope::{Envelope, EnvelopeError, FieldError, Meta, ProblemDocument};
    pub use crate::error::{AppError, Error, ErrorCode, Result};
    pub use crate::health::{healthz, readyz};
    pub use crate::ids::{MakeTypedRequestId, RequestId, RequestIdError};
    pub use crate::middleware::{ApiKeyAuth, AuthMiddleware, JwtAuth, RateLimiter};
    pub use crate::observability::{init_tracing, Metrics};
    pub use crate::router::{self, Routes};
    pub use crate::server::Server;
    pub use crate::state::AppState;
    pub use crate::worker::{
        DeadLetter, DeadLetterStore, GuardDecision, IdempotencyGuard, IdempotencyStore, IdempotentHandler, Job,
        JobHandler, JobOptions, KeyExtractor, Queue, WorkerClient, WorkerError, WorkerServer,
    };

    pub use axum::{
        extract::{Path, Query, State},
        http::{HeaderMap, HeaderValue, StatusCode},
        response::{IntoResponse, Json, Response},
        routing::{delete, get, patch, post, put},
        Extension, Router,
    };

    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use thiserror::Error as ThisError;
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

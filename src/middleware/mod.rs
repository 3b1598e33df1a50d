//! The HTTP middleware chain (§4.2): Recovery, Request-ID, Timeout, Body
//! Limit, Rate Limiting, Authentication, Authorization, Logging, applied
//! in that fixed order around every route.

pub mod auth;
pub mod authorize;
pub mod body_limit;
pub mod logging;
pub mod rate_limit;
pub mod recovery;
pub mod request_id;
pub mod timeout;

pub use auth::{ApiKeyAuth, AuthMiddleware, JwtAuth};
pub use body_limit::body_limit_layer;
pub use logging::logging_middleware;
pub use rate_limit::{rate_limit_middleware, RateLimiter};
pub use recovery::recovery_middleware;
pub use request_id::{request_id_middleware, RequestIdConfig};
pub use timeout::timeout_middleware;

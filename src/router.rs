//! Top-level router assembly (§4.6, C6). The router only ever depends on
//! the [`Routes`] interface for application-specific endpoints — it never
//! imports a concrete handler module, so wiring a new set of routes never
//! requires touching this file.
//!
//! Health, readiness, and metrics are mounted outside the versioned nests
//! and never pass through rate-limit or auth: a caller must be able to
//! reach `/healthz` without a credential, and a rate-limiter outage must
//! not also take liveness probing down with it.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::health::{healthz, readyz};
use crate::middleware::{rate_limit_middleware, AuthMiddleware, RateLimiter};
use crate::observability::Metrics;
use crate::state::AppState;

/// Implemented by whatever crate/module owns the versioned API surface.
/// Kept deliberately minimal: a single mount point under `/{version}`,
/// so the router stays ignorant of what lives behind it (§4.6 hexagonal
/// boundary).
pub trait Routes: Send + Sync {
    fn version(&self) -> &str;
    fn router(&self) -> Router<AppState>;
}

/// Mounts every `Routes` implementation under `/{version}`, wrapped in
/// rate-limit then auth (§4.3 steps 5–6, in that order — the last
/// `.layer()` call below is outermost). `Routes` implementations that
/// need role/permission checks add [`crate::middleware::authorize`] as
/// their own innermost layer, so the full declared order — rate limit,
/// auth, authorization, handler — holds end to end.
pub fn build_router(state: AppState, routes: &[Box<dyn Routes>], auth: AuthMiddleware, rate_limiter: Arc<RateLimiter>) -> Router {
    let mut app = Router::new().route("/healthz", get(healthz)).route("/readyz", get(readyz)).route("/metrics", get(metrics_handler));

    for route_set in routes {
        let versioned = route_set
            .router()
            .layer(axum::middleware::from_fn_with_state(auth.clone(), AuthMiddleware::middleware))
            .layer(axum::middleware::from_fn_with_state(rate_limiter.clone(), rate_limit_middleware));
        app = app.nest(&format!("/{}", route_set.version()), versioned);
    }

    app.with_state(state)
}

async fn metrics_handler(axum::extract::State(state): axum::extract::State<AppState>) -> String {
    let metrics: std::sync::Arc<Metrics> = state.metrics();
    metrics.encode()
}

//! Structured access logging + HTTP metrics recording, combined in one
//! middleware since both need the same matched-route/status/duration
//! triple (§4.3). Route labels use axum's `MatchedPath` so cardinality
//! stays bounded by the number of registered routes rather than by the
//! number of distinct URLs ever requested (§4.3, P9) — axum solves route
//! templating for label purposes natively here, no separate matcher
//! needed.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;

use crate::observability::metrics::{normalize_method, Metrics, UNMATCHED_ROUTE};

pub async fn logging_middleware(metrics: Arc<Metrics>, request: Request<Body>, next: Next) -> Response {
    let method = request.method().as_str().to_string();
    let route = request.extensions().get::<MatchedPath>().map(|p| p.as_str().to_string()).unwrap_or_else(|| UNMATCHED_ROUTE.to_string());

    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    let status = response.status().as_u16();

    let normalized_method = normalize_method(&method);
    metrics.record_http_request(normalized_method, &route, status, elapsed_ms);

    tracing::info!(
        method = normalized_method,
        route = %route,
        status,
        duration_ms = elapsed_ms,
        "request completed"
    );

    response
}

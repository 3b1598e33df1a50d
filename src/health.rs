//! Liveness and readiness probes (§4.6).

use axum::extract::State;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::envelope::Envelope;
use crate::error::ErrorCode;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct LivenessBody {
    pub status: &'static str,
}

/// `GET /healthz`: always 200, no dependency checks, must stay under
/// 10ms p99 (§8 P-class latency budget) — the handler does no I/O at all.
pub async fn healthz() -> impl IntoResponse {
    Envelope::ok(LivenessBody { status: "alive" })
}

#[derive(Debug, Serialize)]
pub struct ReadinessBody {
    pub status: &'static str,
}

/// `GET /readyz`: 200 if the database is reachable, 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let Some(db) = state.db() else {
        return Envelope::ok(ReadinessBody { status: "ready" });
    };

    match db.query_row("SELECT 1", &[]).await {
        Ok(_) => Envelope::ok(ReadinessBody { status: "ready" }),
        Err(err) => {
            tracing::warn!(error = %err, "readiness check failed");
            Envelope::<ReadinessBody>::error(ErrorCode::ServiceUnavailable, "database unreachable")
        }
    }
}

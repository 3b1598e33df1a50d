//! Per-request deadline (§4.2, §9 glossary "Deadline"). Anything still
//! running past `ServiceConfig::timeout_secs` is abandoned and answered
//! with `TIMEOUT`/504 rather than left to hang.

use axum::body::Body;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::{AppError, ErrorCode};

pub async fn timeout_middleware(duration: std::time::Duration, request: Request<Body>, next: Next) -> Response {
    match tokio::time::timeout(duration, next.run(request)).await {
        Ok(response) => response,
        Err(_) => AppError::new(ErrorCode::Timeout, "request exceeded its deadline").into_response(),
    }
}

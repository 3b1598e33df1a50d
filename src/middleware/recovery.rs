//! Panic recovery (§4.2, §7: "Recovery MUST be outermost"). A panic
//! anywhere downstream in the handler chain is caught here and turned
//! into an ordinary `INTERNAL_ERROR` response instead of tearing down
//! the connection.

use std::panic::AssertUnwindSafe;

use axum::body::Body;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures::FutureExt;

use crate::error::{AppError, ErrorCode};

pub async fn recovery_middleware(request: Request<Body>, next: Next) -> Response {
    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            let message = panic_message(&panic);
            tracing::error!(panic = %message, "request handler panicked");
            AppError::new(ErrorCode::InternalError, "internal error").into_response()
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

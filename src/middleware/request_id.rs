//! Request id propagation (§3, §4.2): every request gets a [`RequestId`],
//! scoped into the task-local `CURRENT_REQUEST_ID` for the lifetime of
//! the request so the envelope/problem-document layers can stamp
//! `trace_id` without threading it through every call, and echoed back
//! on the response so a caller can correlate.
//!
//! Uses a single typed id rather than a configurable list of propagated
//! headers.

use std::str::FromStr;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

use crate::context;
use crate::ids::RequestId;

#[derive(Debug, Clone)]
pub struct RequestIdConfig {
    pub header_name: HeaderName,
    /// Whether to trust an inbound request-id header from the caller
    /// (e.g. behind a proxy that sets it) rather than always minting a
    /// fresh one.
    pub trust_inbound: bool,
}

impl Default for RequestIdConfig {
    fn default() -> Self {
        Self { header_name: HeaderName::from_static("x-request-id"), trust_inbound: false }
    }
}

impl RequestIdConfig {
    pub fn from_header_name(header_name: &str, trust_inbound: bool) -> Self {
        let header_name = HeaderName::from_str(header_name).unwrap_or_else(|_| HeaderName::from_static("x-request-id"));
        Self { header_name, trust_inbound }
    }
}

pub async fn request_id_middleware(config: RequestIdConfig, mut request: Request<Body>, next: Next) -> Response {
    let id = if config.trust_inbound {
        request
            .headers()
            .get(&config.header_name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| RequestId::from_str(s).ok())
            .unwrap_or_else(RequestId::new)
    } else {
        RequestId::new()
    };

    request.extensions_mut().insert(id.clone());

    let mut response = context::scope_request_id(id.clone(), next.run(request)).await;

    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        response.headers_mut().insert(config.header_name, value);
    }

    response
}

//! The uniform response envelope (C1) and the RFC-7807 problem document
//! used for validation failures.
//!
//! Every JSON response this crate produces — success or error — is one of
//! these two shapes. Handlers return `Result<Json<T>, Error>` or build an
//! `Envelope` directly; nothing in this crate builds an ad-hoc response
//! body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::context;
use crate::error::ErrorCode;

/// Metadata attached to every envelope. `trace_id` is always present, even
/// when no request-scoped id is available (it falls back to `"unknown"`
/// rather than being omitted), so clients can always correlate a response
/// with server logs. `page`/`page_size`/`total` are only set on list
/// responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

impl Meta {
    fn current() -> Self {
        Self {
            trace_id: context::current_request_id().map(|id| id.to_string()).unwrap_or_else(|| "unknown".to_string()),
            page: None,
            page_size: None,
            total: None,
        }
    }

    pub fn with_pagination(mut self, page: u64, page_size: u64, total: u64) -> Self {
        self.page = Some(page);
        self.page_size = Some(page_size);
        self.total = Some(total);
        self
    }
}

/// The error body nested inside an error envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// `{"data": ..., "meta": {...}}` on success, `{"error": {...}, "meta": {...}}`
/// on failure. Never both.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
    pub meta: Meta,
}

impl<T: Serialize> Envelope<T> {
    /// Wrap a successful payload. Status defaults to 200; use
    /// [`EnvelopeResponse::status`] for 201/202/etc.
    pub fn ok(data: T) -> EnvelopeResponse<T> {
        EnvelopeResponse { status: StatusCode::OK, envelope: Envelope { data: Some(data), error: None, meta: Meta::current() } }
    }

    /// Wrap a successful list payload, stamping pagination metadata.
    pub fn paginated(data: T, page: u64, page_size: u64, total: u64) -> EnvelopeResponse<T> {
        EnvelopeResponse {
            status: StatusCode::OK,
            envelope: Envelope { data: Some(data), error: None, meta: Meta::current().with_pagination(page, page_size, total) },
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> EnvelopeResponse<T> {
        EnvelopeResponse {
            status: code.status(),
            envelope: Envelope {
                data: None,
                error: Some(EnvelopeError { code: code.as_str().to_string(), message: message.into(), hint: None }),
                meta: Meta::current(),
            },
        }
    }

    pub fn error_with_hint(code: ErrorCode, message: impl Into<String>, hint: impl Into<String>) -> EnvelopeResponse<T> {
        EnvelopeResponse {
            status: code.status(),
            envelope: Envelope {
                data: None,
                error: Some(EnvelopeError { code: code.as_str().to_string(), message: message.into(), hint: Some(hint.into()) }),
                meta: Meta::current(),
            },
        }
    }
}

/// An envelope paired with the HTTP status it should be served with.
pub struct EnvelopeResponse<T: Serialize> {
    status: StatusCode,
    envelope: Envelope<T>,
}

impl<T: Serialize> EnvelopeResponse<T> {
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }
}

impl<T: Serialize> IntoResponse for EnvelopeResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self.envelope)).into_response()
    }
}

/// A single field-level validation failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// RFC 7807 problem document, used specifically for `VALIDATION_FAILED`
/// responses where field-level detail is useful to the caller (§6).
#[derive(Debug, Serialize, Deserialize)]
pub struct ProblemDocument {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub code: String,
    #[serde(rename = "validationErrors", default)]
    pub validation_errors: Vec<FieldError>,
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ProblemDocument {
    pub fn validation(detail: impl Into<String>) -> Self {
        let request_id = context::current_request_id().map(|id| id.to_string());
        Self {
            problem_type: "about:blank".to_string(),
            title: "Validation Failed".to_string(),
            status: ErrorCode::ValidationFailed.status().as_u16(),
            detail: Some(detail.into()),
            instance: request_id.clone(),
            code: ErrorCode::ValidationFailed.as_str().to_string(),
            validation_errors: Vec::new(),
            trace_id: request_id.clone().unwrap_or_else(|| "unknown".to_string()),
            request_id,
        }
    }

    pub fn with_field_error(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.validation_errors.push(FieldError { field: field.into(), message: message.into() });
        self
    }

    pub fn has_errors(&self) -> bool {
        !self.validation_errors.is_empty()
    }
}

impl IntoResponse for ProblemDocument {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::UNPROCESSABLE_ENTITY);
        let mut response = (status, Json(&self)).into_response();
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

//! Crate-wide error type and the closed error-code registry.
//!
//! Every error that can reach an HTTP response is represented here. The
//! `IntoResponse` impl is the single place that turns an `Error` into an
//! envelope, and it is the only place allowed to decide the HTTP status
//! for a given error: nothing else in the crate matches on `Error`
//! variants to pick a status code.

use axum::response::{IntoResponse, Response};
use axum::http::StatusCode;
use thiserror::Error;

use crate::envelope::Envelope;

/// The closed set of error codes exposed to clients.
///
/// Adding a variant here is a breaking wire change, so a new failure mode
/// should be mapped onto an existing code rather than widening this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorCode {
    BadRequest,
    Unauthorized,
    TokenExpired,
    TokenInvalid,
    Forbidden,
    NotFound,
    Conflict,
    ValidationFailed,
    RateLimitExceeded,
    InternalError,
    ServiceUnavailable,
    Timeout,
}

impl ErrorCode {
    const ALL: [ErrorCode; 12] = [
        ErrorCode::BadRequest,
        ErrorCode::Unauthorized,
        ErrorCode::TokenExpired,
        ErrorCode::TokenInvalid,
        ErrorCode::Forbidden,
        ErrorCode::NotFound,
        ErrorCode::Conflict,
        ErrorCode::ValidationFailed,
        ErrorCode::RateLimitExceeded,
        ErrorCode::InternalError,
        ErrorCode::ServiceUnavailable,
        ErrorCode::Timeout,
    ];

    /// HTTP status for this code.
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::TokenExpired => StatusCode::UNAUTHORIZED,
            ErrorCode::TokenInvalid => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::ValidationFailed => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Wire representation, e.g. `"TOKEN_EXPIRED"`.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "BAD_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::TokenInvalid => "TOKEN_INVALID",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::Timeout => "TIMEOUT",
        }
    }
}

/// An application-level error carrying a code from the closed set, plus
/// an optional cause kept only for server-side logging: client-visible
/// text never includes internal detail.
#[derive(Debug, Error)]
#[error("{code:?}: {message}")]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), cause: None }
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

/// Crate-wide error type.
///
/// `App` is the only variant carrying a deliberate, client-facing error
/// code; everything else is an infrastructure failure that collapses to
/// `INTERNAL_ERROR` / 500 at the response boundary unless a more specific
/// mapping applies (e.g. `Worker::SkipRetry`).
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    App(#[from] AppError),

    #[error("configuration error")]
    Config(#[source] Box<figment::Error>),

    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("http error")]
    Http(#[source] Box<axum::http::Error>),

    #[cfg(feature = "jwt")]
    #[error("jwt error")]
    Jwt(#[source] Box<jsonwebtoken::errors::Error>),

    #[cfg(feature = "redis")]
    #[error("redis error")]
    Redis(#[source] Box<redis::RedisError>),

    #[error(transparent)]
    Worker(#[from] crate::worker::error::WorkerError),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(e: figment::Error) -> Self {
        Error::Config(Box::new(e))
    }
}

impl From<axum::http::Error> for Error {
    fn from(e: axum::http::Error) -> Self {
        Error::Http(Box::new(e))
    }
}

#[cfg(feature = "jwt")]
impl From<jsonwebtoken::errors::Error> for Error {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        Error::Jwt(Box::new(e))
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::Redis(Box::new(e))
    }
}

impl Error {
    /// Collapse any error to its closed code, logging the unredacted
    /// cause server-side. This is the single place that decides what a
    /// client is allowed to see.
    fn to_app_error(&self) -> AppError {
        match self {
            Error::App(app) => {
                if let Some(cause) = &app.cause {
                    tracing::warn!(code = app.code.as_str(), cause = %cause, "request rejected with a wrapped cause");
                }
                AppError::new(app.code, app.message.clone())
            }
            Error::Worker(crate::worker::error::WorkerError::SkipRetry(msg)) => {
                AppError::new(ErrorCode::BadRequest, msg.clone())
            }
            other => {
                tracing::error!(error = %other, "unhandled error reached response boundary");
                AppError::new(ErrorCode::InternalError, "internal error")
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let app = self.to_app_error();
        Envelope::<()>::error(app.code, app.message).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        Envelope::<()>::error(self.code, self.message).into_response()
    }
}

//! Request-scoped context carriers (C2): authenticated `Claims` and the
//! current request's `RequestId`.
//!
//! Both are attached to the request via `axum`'s extension mechanism by
//! the corresponding middleware (`middleware::request_id`,
//! `middleware::auth`) and read back out by handlers via `Extension<T>`
//! or the task-local accessors below. The task-local is what lets
//! far-away code — the envelope constructors in particular — stamp a
//! `trace_id` onto a response without threading the request through
//! every call.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::RequestId;

tokio::task_local! {
    static CURRENT_REQUEST_ID: RequestId;
}

/// Run `f` with `id` available to [`current_request_id`] for the
/// duration of the future. Called once per request by the request-id
/// middleware, wrapping the rest of the middleware chain and the handler.
pub async fn scope_request_id<F, T>(id: RequestId, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    CURRENT_REQUEST_ID.scope(id, f).await
}

/// The request id of the in-flight request, if one has been scoped.
/// Outside of request handling (e.g. a background job) this is `None`.
pub fn current_request_id() -> Option<RequestId> {
    CURRENT_REQUEST_ID.try_with(|id| id.clone()).ok()
}

/// Authenticated identity attached to a request once an authenticator
/// middleware succeeds (§3 Claims, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the authenticated principal's stable identifier.
    pub sub: String,
    /// Token issuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Intended audiences.
    #[serde(default)]
    pub aud: Vec<String>,
    /// Expiration, Unix seconds.
    pub exp: i64,
    /// Issued-at, Unix seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Not-before, Unix seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    /// Coarse-grained roles, e.g. `"admin"`.
    #[serde(default)]
    pub roles: Vec<String>,
    /// Fine-grained permissions in `resource:action` form, e.g.
    /// `"invoices:read"`.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Free-form claim metadata not otherwise modeled (e.g. `jti`,
    /// tenant id). Not used for authorization decisions. Deserialized
    /// from arbitrary JSON, but non-string values are dropped on ingest
    /// (§4.4) rather than carried as an opaque `Value`.
    #[serde(default, deserialize_with = "deserialize_string_metadata")]
    pub metadata: HashMap<String, String>,
}

fn deserialize_string_metadata<'de, D>(deserializer: D) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: HashMap<String, Value> = Deserialize::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(s) => Some((key, s)),
            _ => None,
        })
        .collect())
}

impl Claims {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    pub fn has_any_permission(&self, permissions: &[&str]) -> bool {
        permissions.iter().any(|p| self.has_permission(p))
    }

    /// `exp` compared against `now` (seconds since epoch), so callers can
    /// use an injected clock rather than `SystemTime::now()` directly.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp <= now
    }
}

/// Axum extension wrapper so `Claims` and `RequestId` can be pulled out of
/// a request via `Extension<RequestContext>` in handlers that need both
/// together.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub claims: Option<Claims>,
    pub request_id: RequestId,
}

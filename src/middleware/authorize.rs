//! Role/permission checks (§4.2): run downstream of authentication, so
//! `Claims` is expected to already be present. A missing `Claims`
//! extension here means the route was wired without an authenticator —
//! a misconfiguration, not a caller-facing 401/403 (§4.2).

use axum::body::Body;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::context::Claims;
use crate::error::{AppError, ErrorCode};

fn claims_or_misconfiguration(request: &Request<Body>) -> Result<&Claims, Response> {
    request
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| AppError::new(ErrorCode::InternalError, "authorize middleware requires an authenticator upstream").into_response())
}

pub fn require_role(role: &'static str) -> impl Fn(Request<Body>, Next) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>> + Clone {
    move |request: Request<Body>, next: Next| {
        let role = role;
        Box::pin(async move {
            match claims_or_misconfiguration(&request) {
                Ok(claims) if claims.has_role(role) => next.run(request).await,
                Ok(_) => AppError::new(ErrorCode::Forbidden, format!("requires role '{role}'")).into_response(),
                Err(response) => response,
            }
        })
    }
}

pub fn require_permission(
    permission: &'static str,
) -> impl Fn(Request<Body>, Next) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>> + Clone {
    move |request: Request<Body>, next: Next| {
        let permission = permission;
        Box::pin(async move {
            match claims_or_misconfiguration(&request) {
                Ok(claims) if claims.has_permission(permission) => next.run(request).await,
                Ok(_) => AppError::new(ErrorCode::Forbidden, format!("requires permission '{permission}'")).into_response(),
                Err(response) => response,
            }
        })
    }
}

pub fn require_any_permission(
    permissions: &'static [&'static str],
) -> impl Fn(Request<Body>, Next) -> std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>> + Clone {
    move |request: Request<Body>, next: Next| {
        Box::pin(async move {
            match claims_or_misconfiguration(&request) {
                Ok(claims) if claims.has_any_permission(permissions) => next.run(request).await,
                Ok(_) => AppError::new(ErrorCode::Forbidden, "insufficient permissions").into_response(),
                Err(response) => response,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body as AxumBody;
    use axum::http::{Request as HttpRequest, StatusCode};
    use axum::routing::get;
    use axum::Extension;
    use axum::Router;
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn claims(roles: &[&str], permissions: &[&str]) -> Claims {
        Claims {
            sub: "user:1".into(),
            iss: None,
            aud: vec![],
            exp: i64::MAX,
            iat: None,
            nbf: None,
            roles: roles.iter().map(|s| s.to_string()).collect(),
            permissions: permissions.iter().map(|s| s.to_string()).collect(),
            metadata: HashMap::new(),
        }
    }

    async fn ok() -> &'static str {
        "ok"
    }

    #[tokio::test]
    async fn missing_claims_is_a_misconfiguration_not_a_403() {
        let app = Router::new().route("/", get(ok)).layer(axum::middleware::from_fn(require_role("admin")));
        let response = app.oneshot(HttpRequest::builder().uri("/").body(AxumBody::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn caller_with_required_role_is_allowed_through() {
        let app = Router::new()
            .route("/", get(ok))
            .layer(axum::middleware::from_fn(require_role("admin")))
            .layer(Extension(claims(&["admin"], &[])));
        let response = app.oneshot(HttpRequest::builder().uri("/").body(AxumBody::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn caller_without_required_role_is_forbidden() {
        let app = Router::new()
            .route("/", get(ok))
            .layer(axum::middleware::from_fn(require_role("admin")))
            .layer(Extension(claims(&["user"], &[])));
        let response = app.oneshot(HttpRequest::builder().uri("/").body(AxumBody::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}

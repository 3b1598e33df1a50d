//! Authenticators (§4.4): each produces the same [`crate::context::Claims`]
//! shape regardless of credential type, so downstream authorization code
//! never needs to know whether a caller presented a JWT, an API key, or
//! (with the `oidc` feature) an OIDC identity token.

pub mod api_key;
pub mod jwt;

#[cfg(feature = "oidc")]
pub mod oidc;

pub use api_key::{ApiKeyAuth, API_KEY_HEADER};
pub use jwt::JwtAuth;

#[cfg(feature = "oidc")]
pub use oidc::OidcAuth;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::context::Claims;
use crate::error::{AppError, Error, ErrorCode};

/// The single `Auth` step of the chain (§4.3 step 6): extracts whichever
/// credential the request carries — `Authorization: Bearer …` or the
/// configured API-key header — and delegates to the matching
/// authenticator. A request presenting neither is `401 UNAUTHORIZED`
/// without ever reaching an authenticator.
#[derive(Clone)]
pub struct AuthMiddleware {
    jwt: JwtAuth,
    api_key: ApiKeyAuth,
}

impl AuthMiddleware {
    pub fn new(jwt: JwtAuth, api_key: ApiKeyAuth) -> Self {
        Self { jwt, api_key }
    }

    pub fn authenticate(&self, headers: &axum::http::HeaderMap) -> Result<Claims, Error> {
        if headers.contains_key(axum::http::header::AUTHORIZATION) {
            let token = JwtAuth::extract_token(headers)?;
            return self.jwt.validate_token(&token);
        }
        if headers.contains_key(API_KEY_HEADER) {
            return self.api_key.authenticate(headers);
        }
        Err(AppError::new(ErrorCode::Unauthorized, "missing credentials").into())
    }

    pub async fn middleware(State(auth): State<Self>, mut request: Request<Body>, next: Next) -> Result<Response, Error> {
        let claims = auth.authenticate(request.headers())?;
        request.extensions_mut().insert(claims);
        Ok(next.run(request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiKeyPrincipal, ApiKeysConfig, JwtConfig};
    use axum::http::HeaderMap;
    use std::collections::HashMap;

    fn middleware() -> AuthMiddleware {
        let jwt = JwtAuth::new(&JwtConfig { secret: "a".repeat(32), issuer: None, audience: None, leeway_secs: 0 }).unwrap();
        let mut keys = HashMap::new();
        keys.insert("secret-key-1".to_string(), ApiKeyPrincipal { service_id: "billing".to_string(), roles: vec![], permissions: vec![] });
        AuthMiddleware::new(jwt, ApiKeyAuth::new(ApiKeysConfig { keys }))
    }

    #[test]
    fn missing_credentials_is_unauthorized() {
        let err = middleware().authenticate(&HeaderMap::new()).unwrap_err();
        match err {
            Error::App(app) => assert_eq!(app.code, ErrorCode::Unauthorized),
            other => panic!("expected AppError, got {other:?}"),
        }
    }

    #[test]
    fn api_key_header_is_tried_when_no_bearer_token_is_present() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, "secret-key-1".parse().unwrap());
        let claims = middleware().authenticate(&headers).unwrap();
        assert_eq!(claims.sub, "service:billing");
    }

    #[test]
    fn bearer_token_is_preferred_over_an_api_key_header() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Bearer not-a-real-jwt".parse().unwrap());
        headers.insert(API_KEY_HEADER, "secret-key-1".parse().unwrap());
        let err = middleware().authenticate(&headers).unwrap_err();
        match err {
            Error::App(app) => assert_eq!(app.code, ErrorCode::TokenInvalid),
            other => panic!("expected AppError, got {other:?}"),
        }
    }
}

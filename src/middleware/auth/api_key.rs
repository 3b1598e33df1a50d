//! API key authentication (§4.4): a static, configured key-to-principal
//! mapping. This crate's Non-goals exclude concrete key storage
//! backends, so keys are looked up from configuration rather than
//! generated, issued, or revoked here.

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::config::ApiKeysConfig;
use crate::context::Claims;
use crate::error::{AppError, Error, ErrorCode};

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct ApiKeyAuth {
    config: std::sync::Arc<ApiKeysConfig>,
}

impl ApiKeyAuth {
    pub fn new(config: ApiKeysConfig) -> Self {
        Self { config: std::sync::Arc::new(config) }
    }

    fn extract_key(headers: &HeaderMap) -> Result<&str, Error> {
        headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "missing x-api-key header").into())
    }

    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Claims, Error> {
        let key = Self::extract_key(headers)?;
        let principal = self
            .config
            .keys
            .get(key)
            .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "unknown api key"))?;

        Ok(Claims {
            sub: format!("service:{}", principal.service_id),
            iss: None,
            aud: vec![],
            exp: i64::MAX,
            iat: None,
            nbf: None,
            roles: principal.roles.clone(),
            permissions: principal.permissions.clone(),
            metadata: Default::default(),
        })
    }

    pub async fn middleware(
        State(auth): State<Self>,
        mut request: Request<Body>,
        next: Next,
    ) -> Result<Response, Error> {
        let claims = auth.authenticate(request.headers())?;
        request.extensions_mut().insert(claims);
        Ok(next.run(request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKeyPrincipal;
    use std::collections::HashMap;

    fn config_with_one_key() -> ApiKeysConfig {
        let mut keys = HashMap::new();
        keys.insert(
            "secret-key-1".to_string(),
            ApiKeyPrincipal {
                service_id: "billing".to_string(),
                roles: vec!["service".to_string()],
                permissions: vec!["invoices:write".to_string()],
            },
        );
        ApiKeysConfig { keys }
    }

    #[test]
    fn unknown_key_is_unauthorized() {
        let auth = ApiKeyAuth::new(config_with_one_key());
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, "not-a-real-key".parse().unwrap());
        assert!(auth.authenticate(&headers).is_err());
    }

    #[test]
    fn known_key_resolves_to_its_configured_principal() {
        let auth = ApiKeyAuth::new(config_with_one_key());
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, "secret-key-1".parse().unwrap());
        let claims = auth.authenticate(&headers).unwrap();
        assert_eq!(claims.sub, "service:billing");
        assert!(claims.has_permission("invoices:write"));
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let auth = ApiKeyAuth::new(config_with_one_key());
        assert!(auth.authenticate(&HeaderMap::new()).is_err());
    }
}

//! OIDC authenticator (§4.4, optional): validates bearer ID tokens issued
//! by an external identity provider against that provider's published
//! JWKS, producing the same [`Claims`] shape the JWT and API-key
//! authenticators produce. Off by default; enabled with the `oidc`
//! feature. Uses `openidconnect` for discovery and key material
//! even though only the identity-token-verification half is needed here,
//! not the full authorization-code login flow those crates also support.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::jwk::{AlgorithmParameters, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use openidconnect::{IssuerUrl, ClientId};
use serde::Deserialize;

use crate::context::Claims;
use crate::error::{AppError, Error, ErrorCode};
use crate::middleware::auth::jwt::JwtAuth;

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    jwks_uri: String,
}

#[derive(Clone)]
pub struct OidcAuth {
    issuer: IssuerUrl,
    audience: ClientId,
    keys: Arc<RwLock<HashMap<String, DecodingKey>>>,
    http: reqwest::Client,
}

impl OidcAuth {
    pub fn new(issuer: &str, audience: &str) -> Result<Self, Error> {
        let issuer = IssuerUrl::new(issuer.to_string()).map_err(|e| Error::Internal(format!("invalid OIDC issuer: {e}")))?;
        Ok(Self {
            issuer,
            audience: ClientId::new(audience.to_string()),
            keys: Arc::new(RwLock::new(HashMap::new())),
            http: reqwest::Client::builder().timeout(Duration::from_secs(5)).build().map_err(|e| Error::Internal(e.to_string()))?,
        })
    }

    /// Fetches the provider's discovery document and JWKS, populating the
    /// key cache. Call once at startup; a token whose `kid` is not in the
    /// cache is rejected rather than triggering a synchronous refetch on
    /// the request path.
    pub async fn refresh_keys(&self) -> Result<(), Error> {
        let discovery_url = format!("{}/.well-known/openid-configuration", self.issuer.as_str().trim_end_matches('/'));
        let discovery: DiscoveryDocument = self
            .http
            .get(&discovery_url)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("OIDC discovery fetch failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Internal(format!("OIDC discovery document malformed: {e}")))?;

        let jwks: JwkSet = self
            .http
            .get(&discovery.jwks_uri)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("JWKS fetch failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Internal(format!("JWKS malformed: {e}")))?;

        let mut decoded = HashMap::new();
        for jwk in &jwks.keys {
            let Some(kid) = &jwk.common.key_id else { continue };
            if let AlgorithmParameters::RSA(rsa) = &jwk.algorithm {
                if let Ok(key) = DecodingKey::from_rsa_components(&rsa.n, &rsa.e) {
                    decoded.insert(kid.clone(), key);
                }
            }
        }

        *self.keys.write().expect("oidc key cache lock poisoned") = decoded;
        Ok(())
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, Error> {
        let header = decode_header(token).map_err(|_| AppError::new(ErrorCode::TokenInvalid, "malformed token header"))?;
        let kid = header.kid.ok_or_else(|| AppError::new(ErrorCode::TokenInvalid, "token is missing a key id"))?;

        let key = {
            let keys = self.keys.read().expect("oidc key cache lock poisoned");
            keys.get(&kid).cloned()
        }
        .ok_or_else(|| AppError::new(ErrorCode::TokenInvalid, "unknown signing key"))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_issuer(&[self.issuer.as_str()]);

        let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => AppError::new(ErrorCode::TokenExpired, "token has expired"),
                _ => AppError::new(ErrorCode::TokenInvalid, "token is invalid"),
            }
        })?;
        Ok(token_data.claims)
    }

    pub async fn middleware(State(auth): State<Self>, mut request: Request<Body>, next: Next) -> Result<Response, Error> {
        let token = JwtAuth::extract_token(request.headers())?;
        let claims = auth.validate_token(&token)?;
        request.extensions_mut().insert(claims);
        Ok(next.run(request).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_key_id_is_token_invalid() {
        let auth = OidcAuth::new("https://issuer.example.com", "my-audience").unwrap();
        let header = jsonwebtoken::Header { kid: Some("nonexistent".to_string()), ..jsonwebtoken::Header::new(Algorithm::HS256) };
        let token = jsonwebtoken::encode(
            &header,
            &serde_json::json!({"sub": "user-1", "exp": 9_999_999_999i64}),
            &jsonwebtoken::EncodingKey::from_secret(b"test-secret-at-least-32-bytes!!"),
        )
        .unwrap();
        let err = auth.validate_token(&token).unwrap_err();
        match err {
            Error::App(app) => assert_eq!(app.code, ErrorCode::TokenInvalid),
            other => panic!("expected AppError, got {other:?}"),
        }
    }

    #[test]
    fn missing_key_id_is_token_invalid() {
        let auth = OidcAuth::new("https://issuer.example.com", "my-audience").unwrap();
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(Algorithm::HS256),
            &serde_json::json!({"sub": "user-1", "exp": 9_999_999_999i64}),
            &jsonwebtoken::EncodingKey::from_secret(b"test-secret-at-least-32-bytes!!"),
        )
        .unwrap();
        let err = auth.validate_token(&token).unwrap_err();
        match err {
            Error::App(app) => assert_eq!(app.code, ErrorCode::TokenInvalid),
            other => panic!("expected AppError, got {other:?}"),
        }
    }
}

//! JWT authentication middleware, narrowed to HS256 only (§4.4: accepting
//! whatever algorithm the configured key implies opens the door to
//! algorithm-confusion attacks, so this validates against a single
//! hardcoded `Algorithm` rather than deriving one from configuration).

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::clock::{system_clock, SharedClock};
use crate::config::JwtConfig;
use crate::context::Claims;
use crate::error::{AppError, Error, ErrorCode};

#[derive(Clone)]
pub struct JwtAuth {
    decoding_key: Arc<DecodingKey>,
    validation: Validation,
    leeway_secs: u64,
    clock: SharedClock,
}

impl JwtAuth {
    /// Builds an authenticator backed by the real wall clock. Use
    /// [`JwtAuth::with_clock`] to inject a [`FakeClock`](crate::clock::FakeClock)
    /// for tests that need to move time without sleeping.
    pub fn new(config: &JwtConfig) -> Result<Self, Error> {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: &JwtConfig, clock: SharedClock) -> Result<Self, Error> {
        config.validate()?;

        let mut validation = Validation::new(Algorithm::HS256);
        // `exp`/`nbf` are checked by hand against `clock` below (§4.4:
        // expiry decisions must take a clock parameter, never read the
        // wall clock directly), so jsonwebtoken's own time check is off.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.leeway = config.leeway_secs;
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }
        if let Some(audience) = &config.audience {
            validation.set_audience(&[audience]);
        }

        Ok(Self {
            decoding_key: Arc::new(DecodingKey::from_secret(config.secret.as_bytes())),
            validation,
            leeway_secs: config.leeway_secs,
            clock,
        })
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, Error> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => AppError::new(ErrorCode::TokenExpired, "token has expired").into(),
                _ => {
                    tracing::warn!(algorithm = ?Algorithm::HS256, error = %e, "jwt decode failed");
                    Error::from(AppError::new(ErrorCode::TokenInvalid, "token is invalid").with_cause(e))
                }
            }
        })?;

        let claims = token_data.claims;
        let now = self.clock.now_unix();
        let leeway = self.leeway_secs as i64;

        if claims.is_expired_at(now - leeway) {
            return Err(AppError::new(ErrorCode::TokenExpired, "token has expired").into());
        }
        if let Some(nbf) = claims.nbf {
            if nbf > now + leeway {
                return Err(AppError::new(ErrorCode::TokenInvalid, "token is not yet valid").into());
            }
        }

        Ok(claims)
    }

    pub fn extract_token(headers: &HeaderMap) -> Result<String, Error> {
        let auth_header = headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "missing Authorization header"))?;

        auth_header
            .strip_prefix("Bearer ")
            .map(str::to_string)
            .ok_or_else(|| AppError::new(ErrorCode::Unauthorized, "Authorization header must be a bearer token").into())
    }

    pub async fn middleware(
        State(auth): State<Self>,
        mut request: Request<Body>,
        next: Next,
    ) -> Result<Response, Error> {
        let token = Self::extract_token(request.headers())?;
        let claims = auth.validate_token(&token)?;
        request.extensions_mut().insert(claims);
        Ok(next.run(request).await)
    }
}

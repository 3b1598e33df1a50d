//! HTTP server: binds the listener, wraps `Router` in the fixed
//! middleware chain (§4.2), and drives graceful shutdown on SIGTERM/SIGINT
//! (§4.6). Layer order below is outermost-first; tower applies the last
//! `.layer()` call as the outermost wrapper, so the list reads top to
//! bottom in the same order requests pass through them.
//!
//! Rate limit and auth (§4.3 steps 5–6) are not layered here: they need
//! to run only around the versioned API surface, never around
//! `/healthz`/`/readyz`/`/metrics`, so [`crate::router::build_router`]
//! applies them around each `Routes` nest instead.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::error::Result;
use crate::middleware::body_limit::body_limit_layer;
use crate::middleware::logging::logging_middleware;
use crate::middleware::recovery::recovery_middleware;
use crate::middleware::request_id::{request_id_middleware, RequestIdConfig};
use crate::middleware::timeout::timeout_middleware;
use crate::observability::Metrics;

pub struct Server {
    config: Config,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Wraps `app` in the standard chain: Recovery (outermost) → CORS →
    /// Compression → Request-ID → Timeout → Body Limit → Logging
    /// (innermost, closest to the handler so it sees the matched route).
    pub fn build_app(&self, app: Router, metrics: Arc<Metrics>) -> Router {
        let timeout = self.config.service.timeout();
        let request_id_config = RequestIdConfig::from_header_name(
            &self.config.middleware.request_id_header,
            self.config.middleware.trust_proxy_headers,
        );

        let mut app = app.layer(axum::middleware::from_fn(move |req, next| logging_middleware(metrics.clone(), req, next)));

        app = app.layer(body_limit_layer(self.config.middleware.body_limit_mb));
        app = app.layer(axum::middleware::from_fn(move |req, next| timeout_middleware(timeout, req, next)));
        app = app.layer(axum::middleware::from_fn(move |req, next| request_id_middleware(request_id_config.clone(), req, next)));

        if self.config.middleware.compression {
            app = app.layer(CompressionLayer::new());
        }

        app = app.layer(self.cors_layer());
        app = app.layer(axum::middleware::from_fn(recovery_middleware));

        app
    }

    pub async fn serve(self, app: Router, metrics: Arc<Metrics>) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.service.port));
        let app = self.build_app(app, metrics);

        tracing::info!(name = %self.config.service.name, %addr, "starting server");
        let listener = TcpListener::bind(&addr).await?;

        let grace = self.config.service.shutdown_grace();
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal(grace))
            .await?;

        tracing::info!("server shutdown complete");
        Ok(())
    }

    fn cors_layer(&self) -> CorsLayer {
        match self.config.middleware.cors_mode.as_str() {
            "permissive" => CorsLayer::permissive(),
            "disabled" | "restrictive" => CorsLayer::new(),
            other => {
                tracing::warn!(cors_mode = other, "unknown CORS mode, defaulting to permissive");
                CorsLayer::permissive()
            }
        }
    }
}

/// Waits for SIGINT or SIGTERM, then gives in-flight work `grace` to
/// finish before `axum::serve`'s graceful shutdown forcibly closes
/// remaining connections (§4.6).
async fn shutdown_signal(grace: std::time::Duration) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate()).expect("failed to install SIGTERM handler").recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("received SIGTERM, starting graceful shutdown"),
    }

    tracing::info!(grace_secs = grace.as_secs(), "draining in-flight requests");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_exposes_its_config() {
        let config = Config::default();
        let server = Server::new(config.clone());
        assert_eq!(server.config().service.port, config.service.port);
    }
}

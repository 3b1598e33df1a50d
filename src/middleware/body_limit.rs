//! Request body size ceiling (§4.2). A thin wrapper around
//! `tower_http`'s body limit layer, wired straight off
//! `config.middleware.body_limit_mb`.

use tower_http::limit::RequestBodyLimitLayer;

pub fn body_limit_layer(max_mb: usize) -> RequestBodyLimitLayer {
    RequestBodyLimitLayer::new(max_mb * 1024 * 1024)
}

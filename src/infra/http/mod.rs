//! HTTP surface: management routes plus the proxy fallback.

mod admin;
mod middleware;
mod proxy;

use std::sync::Arc;

use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};

use crate::{
    cache::{CacheConfig, TagStore},
    infra::upstream::Upstream,
};

pub use middleware::RequestContext;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TagStore>,
    pub upstream: Arc<dyn Upstream>,
    pub config: CacheConfig,
}

impl AppState {
    pub fn new(store: Arc<TagStore>, upstream: Arc<dyn Upstream>, config: CacheConfig) -> Self {
        Self {
            store,
            upstream,
            config,
        }
    }
}

/// Build the router. Methods other than GET and DELETE on `/keys` are rejected
/// (HEAD included, which axum would otherwise route to GET); unknown methods on
/// `/clear` and `/size` are proxied like every unmatched path.
pub fn build_router(state: AppState) -> Router {
    let keys = || {
        get(admin::list_keys)
            .head(admin::method_not_allowed)
            .delete(admin::flush_keys)
            .fallback(admin::method_not_allowed)
    };

    Router::new()
        .route("/keys", keys())
        .route("/keys/", keys())
        .route(
            "/keys/{*tags}",
            get(admin::list_tagged)
                .head(admin::method_not_allowed)
                .delete(admin::flush_tagged)
                .fallback(admin::method_not_allowed),
        )
        .route("/clear", post(admin::clear).fallback(proxy::proxy))
        .route("/size", get(admin::size).fallback(proxy::proxy))
        .fallback(proxy::proxy)
        .layer(from_fn(middleware::log_responses))
        .layer(from_fn(middleware::set_request_context))
        .with_state(state)
}

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use super::handlers::{health_handler, proxy_handler};
use super::server::AppState;

/// Health probe path; every other path is proxied
pub const HEALTH_PATH: &str = "/healthz";

pub fn build_router(state: AppState) -> Router {
    let max_body_size = state.max_body_size;

    Router::new()
        .route(HEALTH_PATH, get(health_handler))
        .fallback(proxy_handler)
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

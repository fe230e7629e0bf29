//! HTTP route handlers and the router that ties them together.
//!
//! None of the endpoints authenticate; the gateway is expected to sit behind
//! a terminating proxy.

pub mod health;
pub mod log;
pub mod webssh;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health::health))
        .route("/api/v1/webssh", get(webssh::webssh_upgrade))
        .route("/api/log/level", get(log::get_level).put(log::set_level))
        .route("/api/log/debug", get(log::set_debug))
        .route("/api/log/info", get(log::set_info))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

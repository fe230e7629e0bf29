//! Runtime log-level control.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SetLevel {
    pub level: String,
}

/// `GET /api/log/level` — current level as `{"level": "..."}`.
pub async fn get_level(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "level": state.log_control.level() }))
}

/// `PUT /api/log/level` — body `{"level": "debug"}`.
pub async fn set_level(State(state): State<AppState>, Json(body): Json<SetLevel>) -> Response {
    apply(&state, &body.level)
}

/// `GET /api/log/debug`
pub async fn set_debug(State(state): State<AppState>) -> Response {
    apply(&state, "debug")
}

/// `GET /api/log/info`
pub async fn set_info(State(state): State<AppState>) -> Response {
    apply(&state, "info")
}

fn apply(state: &AppState, level: &str) -> Response {
    match state.log_control.set_level(level) {
        Ok(()) => {
            info!("log level set to {}", state.log_control.level());
            (StatusCode::OK, "OK").into_response()
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

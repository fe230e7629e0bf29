//! WebSocket entry point for terminal sessions.
//!
//! `GET /api/v1/webssh?deviceId=<id>&user=<user>&pwd=<password>&port=<port>[&host=<host>]`
//!
//! The query is validated before the upgrade. A bad or missing parameter gets
//! `400 Bad Request` and the tunnel engine is never invoked. After the upgrade
//! the parameters are registered and the socket is handed to the engine.

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::registry::ConnectionParams;
use crate::AppState;

/// Raw query parameters. Everything is optional here so that validation can
/// report which field is wrong.
#[derive(Debug, Default, Deserialize)]
pub struct WebsshQuery {
    #[serde(rename = "deviceId", alias = "sessionId")]
    pub device_id: Option<String>,
    pub user: Option<String>,
    pub pwd: Option<String>,
    pub port: Option<String>,
    pub host: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("missing required parameter: {0}")]
    Missing(&'static str),
    #[error("invalid port: {0:?}")]
    InvalidPort(String),
}

fn required(value: Option<String>, name: &'static str) -> Result<String, ParamError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(ParamError::Missing(name))
}

impl WebsshQuery {
    /// Validate into [`ConnectionParams`], using `default_host` when no host
    /// was given.
    pub fn into_params(self, default_host: &str) -> Result<ConnectionParams, ParamError> {
        let session_id = required(self.device_id, "deviceId")?;
        let user = required(self.user, "user")?;
        let credential = required(self.pwd, "pwd")?;
        let port_str = required(self.port, "port")?;
        let port = match port_str.trim().parse::<u16>() {
            Ok(p) if p > 0 => p,
            _ => return Err(ParamError::InvalidPort(port_str)),
        };
        let host = self
            .host
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| default_host.to_string());

        Ok(ConnectionParams {
            session_id,
            host,
            port,
            user,
            credential,
        })
    }
}

/// `GET /api/v1/webssh` — upgrade into a ws<->ssh tunnel.
pub async fn webssh_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WebsshQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let params = match query.into_params(&state.config.ssh.default_host) {
        Ok(params) => params,
        Err(e) => {
            warn!("rejecting webssh upgrade: {e}");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": e.to_string()})),
            )
                .into_response();
        }
    };

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    debug!(
        session_id = %params.session_id,
        addr = %params.addr(),
        ua = user_agent,
        "websocket accepted, building ws<->ssh tunnel"
    );

    let registry = state.registry.clone();
    let tunnel = state.tunnel();
    ws.on_upgrade(move |socket| async move {
        let registration = registry.put(params).await;
        tunnel.serve(socket, registration).await;
    })
}

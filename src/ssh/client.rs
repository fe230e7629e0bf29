//! SSH transport: client handler and password-authenticated dial.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, AuthResult};
use russh::Disconnect;
use tracing::debug;

use crate::config::SshConfig;
use crate::error::{Result, TunnelError};
use crate::registry::ConnectionParams;

/// russh callbacks for gateway-initiated connections.
///
/// Targets are supplied per session by the caller, so there is no known-hosts
/// store to check against and every host key is accepted.
pub struct GatewayClient {
    addr: String,
}

impl client::Handler for GatewayClient {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        debug!(
            addr = %self.addr,
            algorithm = server_public_key.algorithm().as_str(),
            "accepting server host key"
        );
        Ok(true)
    }
}

fn transport_config(config: &SshConfig) -> client::Config {
    client::Config {
        keepalive_interval: config.keepalive_interval(),
        keepalive_max: config.keepalive_max,
        ..Default::default()
    }
}

/// Connect to `params.host:params.port` and authenticate with the password
/// credential. The whole exchange is bounded by `config.connect_timeout()`.
pub async fn dial(
    params: &ConnectionParams,
    config: &SshConfig,
) -> Result<client::Handle<GatewayClient>> {
    let addr = params.addr();
    let dial_error = |message: String| TunnelError::Dial {
        addr: addr.clone(),
        message,
    };

    let connect = async {
        let handler = GatewayClient { addr: addr.clone() };
        let mut handle = client::connect(
            Arc::new(transport_config(config)),
            (params.host.as_str(), params.port),
            handler,
        )
        .await
        .map_err(|e| dial_error(e.to_string()))?;

        let auth = handle
            .authenticate_password(params.user.as_str(), params.credential.as_str())
            .await
            .map_err(|e| dial_error(e.to_string()))?;

        if !matches!(auth, AuthResult::Success) {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "authentication failed", "en")
                .await;
            return Err(dial_error(format!(
                "password authentication rejected for user {}",
                params.user
            )));
        }
        Ok(handle)
    };

    match tokio::time::timeout(config.connect_timeout(), connect).await {
        Ok(result) => result,
        Err(_) => Err(dial_error(format!(
            "timed out after {}s",
            config.connect_timeout().as_secs()
        ))),
    }
}

/// Await a request, bounded by `limit`, flattening both failure modes into
/// a message.
pub(super) async fn bounded<T, E: Display>(
    limit: Duration,
    request: impl std::future::Future<Output = std::result::Result<T, E>>,
) -> std::result::Result<T, String> {
    match tokio::time::timeout(limit, request).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {}s", limit.as_secs())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_config_keepalive() {
        let mut ssh = SshConfig::default();
        let cfg = transport_config(&ssh);
        assert_eq!(cfg.keepalive_interval, Some(Duration::from_secs(30)));
        assert_eq!(cfg.keepalive_max, 3);

        ssh.keepalive_interval_secs = 0;
        assert_eq!(transport_config(&ssh).keepalive_interval, None);
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: std::result::Result<(), String> = bounded(
            Duration::from_millis(10),
            std::future::pending::<std::result::Result<(), russh::Error>>(),
        )
        .await;
        assert!(result.unwrap_err().contains("timed out"));
    }

    #[tokio::test]
    async fn test_dial_refused_is_dial_error() {
        // Bind then drop to get a local port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut params = crate::registry::params("d1");
        params.host = "127.0.0.1".to_string();
        params.port = port;
        let mut ssh = SshConfig::default();
        ssh.connect_timeout_secs = 2;

        let err = dial(&params, &ssh).await.err().unwrap();
        assert!(matches!(err, TunnelError::Dial { .. }));
        assert!(err.to_string().contains(&format!("127.0.0.1:{port}")));
    }
}

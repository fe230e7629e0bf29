//! Tunnel engine: WebSocket in, remote shell out.
//!
//! [`Tunnel::run`] takes the two halves of an upgraded client socket and a
//! [`Registration`], establishes the remote shell, and bridges the streams
//! until either side disconnects. The registry entry is removed on every exit
//! path.
//!
//! - `output` — [`OutputAdapter`], shell output → binary frames
//! - `bridge` — [`StreamBridge`] and the output pump

pub mod bridge;
pub mod output;

use std::fmt::Display;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::{Sink, Stream, StreamExt};
use tracing::{debug, info, info_span, Instrument};

use crate::error::{Result, TunnelError};
use crate::registry::{Registration, Registry};
use crate::ssh::Establisher;

pub use bridge::{bridge_session, BridgeOutcome, BridgeState, CloseReason, StreamBridge};
pub use output::OutputAdapter;

/// Everything a connection needs from the process: where parameters live,
/// how to open shells, and keepalive policy.
#[derive(Clone)]
pub struct Tunnel {
    registry: Registry,
    establisher: Establisher,
    ping_interval: Option<Duration>,
}

impl Tunnel {
    pub fn new(registry: Registry, establisher: Establisher, ping_interval: Option<Duration>) -> Self {
        Self {
            registry,
            establisher,
            ping_interval,
        }
    }

    /// Drive an upgraded WebSocket for its whole life.
    pub async fn serve(self, socket: WebSocket, registration: Registration) {
        let conn_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("tunnel", session_id = %registration.session_id, conn_id = %conn_id);
        let (sink, stream) = socket.split();
        async move {
            // Establishment failures are logged by the establisher.
            if let Ok(outcome) = self.run(stream, sink, registration).await {
                debug!(state = %outcome.state, reason = ?outcome.reason, "tunnel finished");
            }
        }
        .instrument(span)
        .await;
    }

    /// Establish the remote shell for `registration` and bridge it to the
    /// client halves. Establishment errors are returned after the client
    /// socket has been closed; streaming errors end up in the outcome.
    pub async fn run<R, S>(
        &self,
        inbound: R,
        sink: S,
        registration: Registration,
    ) -> Result<BridgeOutcome>
    where
        R: Stream<Item = std::result::Result<Message, axum::Error>> + Unpin + Send,
        S: Sink<Message> + Unpin + Send + 'static,
        S::Error: Display,
    {
        let output = OutputAdapter::new(sink);
        let session_id = registration.session_id.clone();

        let established = match self
            .establisher
            .establish(&self.registry, &session_id)
            .await
        {
            Ok(established) => established,
            Err(e) => {
                self.registry.remove(&registration).await;
                output.close(Some(close_frame(&e))).await;
                return Err(e);
            }
        };
        info!(addr = established.session.addr(), "tunnel streaming");

        let outcome = bridge_session(
            session_id,
            inbound,
            output,
            established.session,
            established.output,
            Some(established.exit_tx),
            self.ping_interval,
        )
        .await;

        self.registry.remove(&registration).await;
        Ok(outcome)
    }
}

fn close_frame(err: &TunnelError) -> CloseFrame {
    CloseFrame {
        code: err.close_code(),
        reason: err.kind().into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::extract::ws::close_code;
    use futures::channel::mpsc;

    use crate::config::SshConfig;
    use crate::registry::params;
    use crate::ssh::fixture::{Refuse, SshFixture, GREETING};

    type Inbound = std::result::Result<Message, axum::Error>;

    fn tunnel(registry: &Registry) -> Tunnel {
        Tunnel::new(registry.clone(), Establisher::new(SshConfig::default()), None)
    }

    #[tokio::test]
    async fn test_unknown_session_closes_without_data() {
        let registry = Registry::new();
        let (_in_tx, in_rx) = mpsc::unbounded::<Inbound>();
        let (out_tx, mut out_rx) = mpsc::unbounded::<Message>();
        let registration = Registration {
            session_id: "never-registered".to_string(),
            generation: 0,
        };

        let err = tunnel(&registry)
            .run(in_rx, out_tx, registration)
            .await
            .unwrap_err();
        assert!(matches!(err, TunnelError::UnknownSession(_)));

        match out_rx.next().await {
            Some(Message::Close(Some(frame))) => {
                assert_eq!(frame.code, close_code::POLICY);
                assert_eq!(frame.reason.as_str(), "unknown_session");
            }
            other => panic!("expected close frame, got {other:?}"),
        }
        assert!(out_rx.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dial_failure_releases_registry_entry() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let registry = Registry::new();
        let mut p = params("d1");
        p.host = "127.0.0.1".to_string();
        p.port = port;
        let registration = registry.put(p).await;

        let (_in_tx, in_rx) = mpsc::unbounded::<Inbound>();
        let (out_tx, mut out_rx) = mpsc::unbounded::<Message>();
        let err = tunnel(&registry)
            .run(in_rx, out_tx, registration)
            .await
            .unwrap_err();

        assert!(matches!(err, TunnelError::Dial { .. }));
        assert!(registry.get("d1").await.is_none());
        match out_rx.next().await {
            Some(Message::Close(Some(frame))) => assert_eq!(frame.code, close_code::ERROR),
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ls_through_ssh_server() {
        let server = SshFixture::start(Refuse::Nothing).await;
        let observed = server.observed.clone();
        let registry = Registry::new();
        let registration = registry.put(server.params("d1")).await;

        let (in_tx, in_rx) = mpsc::unbounded::<Inbound>();
        let (out_tx, mut out_rx) = mpsc::unbounded::<Message>();
        let engine = tunnel(&registry);
        let task = tokio::spawn(async move { engine.run(in_rx, out_tx, registration).await });

        in_tx
            .unbounded_send(Ok(Message::Binary(Bytes::from_static(b"ls\n"))))
            .unwrap();

        let expected = [GREETING, &b"file1\n"[..], &b"file2\n"[..]].concat();
        let mut received = Vec::new();
        while received.len() < expected.len() {
            match tokio::time::timeout(Duration::from_secs(5), out_rx.next())
                .await
                .unwrap()
            {
                Some(Message::Binary(data)) => received.extend_from_slice(&data),
                other => panic!("expected binary frame, got {other:?}"),
            }
        }
        assert_eq!(received, expected);

        in_tx.unbounded_send(Ok(Message::Close(None))).unwrap();
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome.state, BridgeState::Closed);
        assert!(matches!(outcome.reason, CloseReason::ClientClosed));
        assert_eq!(outcome.frames_forwarded, 1);
        assert!(registry.is_empty().await);

        assert!(server.ended().await);
        assert_eq!(observed.input(), b"ls\n");
        assert_eq!(observed.channel_closes(), 1);
    }

    #[tokio::test]
    async fn test_refused_pty_closes_with_reason() {
        let server = SshFixture::start(Refuse::Pty).await;
        let registry = Registry::new();
        let registration = registry.put(server.params("d1")).await;

        let (_in_tx, in_rx) = mpsc::unbounded::<Inbound>();
        let (out_tx, mut out_rx) = mpsc::unbounded::<Message>();
        let err = tunnel(&registry)
            .run(in_rx, out_tx, registration)
            .await
            .unwrap_err();

        assert!(matches!(err, TunnelError::Pty { .. }));
        assert!(registry.is_empty().await);
        match out_rx.next().await {
            Some(Message::Close(Some(frame))) => {
                assert_eq!(frame.code, close_code::ERROR);
                assert_eq!(frame.reason.as_str(), "pty_error");
            }
            other => panic!("expected close frame, got {other:?}"),
        }
        assert!(out_rx.next().await.is_none());
    }
}

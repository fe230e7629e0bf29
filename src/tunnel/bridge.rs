//! Stream bridge between one client connection and one remote shell.
//!
//! The bridge drives the inbound direction: every client frame is written to
//! the shell's stdin, in order, one write per frame. The outbound direction is
//! a separate output pump that drains the shell and writes through the
//! [`OutputAdapter`]. Both share a [`CancellationToken`]; whichever side stops
//! first cancels it, and the bridge then tears down the socket and the session
//! exactly once.
//!
//! ```text
//! Established ──▶ Streaming ──▶ Closing ──▶ Closed
//! ```

use std::fmt::{self, Display};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{close_code, CloseFrame, Message};
use futures::{Sink, Stream, StreamExt};
use tokio::sync::oneshot;
use tokio::time::{Instant, Interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::output::OutputAdapter;
use crate::error::TunnelError;
use crate::ssh::{OutputSource, RemoteShell, ShellEvent, ShellExit};

/// Lifecycle of a bridged connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Established,
    Streaming,
    Closing,
    Closed,
}

impl BridgeState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Established => "established",
            Self::Streaming => "streaming",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why streaming stopped.
#[derive(Debug)]
pub enum CloseReason {
    /// The client sent a close frame or its stream ended.
    ClientClosed,
    /// The output pump stopped: shell gone or client unreachable for output.
    RemoteEnded,
    /// An inbound read, shell write or keepalive failed.
    Failed(TunnelError),
}

impl CloseReason {
    fn close_frame(&self) -> Option<CloseFrame> {
        match self {
            Self::ClientClosed => None,
            Self::RemoteEnded => Some(CloseFrame {
                code: close_code::NORMAL,
                reason: "session ended".into(),
            }),
            Self::Failed(err) => Some(CloseFrame {
                code: err.close_code(),
                reason: err.kind().into(),
            }),
        }
    }
}

/// Final report of a bridge run.
#[derive(Debug)]
pub struct BridgeOutcome {
    pub state: BridgeState,
    pub reason: CloseReason,
    /// Client frames written to the shell.
    pub frames_forwarded: u64,
    /// Output bytes delivered to the client.
    pub bytes_sent: u64,
}

/// Inbound pump for one connection.
pub struct StreamBridge<R, S, T> {
    session_id: String,
    inbound: R,
    output: OutputAdapter<S>,
    shell: Arc<T>,
    shutdown: CancellationToken,
    ping_interval: Option<Duration>,
    state: BridgeState,
}

impl<R, S, T> StreamBridge<R, S, T>
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
    T: RemoteShell,
{
    pub fn new(
        session_id: String,
        inbound: R,
        output: OutputAdapter<S>,
        shell: Arc<T>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            inbound,
            output,
            shell,
            shutdown,
            ping_interval: None,
            state: BridgeState::Established,
        }
    }

    /// Send a WebSocket ping every `interval`.
    #[must_use]
    pub fn with_ping_interval(mut self, interval: Option<Duration>) -> Self {
        self.ping_interval = interval;
        self
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    fn transition(&mut self, next: BridgeState) {
        debug!(session_id = %self.session_id, from = %self.state, to = %next, "bridge state");
        self.state = next;
    }

    /// Run until either side goes away, then close both ends.
    pub async fn run(mut self) -> BridgeOutcome {
        self.transition(BridgeState::Streaming);

        let mut ping = self
            .ping_interval
            .map(|every| tokio::time::interval_at(Instant::now() + every, every));
        let mut frames_forwarded = 0u64;

        let reason = loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break CloseReason::RemoteEnded,
                () = tick(&mut ping) => {
                    if let Err(e) = self.output.ping().await {
                        warn!(session_id = %self.session_id, "keepalive ping failed: {e}");
                        break CloseReason::Failed(e);
                    }
                }
                frame = self.inbound.next() => {
                    let payload = match frame {
                        None => {
                            info!(session_id = %self.session_id, "client disconnected");
                            break CloseReason::ClientClosed;
                        }
                        Some(Err(e)) => {
                            let err = TunnelError::InboundRead { message: e.to_string() };
                            warn!(session_id = %self.session_id, "read from client failed, closing: {err}");
                            break CloseReason::Failed(err);
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!(
                                session_id = %self.session_id,
                                code = frame.as_ref().map(|f| f.code),
                                "client closed connection"
                            );
                            break CloseReason::ClientClosed;
                        }
                        Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                        Some(Ok(Message::Binary(data))) => data,
                        Some(Ok(Message::Text(text))) => Bytes::copy_from_slice(text.as_str().as_bytes()),
                    };
                    debug!(session_id = %self.session_id, len = payload.len(), "client frame");
                    if let Err(e) = self.shell.write_input(&payload).await {
                        warn!(session_id = %self.session_id, "write to remote shell failed, closing: {e}");
                        break CloseReason::Failed(e);
                    }
                    frames_forwarded += 1;
                }
            }
        };

        self.transition(BridgeState::Closing);
        self.shutdown.cancel();
        self.output.close(reason.close_frame()).await;
        self.shell.close().await;
        self.transition(BridgeState::Closed);

        let bytes_sent = self.output.bytes_sent();
        info!(
            session_id = %self.session_id,
            frames_forwarded,
            bytes_sent,
            "connection closed, websocket and ssh session released"
        );

        BridgeOutcome {
            state: self.state,
            reason,
            frames_forwarded,
            bytes_sent,
        }
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Drain shell output into the client until the shell closes, the client
/// stops accepting frames, or `shutdown` fires. Cancels `shutdown` on exit so
/// the bridge notices.
pub async fn pump_output<O, S>(
    session_id: String,
    mut source: O,
    output: OutputAdapter<S>,
    shutdown: CancellationToken,
    mut exit_tx: Option<oneshot::Sender<ShellExit>>,
) where
    O: OutputSource,
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
{
    loop {
        let event = tokio::select! {
            () = shutdown.cancelled() => break,
            event = source.next_event() => event,
        };
        match event {
            Some(ShellEvent::Output(chunk)) => match output.write(chunk).await {
                Ok(len) => debug!(session_id = %session_id, len, "shell output"),
                Err(e) => {
                    if !shutdown.is_cancelled() {
                        error!(session_id = %session_id, "send to client failed: {e}");
                    }
                    break;
                }
            },
            Some(ShellEvent::Exited(exit)) => {
                if let Some(tx) = exit_tx.take() {
                    let _ = tx.send(exit);
                }
            }
            None => {
                debug!(session_id = %session_id, "shell output closed");
                break;
            }
        }
    }
    shutdown.cancel();
}

/// Bridge an established shell to a client connection: spawn the output pump,
/// run the inbound bridge, and wait for the pump before returning.
pub async fn bridge_session<R, S, T, O>(
    session_id: String,
    inbound: R,
    output: OutputAdapter<S>,
    shell: Arc<T>,
    source: O,
    exit_tx: Option<oneshot::Sender<ShellExit>>,
    ping_interval: Option<Duration>,
) -> BridgeOutcome
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display,
    T: RemoteShell,
    O: OutputSource,
{
    let shutdown = CancellationToken::new();
    let pump = tokio::spawn(pump_output(
        session_id.clone(),
        source,
        output.clone(),
        shutdown.clone(),
        exit_tx,
    ));

    let outcome = StreamBridge::new(session_id.clone(), inbound, output, shell, shutdown)
        .with_ping_interval(ping_interval)
        .run()
        .await;

    if let Err(e) = pump.await {
        error!(session_id = %session_id, "output pump task failed: {e}");
    }
    outcome
}

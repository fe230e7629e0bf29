//! Remote session establishment.
//!
//! [`Establisher::establish`] turns a registered session id into a live shell:
//! resolve parameters, dial and authenticate, open a session channel, request
//! a PTY, take the stdin handle, start the shell. Any failure releases what
//! the earlier steps acquired before the error is returned; nothing is retried.

pub mod client;
#[cfg(test)]
pub(crate) mod fixture;
pub mod geometry;
pub mod session;

use std::collections::VecDeque;
use std::sync::Arc;

use russh::client::{Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect, Pty};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::config::SshConfig;
use crate::error::{Result, TunnelError};
use crate::registry::Registry;

use self::client::{bounded, GatewayClient};
use self::geometry::TerminalSize;
pub use self::session::{
    ChannelOutput, OutputSource, RemoteSession, RemoteShell, ShellEvent, ShellExit,
};

/// Terminal modes sent with every PTY request: local echo on, 14.4 kbaud
/// speed hints, and the VSTATUS character enabled.
pub const TERMINAL_MODES: [(Pty, u32); 4] = [
    (Pty::ECHO, 1),
    (Pty::TTY_OP_ISPEED, 14400),
    (Pty::TTY_OP_OSPEED, 14400),
    (Pty::VSTATUS, 1),
];

/// A freshly started shell, ready to be bridged.
pub struct Established {
    pub session: Arc<RemoteSession>,
    pub output: ChannelOutput,
    /// Hand the shell's exit report to the background watcher.
    pub exit_tx: oneshot::Sender<ShellExit>,
}

/// Opens remote shells from registry entries.
#[derive(Clone)]
pub struct Establisher {
    config: Arc<SshConfig>,
}

impl Establisher {
    pub fn new(config: SshConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub async fn establish(&self, registry: &Registry, session_id: &str) -> Result<Established> {
        let params = registry
            .get(session_id)
            .await
            .ok_or_else(|| {
                warn!(session_id, "no connection parameters registered");
                TunnelError::UnknownSession(session_id.to_string())
            })?;
        let addr = params.addr();

        let handle = client::dial(&params, &self.config).await.inspect_err(|e| {
            error!(session_id, addr = %addr, "ssh connect failed: {e}");
        })?;
        debug!(session_id, addr = %addr, user = %params.user, "ssh authenticated");

        let step = self.config.step_timeout();

        let mut channel = match bounded(step, handle.channel_open_session()).await {
            Ok(channel) => channel,
            Err(message) => {
                let err = TunnelError::Session { message };
                error!(session_id, addr = %addr, "ssh session open failed: {err}");
                disconnect(&handle).await;
                return Err(err);
            }
        };

        let size = geometry::resolve(TerminalSize::new(
            self.config.default_cols,
            self.config.default_rows,
        ));

        let mut early = VecDeque::new();

        let pty = async {
            channel
                .request_pty(
                    true,
                    &self.config.term,
                    size.cols,
                    size.rows,
                    0,
                    0,
                    &TERMINAL_MODES,
                )
                .await
                .map_err(|e| e.to_string())?;
            await_reply(&mut channel, &mut early).await
        };
        if let Err(message) = bounded(step, pty).await {
            let err = TunnelError::Pty { message };
            error!(session_id, addr = %addr, "ssh pty request failed: {err}");
            abort(&handle, channel).await;
            return Err(err);
        }

        // russh has no separate stdin pipe to acquire: the write half of the
        // channel is the pipe, so this only checks the transport is still up.
        if handle.is_closed() {
            let err = TunnelError::Pipe {
                message: "transport closed before stdin was wired".to_string(),
            };
            error!(session_id, addr = %addr, "ssh stdin pipe failed: {err}");
            abort(&handle, channel).await;
            return Err(err);
        }

        let shell = async {
            channel
                .request_shell(true)
                .await
                .map_err(|e| e.to_string())?;
            await_reply(&mut channel, &mut early).await
        };
        if let Err(message) = bounded(step, shell).await {
            let err = TunnelError::ShellStart { message };
            error!(session_id, addr = %addr, "ssh shell start failed: {err}");
            abort(&handle, channel).await;
            return Err(err);
        }

        let (read, write) = channel.split();
        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(watch_exit(session_id.to_string(), addr.clone(), exit_rx));

        info!(
            session_id,
            addr = %addr,
            cols = size.cols,
            rows = size.rows,
            "remote shell started"
        );

        Ok(Established {
            session: Arc::new(RemoteSession::new(addr, handle, write)),
            output: ChannelOutput::new(read, early),
            exit_tx,
        })
    }
}

async fn disconnect(handle: &Handle<GatewayClient>) {
    let _ = handle
        .disconnect(Disconnect::ByApplication, "setup failed", "en")
        .await;
}

/// Wait for the server's answer to a `want_reply` channel request. Output
/// that shows up first is queued in `early` for the output pump.
async fn await_reply(
    channel: &mut Channel<Msg>,
    early: &mut VecDeque<ShellEvent>,
) -> std::result::Result<(), String> {
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => return Ok(()),
            Some(ChannelMsg::Failure) => return Err("refused by server".to_string()),
            Some(ChannelMsg::Close) | None => {
                return Err("channel closed before reply".to_string());
            }
            Some(msg) => early.extend(session::shell_event(msg)),
        }
    }
}

async fn abort(handle: &Handle<GatewayClient>, channel: Channel<Msg>) {
    let _ = channel.close().await;
    disconnect(handle).await;
}

/// Log how the shell ended. Purely observational: the bridge notices the end
/// of the session on its own.
async fn watch_exit(session_id: String, addr: String, exit_rx: oneshot::Receiver<ShellExit>) {
    match exit_rx.await {
        Ok(ShellExit::Status(0)) => {
            info!(session_id, addr = %addr, "remote shell exited");
        }
        Ok(ShellExit::Status(code)) => {
            error!(session_id, addr = %addr, exit_code = code, "remote shell exited with failure");
        }
        Ok(ShellExit::Signal { name, message }) => {
            error!(session_id, addr = %addr, signal = %name, "remote shell killed: {message}");
        }
        // Routine when the client hangs up before the shell exits.
        Err(_) => {
            debug!(session_id, addr = %addr, "ssh session ended without exit status");
        }
    }
}

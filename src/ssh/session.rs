//! A live remote shell and the seams the tunnel uses to drive it.
//!
//! The shell channel is split in two: the write half stays inside
//! [`RemoteSession`] (shared by the bridge and the output pump), the read half
//! becomes a [`ChannelOutput`] owned by the output pump alone.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::body::Bytes;
use russh::client::{self, Msg};
use russh::{ChannelMsg, ChannelReadHalf, ChannelWriteHalf, Disconnect};
use tracing::debug;

use super::client::GatewayClient;
use crate::error::{Result, TunnelError};

/// Input side of a remote shell, as seen by the stream bridge.
pub trait RemoteShell: Send + Sync + 'static {
    /// Write one frame's payload to the shell's stdin.
    fn write_input(&self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Close the shell channel and its transport. Safe to call repeatedly and
    /// from several tasks; only the first call does any work.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Something that happened on the shell's output side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    /// One chunk of terminal output, exactly as read from the channel.
    Output(Bytes),
    /// The remote reported how the shell ended.
    Exited(ShellExit),
}

/// How a remote shell terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellExit {
    Status(u32),
    Signal { name: String, message: String },
}

/// Output side of a remote shell, drained by the output pump.
pub trait OutputSource: Send + 'static {
    /// Next event, or `None` once the channel is closed.
    fn next_event(&mut self) -> impl Future<Output = Option<ShellEvent>> + Send;
}

/// An authenticated SSH transport with one interactive shell channel.
pub struct RemoteSession {
    addr: String,
    handle: client::Handle<GatewayClient>,
    input: ChannelWriteHalf<Msg>,
    closed: AtomicBool,
}

impl RemoteSession {
    pub(super) fn new(
        addr: String,
        handle: client::Handle<GatewayClient>,
        input: ChannelWriteHalf<Msg>,
    ) -> Self {
        Self {
            addr,
            handle,
            input,
            closed: AtomicBool::new(false),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl RemoteShell for RemoteSession {
    async fn write_input(&self, data: &[u8]) -> Result<()> {
        self.input
            .data(data)
            .await
            .map_err(|e| TunnelError::InboundWrite {
                message: e.to_string(),
            })
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.input.close().await {
            debug!(addr = %self.addr, "shell channel already closed: {e}");
        }
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "session closed", "en")
            .await
        {
            debug!(addr = %self.addr, "ssh transport already closed: {e}");
        }
    }
}

/// Read half of the shell channel.
pub struct ChannelOutput {
    read: ChannelReadHalf,
    pending: VecDeque<ShellEvent>,
}

impl ChannelOutput {
    /// `pending` holds output that arrived while establishment was still
    /// waiting on request replies; it is replayed before anything else.
    pub(super) fn new(read: ChannelReadHalf, pending: VecDeque<ShellEvent>) -> Self {
        Self { read, pending }
    }
}

impl OutputSource for ChannelOutput {
    async fn next_event(&mut self) -> Option<ShellEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        loop {
            match self.read.wait().await? {
                ChannelMsg::Close => return None,
                msg => {
                    if let Some(event) = shell_event(msg) {
                        return Some(event);
                    }
                }
            }
        }
    }
}

/// Translate a channel message into a shell event. Control messages
/// (window adjustments, EOF, request replies) yield `None`.
pub(super) fn shell_event(msg: ChannelMsg) -> Option<ShellEvent> {
    match msg {
        // With a PTY the remote merges stderr into the terminal stream,
        // extended data is forwarded the same way if it shows up anyway.
        ChannelMsg::Data { data } | ChannelMsg::ExtendedData { data, .. } => {
            Some(ShellEvent::Output(Bytes::copy_from_slice(&data)))
        }
        ChannelMsg::ExitStatus { exit_status } => {
            Some(ShellEvent::Exited(ShellExit::Status(exit_status)))
        }
        ChannelMsg::ExitSignal {
            signal_name,
            error_message,
            ..
        } => Some(ShellEvent::Exited(ShellExit::Signal {
            name: format!("{signal_name:?}"),
            message: error_message,
        })),
        _ => None,
    }
}

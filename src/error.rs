//! Error taxonomy for the tunnel engine.
//!
//! Establishment errors abort the attempt and close the client socket.
//! Streaming errors end an already-bridged connection; they are logged by the
//! bridge and never handed back to a caller.

use axum::extract::ws::close_code;
use thiserror::Error;

/// Everything that can end a tunnel.
#[derive(Debug, Error)]
pub enum TunnelError {
    /// No registry entry for the session id.
    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// TCP connect, SSH handshake or password authentication failed.
    #[error("dial {addr} failed: {message}")]
    Dial { addr: String, message: String },

    /// The session channel could not be opened on the transport.
    #[error("session channel open failed: {message}")]
    Session { message: String },

    /// The remote side refused the pseudo-terminal request.
    #[error("pty request failed: {message}")]
    Pty { message: String },

    /// No write handle to the shell's stdin could be obtained.
    #[error("stdin pipe unavailable: {message}")]
    Pipe { message: String },

    /// The remote side refused to start an interactive shell.
    #[error("shell start failed: {message}")]
    ShellStart { message: String },

    /// Reading the next frame from the client socket failed.
    #[error("inbound read failed: {message}")]
    InboundRead { message: String },

    /// Writing a frame payload into the shell's stdin failed.
    #[error("write to remote shell failed: {message}")]
    InboundWrite { message: String },

    /// Sending an output frame to the client failed.
    #[error("outbound send failed: {message}")]
    OutboundSend { message: String },
}

impl TunnelError {
    /// WebSocket close code reported to the client when this error ends the tunnel.
    pub fn close_code(&self) -> u16 {
        match self {
            Self::UnknownSession(_) => close_code::POLICY,
            Self::InboundRead { .. } => close_code::PROTOCOL,
            _ => close_code::ERROR,
        }
    }

    /// Short machine-readable label, used as the close frame reason.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownSession(_) => "unknown_session",
            Self::Dial { .. } => "dial_error",
            Self::Session { .. } => "session_error",
            Self::Pty { .. } => "pty_error",
            Self::Pipe { .. } => "pipe_error",
            Self::ShellStart { .. } => "shell_start_error",
            Self::InboundRead { .. } => "inbound_read_error",
            Self::InboundWrite { .. } => "inbound_write_error",
            Self::OutboundSend { .. } => "outbound_send_error",
        }
    }
}

/// Result alias used across the engine.
pub type Result<T> = std::result::Result<T, TunnelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_codes() {
        assert_eq!(
            TunnelError::UnknownSession("x".into()).close_code(),
            close_code::POLICY
        );
        assert_eq!(
            TunnelError::Pty {
                message: "denied".into()
            }
            .close_code(),
            close_code::ERROR
        );
    }

    #[test]
    fn test_display_includes_addr() {
        let err = TunnelError::Dial {
            addr: "10.0.0.5:22".into(),
            message: "authentication rejected".into(),
        };
        assert_eq!(
            err.to_string(),
            "dial 10.0.0.5:22 failed: authentication rejected"
        );
        assert_eq!(err.kind(), "dial_error");
    }
}

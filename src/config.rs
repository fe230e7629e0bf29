//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables** — `WEBSSH_LISTEN`, `WEBSSH_DEFAULT_HOST`,
//!    `WEBSSH_LOG_LEVEL`
//! 2. **Config file** — path via `--config <path>`, or `webssh.toml` in CWD
//! 3. **Compiled defaults** — see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//!
//! [ssh]
//! default_host = "127.0.0.1"     # used when the client omits `host`
//! connect_timeout_secs = 10      # dial + handshake + auth
//! step_timeout_secs = 10         # channel open, pty, shell
//! term = "xterm"
//! default_cols = 80
//! default_rows = 30
//! keepalive_interval_secs = 30   # 0 disables
//! keepalive_max = 3
//!
//! [tunnel]
//! ping_interval_secs = 0         # WebSocket pings, 0 disables
//!
//! [logging]
//! level = "info"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub tunnel: TunnelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:8080`).
    #[serde(default = "default_listen")]
    pub listen: String,
}

/// Remote session settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SshConfig {
    /// Target host when the client does not supply one (default `127.0.0.1`).
    /// Reflects the colocated "local agent" deployment.
    #[serde(default = "default_host")]
    pub default_host: String,
    /// Bound on TCP connect, SSH handshake and authentication (default 10).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Bound on each of channel open, PTY request and shell start (default 10).
    #[serde(default = "default_step_timeout")]
    pub step_timeout_secs: u64,
    /// Terminal type sent with the PTY request (default `xterm`).
    #[serde(default = "default_term")]
    pub term: String,
    /// Columns used when no local terminal can be queried (default 80).
    #[serde(default = "default_cols")]
    pub default_cols: u32,
    /// Rows used when no local terminal can be queried (default 30).
    #[serde(default = "default_rows")]
    pub default_rows: u32,
    /// Seconds between SSH keepalive requests; 0 disables (default 30).
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_secs: u64,
    /// Unanswered keepalives before the transport is dropped (default 3).
    #[serde(default = "default_keepalive_max")]
    pub keepalive_max: usize,
}

/// Stream bridge settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TunnelConfig {
    /// Seconds between WebSocket pings to the client; 0 disables (default 0).
    #[serde(default)]
    pub ping_interval_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Initial tracing filter (default `info`). Overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Failure to read or parse a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_step_timeout() -> u64 {
    10
}
fn default_term() -> String {
    "xterm".to_string()
}
fn default_cols() -> u32 {
    80
}
fn default_rows() -> u32 {
    30
}
fn default_keepalive_interval() -> u64 {
    30
}
fn default_keepalive_max() -> usize {
    3
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            default_host: default_host(),
            connect_timeout_secs: default_connect_timeout(),
            step_timeout_secs: default_step_timeout(),
            term: default_term(),
            default_cols: default_cols(),
            default_rows: default_rows(),
            keepalive_interval_secs: default_keepalive_interval(),
            keepalive_max: default_keepalive_max(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl SshConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn keepalive_interval(&self) -> Option<Duration> {
        (self.keepalive_interval_secs > 0).then(|| Duration::from_secs(self.keepalive_interval_secs))
    }
}

impl TunnelConfig {
    pub fn ping_interval(&self) -> Option<Duration> {
        (self.ping_interval_secs > 0).then(|| Duration::from_secs(self.ping_interval_secs))
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, that file must exist. Otherwise `webssh.toml` in
    /// the current directory is used when present.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new("webssh.toml").exists() => Self::from_file("webssh.toml")?,
            None => Config::default(),
        };

        if let Ok(listen) = std::env::var("WEBSSH_LISTEN") {
            config.server.listen = listen;
        }
        if let Ok(host) = std::env::var("WEBSSH_DEFAULT_HOST") {
            config.ssh.default_host = host;
        }
        if let Ok(level) = std::env::var("WEBSSH_LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::parse(path, &content)
    }

    fn parse(path: &str, content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }
}

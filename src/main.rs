#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # webssh-gateway
//!
//! Browser terminal gateway: a client opens a WebSocket, names an SSH target
//! and credentials, and gets a live interactive shell on that target.
//!
//! ## API surface
//!
//! | Method | Path              | Description                                 |
//! |--------|-------------------|---------------------------------------------|
//! | GET    | `/api/health`     | Liveness check                              |
//! | GET    | `/api/v1/webssh`  | WebSocket upgrade into a ws<->ssh tunnel    |
//! | GET    | `/api/log/level`  | Current log level                           |
//! | PUT    | `/api/log/level`  | Set log level (`{"level": "debug"}`)        |
//! | GET    | `/api/log/debug`  | Set log level to debug                      |
//! | GET    | `/api/log/info`   | Set log level to info                       |
//!
//! `/api/v1/webssh` takes `deviceId`, `user`, `pwd`, `port` and an optional
//! `host` (defaults to `ssh.default_host`). Keystrokes go in as WebSocket
//! frames; terminal output comes back as binary frames.
//!
//! ## Architecture
//!
//! ```text
//! main.rs          — entry point, clap subcommands, graceful shutdown
//! config.rs        — TOML + env-var configuration
//! logging.rs       — tracing subscriber with reloadable filter
//! registry.rs      — session id → connection parameters
//! routes/
//!   webssh.rs      — query validation, upgrade, hand-off to the tunnel
//!   log.rs         — log-level endpoints
//!   health.rs      — GET /api/health
//! ssh/
//!   mod.rs         — Establisher: dial, channel, PTY, stdin, shell
//!   client.rs      — russh handler and password dial
//!   session.rs     — RemoteSession, channel output
//!   geometry.rs    — local terminal size with fallback
//! tunnel/
//!   mod.rs         — Tunnel engine entry point
//!   output.rs      — OutputAdapter (shell output → binary frames)
//!   bridge.rs      — StreamBridge and output pump
//! ```

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info};

use webssh_gateway::{routes, AppState, Config, LogControl};

/// WebSocket to SSH gateway.
#[derive(Parser)]
#[command(name = "webssh-gateway", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to TOML config file.
    #[arg(long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP/WS server (default when no subcommand given).
    Serve,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Serve) | None => run_server(cli.config.as_deref()).await,
    }
}

async fn run_server(config_path: Option<&str>) {
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("webssh-gateway: {e}");
            std::process::exit(2);
        }
    };

    let log_control = LogControl::install(&config.logging.level);

    info!("webssh-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}", config.server.listen);
    info!("Default ssh host: {}", config.ssh.default_host);

    let listen = config.server.listen.clone();
    let state = AppState::new(config, log_control);
    let app = routes::router(state);

    let listener = match TcpListener::bind(&listen).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {listen}: {e}");
            std::process::exit(1);
        }
    };

    info!("Server ready");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {e}");
        std::process::exit(1);
    }

    info!("Goodbye");
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                error!("Failed to register SIGTERM: {e}");
                ctrl_c.await.ok();
                info!("Received SIGINT");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received SIGINT");
    }
}

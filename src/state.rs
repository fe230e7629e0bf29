//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::logging::LogControl;
use crate::registry::Registry;
use crate::ssh::Establisher;
use crate::tunnel::Tunnel;

/// Shared application state for the gateway.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Monotonic instant when the server started (for uptime calculation).
    pub start_time: Instant,
    /// Session id → connection parameters for tunnels being set up or running.
    pub registry: Registry,
    /// Opens remote shells with the configured SSH settings.
    pub establisher: Establisher,
    /// Runtime log level.
    pub log_control: LogControl,
}

impl AppState {
    pub fn new(config: Config, log_control: LogControl) -> Self {
        let establisher = Establisher::new(config.ssh.clone());
        Self {
            config: Arc::new(config),
            start_time: Instant::now(),
            registry: Registry::new(),
            establisher,
            log_control,
        }
    }

    /// A tunnel engine bound to this process's registry and settings.
    pub fn tunnel(&self) -> Tunnel {
        Tunnel::new(
            self.registry.clone(),
            self.establisher.clone(),
            self.config.tunnel.ping_interval(),
        )
    }
}

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::unused_async)]

//! webssh-gateway library — the tunnel engine and its HTTP surface.
//!
//! - `registry` — session id → connection parameters
//! - `ssh` — remote session establishment (dial, PTY, shell)
//! - `tunnel` — output adapter, stream bridge, engine entry point
//! - `routes` — WebSocket upgrade, health, log-level endpoints
//! - `config` — configuration loading
//! - `logging` — tracing setup with a reloadable level

pub mod config;
pub mod error;
pub mod logging;
pub mod registry;
pub mod routes;
pub mod ssh;
pub mod state;
pub mod tunnel;

// Re-export key types at crate root for convenience.
pub use config::Config;
pub use error::TunnelError;
pub use logging::LogControl;
pub use registry::{ConnectionParams, Registry};
pub use state::AppState;
pub use tunnel::Tunnel;

//! Tracing setup with a runtime-adjustable level.
//!
//! The global subscriber's [`EnvFilter`] sits behind a `reload` layer so the
//! `/api/log/*` endpoints can change verbosity without a restart.

use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

/// Levels accepted by [`LogControl::set_level`].
pub const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Error)]
pub enum LogLevelError {
    #[error("unknown log level {0:?} (expected one of trace, debug, info, warn, error)")]
    Unknown(String),
    #[error("failed to reload log filter: {0}")]
    Reload(String),
}

/// Handle to the process-wide log level.
#[derive(Clone)]
pub struct LogControl {
    current: Arc<RwLock<String>>,
    handle: Option<reload::Handle<EnvFilter, Registry>>,
}

impl LogControl {
    /// A control that tracks the level without a subscriber attached.
    pub fn detached(level: &str) -> Self {
        Self {
            current: Arc::new(RwLock::new(level.to_string())),
            handle: None,
        }
    }

    /// Install the global subscriber. `RUST_LOG` wins over `level` for the
    /// initial filter.
    pub fn install(level: &str) -> Self {
        let initial = std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string());
        let filter = EnvFilter::try_new(&initial).unwrap_or_else(|_| EnvFilter::new("info"));
        let (layer, handle) = reload::Layer::new(filter);
        tracing_subscriber::registry()
            .with(layer)
            .with(fmt::layer())
            .init();
        Self {
            current: Arc::new(RwLock::new(initial)),
            handle: Some(handle),
        }
    }

    pub fn level(&self) -> String {
        self.current
            .read()
            .map_or_else(|e| e.into_inner().clone(), |l| l.clone())
    }

    pub fn set_level(&self, level: &str) -> Result<(), LogLevelError> {
        let level = level.trim().to_ascii_lowercase();
        if !LEVELS.contains(&level.as_str()) {
            return Err(LogLevelError::Unknown(level));
        }
        if let Some(ref handle) = self.handle {
            handle
                .reload(EnvFilter::new(&level))
                .map_err(|e| LogLevelError::Reload(e.to_string()))?;
        }
        match self.current.write() {
            Ok(mut current) => *current = level,
            Err(e) => *e.into_inner() = level,
        }
        Ok(())
    }
}

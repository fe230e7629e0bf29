//! In-memory connection registry.
//!
//! Maps a session id to the parameters needed to reach a target host. The
//! upgrade handler writes an entry right before it hands the socket to the
//! tunnel engine; the engine reads it once during establishment and removes it
//! on teardown. A production deployment would back [`Registry::get`] with an
//! external credential store.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

/// Everything needed to open a shell on a target host.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub session_id: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub credential: String,
}

impl ConnectionParams {
    /// `host:port`, with IPv6 literals bracketed.
    pub fn addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("session_id", &self.session_id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// Proof of a `put`, needed to remove that exact entry later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub session_id: String,
    pub generation: u64,
}

struct Entry {
    generation: u64,
    params: ConnectionParams,
}

/// Shared session id → [`ConnectionParams`] table.
#[derive(Clone, Default)]
pub struct Registry {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    next_generation: Arc<AtomicU64>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for `params.session_id`. Last writer wins.
    pub async fn put(&self, params: ConnectionParams) -> Registration {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let session_id = params.session_id.clone();
        self.entries
            .write()
            .await
            .insert(session_id.clone(), Entry { generation, params });
        Registration {
            session_id,
            generation,
        }
    }

    pub async fn get(&self, session_id: &str) -> Option<ConnectionParams> {
        self.entries
            .read()
            .await
            .get(session_id)
            .map(|e| e.params.clone())
    }

    /// Remove the entry created by `registration`.
    ///
    /// A newer `put` for the same session id is left alone, so a tunnel that
    /// tears down late never evicts its successor.
    pub async fn remove(&self, registration: &Registration) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(&registration.session_id) {
            Some(e) if e.generation == registration.generation => {
                entries.remove(&registration.session_id);
                true
            }
            _ => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn params(session_id: &str) -> ConnectionParams {
    ConnectionParams {
        session_id: session_id.to_string(),
        host: "10.0.0.5".to_string(),
        port: 22,
        user: "alice".to_string(),
        credential: "secret".to_string(),
    }
}

//! Client-facing sink for remote shell output.
//!
//! Each write becomes exactly one binary WebSocket frame. The adapter is shared
//! between the output pump (writes) and the stream bridge (pings and the final
//! close), so the sink sits behind a mutex and closing is guarded by a flag.

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message};
use futures::{Sink, SinkExt};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Result, TunnelError};

/// Writes shell output into the client connection as binary frames.
pub struct OutputAdapter<S> {
    sink: Arc<Mutex<S>>,
    closed: Arc<AtomicBool>,
    bytes_sent: Arc<AtomicU64>,
}

impl<S> Clone for OutputAdapter<S> {
    fn clone(&self) -> Self {
        Self {
            sink: self.sink.clone(),
            closed: self.closed.clone(),
            bytes_sent: self.bytes_sent.clone(),
        }
    }
}

impl<S> OutputAdapter<S>
where
    S: Sink<Message> + Unpin + Send,
    S::Error: Display,
{
    pub fn new(sink: S) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
            closed: Arc::new(AtomicBool::new(false)),
            bytes_sent: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Send `chunk` as one binary frame.
    ///
    /// Returns the number of bytes accepted, which is always `chunk.len()` on
    /// success. A failed send accepts nothing and yields `OutboundSend`; the
    /// caller must treat that as the end of the connection.
    pub async fn write(&self, chunk: Bytes) -> Result<usize> {
        let len = chunk.len();
        self.send(Message::Binary(chunk)).await?;
        self.bytes_sent.fetch_add(len as u64, Ordering::Relaxed);
        Ok(len)
    }

    /// Keepalive ping to the client.
    pub async fn ping(&self) -> Result<()> {
        self.send(Message::Ping(Bytes::new())).await
    }

    async fn send(&self, message: Message) -> Result<()> {
        if self.is_closed() {
            return Err(TunnelError::OutboundSend {
                message: "client connection closed".to_string(),
            });
        }
        let mut sink = self.sink.lock().await;
        sink.send(message)
            .await
            .map_err(|e| TunnelError::OutboundSend {
                message: e.to_string(),
            })
    }

    /// Send a close frame and close the sink. Only the first call does
    /// anything; returns whether this call was it.
    pub async fn close(&self, frame: Option<CloseFrame>) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(Message::Close(frame)).await {
            debug!("close frame not delivered: {e}");
        }
        if let Err(e) = sink.close().await {
            debug!("client sink close failed: {e}");
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Total payload bytes delivered to the client so far.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

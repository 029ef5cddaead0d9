//! Write-side connection handle.
//!
//! A connection's reader stays inside its task loop; the write half lives
//! behind this cloneable handle so a dispatched protocol handler and the
//! timeout path can race safely. Whichever side takes the writer first wins:
//! a handler whose lookup resolves after the idle timeout destroyed the
//! socket observes `is_open() == false` and drops its response instead of
//! writing into a dead connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Cloneable handle to the write side of one connection.
#[derive(Clone)]
pub struct SocketHandle {
    peer: SocketAddr,
    writer: Arc<Mutex<Option<BoxedWriter>>>,
}

impl SocketHandle {
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static, peer: SocketAddr) -> Self {
        Self {
            peer,
            writer: Arc::new(Mutex::new(Some(Box::new(writer)))),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Whether the write side is still available.
    ///
    /// Advisory only: the authoritative check is the atomic take inside
    /// [`SocketHandle::send_and_close`].
    pub async fn is_open(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Write one response and close the connection.
    ///
    /// Returns `Ok(false)` when the socket was already ended or destroyed.
    /// The liveness check and the write happen under one lock, so a timeout
    /// firing concurrently can never interleave between them.
    ///
    /// # Errors
    /// I/O failures writing or shutting down the stream.
    pub async fn send_and_close(&self, bytes: &[u8]) -> Result<bool> {
        let mut guard = self.writer.lock().await;
        let Some(mut writer) = guard.take() else {
            debug!(peer = %self.peer, "socket closed before the response could be written");
            return Ok(false);
        };
        drop(guard);

        writer.write_all(bytes).await?;
        writer.shutdown().await?;
        Ok(true)
    }

    /// Gracefully end the connection without a response.
    pub async fn end(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
    }

    /// Tear the connection down immediately. Idempotent.
    pub async fn destroy(&self) {
        self.writer.lock().await.take();
    }
}

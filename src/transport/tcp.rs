//! TCP listener and per-connection read loop.
//!
//! Each accepted connection gets its own task. The task owns the read half
//! of the stream and drives the session state machine; the write half sits
//! behind a [`SocketHandle`] shared with whichever protocol handler the
//! session eventually dispatches. The idle timeout applies to every read:
//! a connection that has not produced a complete frame in time is destroyed
//! even if a device lookup is still in flight.

use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::protocol::registry::ProtocolRegistry;
use crate::protocol::session::{EndOutcome, Session, SessionEvent};
use crate::protocol::Protocol;
use crate::transport::socket::SocketHandle;
use crate::utils::metrics::Metrics;

/// The Pipsqueak TCP server.
pub struct Server {
    registry: Arc<ProtocolRegistry>,
    config: ServerConfig,
    metrics: Arc<Metrics>,
}

impl Server {
    pub fn new(registry: ProtocolRegistry, config: ServerConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            config,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Shared metrics handle, for reporting outside the accept loop.
    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Bind the configured address and serve until ctrl-c.
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.address).await?;

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("received ctrl-c, shutting down");
                let _ = shutdown_tx.send(()).await;
            }
        });

        self.serve_on(listener, shutdown_rx).await
    }

    /// Serve on an already-bound listener until the shutdown channel fires.
    pub async fn serve_on(
        self,
        listener: TcpListener,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!(address = %local_addr, max_connections = self.config.max_connections,
            socket_timeout_ms = self.config.socket_timeout.as_millis() as u64,
            "listening for inbound pipsqueak messages");

        let limiter = Arc::new(Semaphore::new(self.config.max_connections));

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("shutting down");
                    self.metrics.log_summary();
                    return Ok(());
                }

                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            let Ok(permit) = limiter.clone().try_acquire_owned() else {
                                warn!(%peer, "connection limit reached, refusing connection");
                                Metrics::incr(&self.metrics.connections_rejected);
                                continue;
                            };

                            Metrics::incr(&self.metrics.connections_total);
                            Metrics::incr(&self.metrics.connections_active);

                            let registry = self.registry.clone();
                            let config = self.config.clone();
                            let metrics = self.metrics.clone();
                            tokio::spawn(async move {
                                handle_connection(stream, peer, registry, &config, &metrics).await;
                                Metrics::decr(&metrics.connections_active);
                                drop(permit);
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "error accepting connection");
                        }
                    }
                }
            }
        }
    }
}

/// Drive one connection from first byte to teardown.
async fn handle_connection(
    stream: TcpStream,
    peer: std::net::SocketAddr,
    registry: Arc<ProtocolRegistry>,
    config: &ServerConfig,
    metrics: &Arc<Metrics>,
) {
    let (mut reader, writer) = stream.into_split();
    let socket = SocketHandle::new(writer, peer);

    let mut session: Option<Session> = None;
    let mut protocol: Option<Arc<dyn Protocol>> = None;
    let mut chunk = [0u8; 512];

    loop {
        match timeout(config.socket_timeout, reader.read(&mut chunk)).await {
            // Idle timeout: destroy regardless of in-flight handler work.
            // The handler re-checks liveness before writing.
            Err(_elapsed) => {
                warn!(%peer, timeout_ms = config.socket_timeout.as_millis() as u64,
                    "socket timeout, destroying connection");
                Metrics::incr(&metrics.timeouts);
                socket.destroy().await;
                return;
            }

            Ok(Ok(0)) => {
                handle_peer_end(&socket, session.as_mut(), peer).await;
                return;
            }

            Ok(Ok(n)) => {
                let data = &chunk[..n];

                if session.is_none() {
                    match registry.create_session(data[0]) {
                        Ok((proto, fresh)) => {
                            debug!(%peer, protocol_id = proto.id(), "session established");
                            protocol = Some(proto);
                            session = Some(fresh);
                        }
                        Err(e) => {
                            error!(%peer, error = %e, "aborting connection");
                            Metrics::incr(&metrics.connection_errors);
                            socket.destroy().await;
                            return;
                        }
                    }
                }

                let Some(active) = session.as_mut() else {
                    return;
                };

                match active.on_data(data) {
                    Ok(SessionEvent::FrameComplete(state)) => {
                        Metrics::incr(&metrics.frames_dispatched);
                        if let Some(proto) = protocol.clone() {
                            let handler_socket = socket.clone();
                            tokio::spawn(async move {
                                if let Err(e) = proto.handle_request(state, handler_socket.clone()).await {
                                    error!(%peer, error = %e, "request failed unexpectedly");
                                    handler_socket.destroy().await;
                                }
                            });
                        }
                        // Keep reading: trailing bytes are ignored by the
                        // session, and the timeout still applies while the
                        // handler works.
                    }
                    Ok(SessionEvent::Incomplete) | Ok(SessionEvent::Ignored) => {}
                    Err(e) => {
                        error!(%peer, error = %e, "destroying connection");
                        Metrics::incr(&metrics.connection_errors);
                        socket.destroy().await;
                        return;
                    }
                }
            }

            Ok(Err(e)) => {
                if session.is_none() {
                    error!(%peer, error = %e, "socket error before session established");
                } else {
                    debug!(%peer, error = %e, "socket error");
                }
                Metrics::incr(&metrics.connection_errors);
                socket.destroy().await;
                return;
            }
        }
    }
}

/// The peer half-closed: end gracefully unless a response is already out.
async fn handle_peer_end(socket: &SocketHandle, session: Option<&mut Session>, peer: std::net::SocketAddr) {
    match session {
        None => {
            debug!(%peer, "peer closed before sending any data");
            socket.end().await;
        }
        Some(active) => match active.on_end() {
            EndOutcome::Incomplete => {
                socket.end().await;
            }
            EndOutcome::Complete => {}
        },
    }
}

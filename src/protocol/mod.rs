//! # Protocol Engine
//!
//! Pluggable sub-protocol dispatch and per-connection session state.
//!
//! The first byte of every connection names a sub-protocol. The registry
//! resolves that byte to a [`Protocol`] implementation, which fixes the
//! frame size the session must accumulate before dispatching the completed
//! request to the protocol's handler, exactly once per connection.
//!
//! ## Components
//! - **Registry**: explicit ID → implementation map, populated at startup
//! - **Session**: the accumulate-then-dispatch state machine
//! - **Time**: protocol 0, clock synchronization

pub mod registry;
pub mod session;
pub mod time;

use crate::error::Result;
use crate::protocol::session::SessionState;
use crate::transport::socket::SocketHandle;

/// A Pipsqueak sub-protocol.
///
/// Implementations are shared across connections behind an `Arc`, so they
/// hold no per-connection state; everything mutable lives in the
/// [`SessionState`] handed to `handle_request`.
#[async_trait::async_trait]
pub trait Protocol: Send + Sync {
    /// Wire identifier, the first byte of every frame.
    fn id(&self) -> u8;

    /// Total bytes a request frame occupies, trailer included. The session
    /// dispatches when exactly this many bytes have accumulated.
    fn frame_size(&self) -> usize;

    /// Process one completed request frame.
    ///
    /// Called exactly once per session, with the socket possibly already
    /// torn down by the idle timeout; implementations must tolerate
    /// [`SocketHandle::send_and_close`] reporting the socket gone.
    ///
    /// # Errors
    /// Any error returned here is fatal: the caller destroys the connection
    /// and no response is written.
    async fn handle_request(&self, state: SessionState, socket: SocketHandle) -> Result<()>;
}

impl std::fmt::Debug for dyn Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Protocol")
            .field("id", &self.id())
            .field("frame_size", &self.frame_size())
            .finish()
    }
}

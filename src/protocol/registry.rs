//! Protocol registry.
//!
//! An explicit map from the 1-byte wire identifier to a protocol
//! implementation, populated once at startup. No dynamic lookup, no
//! reflection: a connection's first byte either names a registered protocol
//! or the connection is aborted before any session exists.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{PipsqueakError, Result};
use crate::protocol::session::Session;
use crate::protocol::Protocol;

/// ID → implementation map for sub-protocol dispatch.
#[derive(Default)]
pub struct ProtocolRegistry {
    by_id: HashMap<u8, Arc<dyn Protocol>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a protocol under its own ID.
    ///
    /// Registration order does not matter. Re-registering an ID replaces the
    /// previous entry (last registration wins); supported, but not a
    /// contract to build on.
    pub fn register(&mut self, protocol: Arc<dyn Protocol>) {
        let id = protocol.id();
        debug!(protocol_id = id, frame_size = protocol.frame_size(), "protocol registered");
        self.by_id.insert(id, protocol);
    }

    /// Resolve a connection's first byte to its protocol.
    ///
    /// # Errors
    /// [`PipsqueakError::UnsupportedProtocol`] when no protocol claims the
    /// ID; the caller aborts the connection without creating a session.
    pub fn dispatch(&self, first_byte: u8) -> Result<Arc<dyn Protocol>> {
        self.by_id
            .get(&first_byte)
            .cloned()
            .ok_or(PipsqueakError::UnsupportedProtocol(first_byte))
    }

    /// Resolve a protocol and open a fresh session for it.
    ///
    /// Callers must not invoke this with no data available; the first byte
    /// of the connection is required to pick the protocol.
    pub fn create_session(&self, first_byte: u8) -> Result<(Arc<dyn Protocol>, Session)> {
        let protocol = self.dispatch(first_byte)?;
        let session = Session::new(protocol.id(), protocol.frame_size());
        Ok((protocol, session))
    }
}

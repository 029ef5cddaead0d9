//! # Device Key Store
//!
//! The server's only external dependency: an async lookup service mapping a
//! device ID to its provisioned shared secret.
//!
//! The protocol engine treats the store as read-only and shares one instance
//! across all connections, so implementations must be safe for concurrent
//! lookups. "Not found" is an expected outcome for the engine: it produces
//! a flagged response, not a teardown. Any other failure is fatal for the
//! connection that triggered it.

pub mod memory;

use bytes::Bytes;
use thiserror::Error;

pub use memory::MemoryDeviceStore;

/// A provisioned device and its shared secret.
///
/// Keys are provisioned out of band. `Bytes` keeps clones cheap: the engine
/// holds a reference to the key only for the duration of one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: u32,
    pub key: Bytes,
}

impl Device {
    pub fn new(id: u32, key: impl Into<Bytes>) -> Self {
        Self {
            id,
            key: key.into(),
        }
    }
}

/// Failures a [`DeviceStore`] lookup can report.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The device ID has no provisioned key. Expected; non-fatal.
    #[error("device {0} not found")]
    NotFound(u32),

    /// The backing store itself failed. Fatal for the connection.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Async lookup interface the protocol engine consumes.
#[async_trait::async_trait]
pub trait DeviceStore: Send + Sync {
    /// Resolve a device and its key by ID.
    async fn device_with_key(&self, device_id: u32) -> Result<Device, StoreError>;
}

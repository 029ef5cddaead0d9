//! # Pipsqueak
//!
//! Authenticated clock-synchronization server for resource-constrained
//! devices.
//!
//! Devices open a raw TCP connection, send one fixed-size binary frame, and
//! receive one frame back carrying the server's current time. Frames are a
//! 32-byte fixed-offset header plus a 32-byte HMAC-SHA256 trailer keyed
//! with a per-device shared secret.
//!
//! ## Architecture
//! - [`protocol`]: sub-protocol registry, the per-connection session state
//!   machine, and the time protocol itself
//! - [`core`]: the shared header codec and status flags
//! - [`security`]: HMAC trailer computation and verification
//! - [`store`]: the async device-key lookup interface
//! - [`transport`]: TCP listener, idle timeout, connection limiting
//! - [`config`], [`utils`]: configuration, logging, metrics
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use pipsqueak::config::PipsqueakConfig;
//! use pipsqueak::{MemoryDeviceStore, ProtocolRegistry, Server, TimeProtocol};
//!
//! # async fn run() -> pipsqueak::Result<()> {
//! let config = PipsqueakConfig::default();
//! let store = Arc::new(MemoryDeviceStore::new());
//!
//! let mut registry = ProtocolRegistry::new();
//! registry.register(Arc::new(TimeProtocol::new(store)));
//!
//! Server::new(registry, config.server).serve().await
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod security;
pub mod store;
pub mod transport;
pub mod utils;

pub use error::{PipsqueakError, Result};
pub use protocol::registry::ProtocolRegistry;
pub use protocol::time::TimeProtocol;
pub use protocol::Protocol;
pub use store::{Device, DeviceStore, MemoryDeviceStore, StoreError};
pub use transport::tcp::Server;

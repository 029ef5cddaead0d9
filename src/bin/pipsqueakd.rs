//! Pipsqueak server daemon.
//!
//! Loads configuration from `PIPSQUEAK_CONFIG` (a TOML path) or from the
//! environment, wires the time protocol into a registry, and serves until
//! ctrl-c.

use std::sync::Arc;

use tracing::warn;

use pipsqueak::config::PipsqueakConfig;
use pipsqueak::utils::logging;
use pipsqueak::{MemoryDeviceStore, ProtocolRegistry, Server, TimeProtocol};

#[tokio::main]
async fn main() -> pipsqueak::Result<()> {
    let config = match std::env::var("PIPSQUEAK_CONFIG") {
        Ok(path) => PipsqueakConfig::from_file(path)?,
        Err(_) => PipsqueakConfig::from_env()?,
    };
    config.validate_strict()?;

    logging::init(&config.logging.level);

    // Device keys are provisioned out of band; until a real provisioning
    // backend is wired in, every request is answered with the
    // DEVICE_NOT_REGISTERED flag.
    let store = Arc::new(MemoryDeviceStore::new());
    warn!("no devices provisioned; all requests will be flagged unregistered");

    let mut registry = ProtocolRegistry::new();
    registry.register(Arc::new(TimeProtocol::new(store)));

    Server::new(registry, config.server).serve().await
}

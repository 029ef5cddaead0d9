//! Structured logging configuration.
//!
//! Thin wrapper over `tracing-subscriber`. Level selection follows the
//! usual `RUST_LOG` conventions, with the configured level as the fallback
//! when the environment says nothing.

use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `default_level` is a directive string such as `"info"` or
/// `"pipsqueak=debug"`. Calling this twice is harmless; the second call is
/// ignored.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_owned()));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

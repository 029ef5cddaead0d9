//! Observability counters.
//!
//! Atomic counters for monitoring server health. One [`Metrics`] instance is
//! shared across all connection tasks; relaxed ordering is sufficient since
//! the counters are informational.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Counters for protocol server operations.
#[derive(Debug)]
pub struct Metrics {
    /// Total connections accepted.
    pub connections_total: AtomicU64,
    /// Currently active connections.
    pub connections_active: AtomicU64,
    /// Connections refused at the max-connections limit.
    pub connections_rejected: AtomicU64,
    /// Completed frames handed to a protocol handler.
    pub frames_dispatched: AtomicU64,
    /// Connections destroyed by protocol or I/O errors.
    pub connection_errors: AtomicU64,
    /// Connections destroyed by the idle-socket timeout.
    pub timeouts: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            frames_dispatched: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decr(counter: &AtomicU64) {
        counter.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Emit a one-line summary at info level.
    pub fn log_summary(&self) {
        info!(
            uptime_secs = self.uptime_secs(),
            connections_total = self.connections_total.load(Ordering::Relaxed),
            connections_active = self.connections_active.load(Ordering::Relaxed),
            connections_rejected = self.connections_rejected.load(Ordering::Relaxed),
            frames_dispatched = self.frames_dispatched.load(Ordering::Relaxed),
            connection_errors = self.connection_errors.load(Ordering::Relaxed),
            timeouts = self.timeouts.load(Ordering::Relaxed),
            "server metrics"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

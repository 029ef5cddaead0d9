//! # Transport
//!
//! TCP plumbing around the protocol engine.
//!
//! ## Components
//! - **Socket**: shared write-side handle with teardown-safe response writes
//! - **Tcp**: listener/accept loop, per-connection read tasks, idle timeout,
//!   connection limiting, graceful shutdown
//!
//! The engine itself never touches a `TcpStream`; it sees only the
//! [`socket::SocketHandle`] surface: write-and-close, graceful end, destroy,
//! and liveness.

pub mod socket;
pub mod tcp;

pub use socket::SocketHandle;
pub use tcp::Server;

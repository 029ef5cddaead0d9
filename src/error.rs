//! # Error Types
//!
//! Error handling for the Pipsqueak protocol engine.
//!
//! This module defines all error variants that can occur while a connection
//! is being serviced, from low-level I/O failures to protocol violations.
//!
//! ## Fatal vs. non-fatal
//! Every variant here is fatal for its connection: the socket is torn down
//! and no response is written. Outcomes the device is expected to learn
//! about (an unregistered device ID, a failed authenticity check) are NOT
//! errors; they travel back to the device as status flags in an otherwise
//! well-formed response (see [`crate::core::status`]).

use crate::store::StoreError;
use std::io;
use thiserror::Error;

/// Primary error type for all protocol operations.
#[derive(Error, Debug)]
pub enum PipsqueakError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// First byte of a connection matched no registered protocol ID.
    #[error("protocol {0} is not supported")]
    UnsupportedProtocol(u8),

    /// Accumulated request bytes would exceed the protocol's declared frame
    /// size. The connection is destroyed without a response.
    #[error("too much data received: {received} bytes for a {expected}-byte frame")]
    OversizedFrame { received: usize, expected: usize },

    /// Header decode attempted on fewer than the fixed header length.
    /// Unreachable under normal dispatch, guarded defensively.
    #[error("malformed header: {0} bytes received, 32 required")]
    MalformedHeader(usize),

    /// The request was well-framed but semantically invalid.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Device key store failed in a way other than "not found".
    #[error("device store error: {0}")]
    Store(#[from] StoreError),

    /// No complete frame arrived within the idle-socket window.
    #[error("socket timeout ({0} ms)")]
    IdleTimeout(u64),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("configuration error: {0}")]
    Config(String),
}

/// Type alias for Results using [`PipsqueakError`].
pub type Result<T> = std::result::Result<T, PipsqueakError>;

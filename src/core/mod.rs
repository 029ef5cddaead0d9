//! # Core Wire Format
//!
//! Fixed-offset binary codec shared by every Pipsqueak sub-protocol.
//!
//! ## Components
//! - **Header**: the 32-byte header common to requests and responses
//! - **Status**: the 8-bit accumulating status mask reported back to devices
//!
//! ## Wire Format
//! ```text
//! [Header(32)] [protocol-specific content] [HMAC-SHA256 trailer(32)]
//! ```
//!
//! The time protocol has no content between header and trailer, so its
//! frames are exactly 64 bytes in both directions.

pub mod header;
pub mod status;

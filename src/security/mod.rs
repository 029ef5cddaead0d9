//! # Message Authentication
//!
//! HMAC-SHA256 trailers over frame byte ranges.
//!
//! Every Pipsqueak frame carries a 32-byte HMAC-SHA256 trailer computed with
//! the per-device shared key. Verification failure is a business outcome
//! that sets a status flag on the response, never an error.

pub mod hmac;

pub use hmac::{compute_hmac, is_valid_hmac, HMAC_LENGTH};

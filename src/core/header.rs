//! Fixed 32-byte message header.
//!
//! Requests and responses share one layout with different field semantics.
//! All multi-byte fields are little-endian, matching the microcontrollers
//! the protocol was designed for.
//!
//! ```text
//! | Offset | Len | Request field          | Response field              |
//! | ------ | --- | ---------------------- | --------------------------- |
//! | 0      | 1   | protocol ID            | protocol ID (echoed)        |
//! | 1      | 4   | device ID              | server timestamp (unix s)   |
//! | 5      | 4   | request timestamp      | reserved                    |
//! | 9      | 1   | reserved               | status code                 |
//! | 10     | 4   | challenge              | challenge (echoed)          |
//! | 14     | 18  | reserved               | reserved                    |
//! ```

use crate::core::status::StatusFlags;
use crate::error::{PipsqueakError, Result};
use crate::utils::time::unix_now;

/// Length of the shared header, in bytes.
pub const HEADER_LENGTH: usize = 32;

const PROTOCOL_ID_OFFSET: usize = 0;
const REQUEST_DEVICE_ID_OFFSET: usize = 1;
const REQUEST_TIMESTAMP_OFFSET: usize = 5;
const REQUEST_CHALLENGE_OFFSET: usize = 10;

const RESPONSE_TIMESTAMP_OFFSET: usize = 1;
const RESPONSE_STATUS_CODE_OFFSET: usize = 9;
const RESPONSE_CHALLENGE_OFFSET: usize = 10;

fn read_u32_le(buf: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

/// Parsed request header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub protocol_id: u8,
    pub device_id: u32,
    /// Device-side unix timestamp at send time.
    pub timestamp: u32,
    /// Opaque value the device expects echoed back, binding the response to
    /// this request.
    pub challenge: u32,
}

impl RequestHeader {
    /// Decode the leading header from a request buffer.
    ///
    /// # Errors
    /// Returns [`PipsqueakError::MalformedHeader`] when fewer than
    /// [`HEADER_LENGTH`] bytes are available. Dispatch only runs on complete
    /// frames, so this is a defensive guard rather than an expected path.
    pub fn decode(buf: &[u8]) -> Result<RequestHeader> {
        if buf.len() < HEADER_LENGTH {
            return Err(PipsqueakError::MalformedHeader(buf.len()));
        }

        Ok(RequestHeader {
            protocol_id: buf[PROTOCOL_ID_OFFSET],
            device_id: read_u32_le(buf, REQUEST_DEVICE_ID_OFFSET),
            timestamp: read_u32_le(buf, REQUEST_TIMESTAMP_OFFSET),
            challenge: read_u32_le(buf, REQUEST_CHALLENGE_OFFSET),
        })
    }
}

/// Fields the server controls in a response header.
///
/// The response timestamp is not a field here on purpose: it is always the
/// encoder's current clock reading, taken at write time.
#[derive(Debug, Clone, Copy)]
pub struct ResponseHeader {
    pub protocol_id: u8,
    pub status: StatusFlags,
    pub challenge: u32,
}

impl ResponseHeader {
    /// Write all 32 header bytes into the front of `buf`.
    ///
    /// Reserved ranges are left untouched, so callers should hand in a
    /// zeroed response buffer.
    ///
    /// # Errors
    /// Returns [`PipsqueakError::MalformedHeader`] when `buf` is shorter
    /// than [`HEADER_LENGTH`].
    pub fn write_into(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() < HEADER_LENGTH {
            return Err(PipsqueakError::MalformedHeader(buf.len()));
        }

        buf[PROTOCOL_ID_OFFSET] = self.protocol_id;
        buf[RESPONSE_TIMESTAMP_OFFSET..RESPONSE_TIMESTAMP_OFFSET + 4]
            .copy_from_slice(&unix_now().to_le_bytes());
        buf[RESPONSE_STATUS_CODE_OFFSET] = self.status.bits();
        buf[RESPONSE_CHALLENGE_OFFSET..RESPONSE_CHALLENGE_OFFSET + 4]
            .copy_from_slice(&self.challenge.to_le_bytes());

        Ok(())
    }
}

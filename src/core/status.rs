//! Response status flags.
//!
//! A single status byte travels back to the device in every response. It is
//! a bitmask, not an enum: multiple conditions can hold at once (an
//! unregistered device also fails its authenticity check), and bits are only
//! ever added during an exchange, never removed.

/// 8-bit accumulating status mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusFlags(u8);

impl StatusFlags {
    /// No flags set; the exchange succeeded.
    pub const OK: StatusFlags = StatusFlags(0x00);

    /// The requesting device ID is not present in the key store.
    pub const DEVICE_NOT_REGISTERED: StatusFlags = StatusFlags(0x01);

    /// The request HMAC did not verify, or no key was available to verify it.
    pub const AUTHENTICITY_CHECK_FAILED: StatusFlags = StatusFlags(0x02);

    /// More bytes arrived than the protocol's logical content length.
    /// Only meaningful for protocols using the lenient overflow policy; the
    /// time protocol hard-rejects oversized frames instead.
    pub const TOO_BIG: StatusFlags = StatusFlags(0x04);

    /// The server refused to process the request due to load.
    pub const BUSY: StatusFlags = StatusFlags(0x08);

    /// Add `mask` to the set. Idempotent and associative; existing bits are
    /// never lost.
    #[must_use]
    pub fn set(self, mask: StatusFlags) -> StatusFlags {
        StatusFlags(self.0 | mask.0)
    }

    pub fn contains(self, mask: StatusFlags) -> bool {
        self.0 & mask.0 == mask.0
    }

    pub fn is_ok(self) -> bool {
        self.0 == 0
    }

    /// Raw byte as written at offset 9 of a response header.
    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn from_bits(bits: u8) -> StatusFlags {
        StatusFlags(bits)
    }
}

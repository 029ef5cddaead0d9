//! HMAC-SHA256 computation and trailer verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Length of an HMAC-SHA256 trailer, in bytes.
pub const HMAC_LENGTH: usize = 32;

/// Compute the HMAC-SHA256 digest of `buf[offset..offset + len]` with `key`.
pub fn compute_hmac(buf: &[u8], offset: usize, len: usize, key: &[u8]) -> [u8; HMAC_LENGTH] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(&buf[offset..offset + len]);
    mac.finalize().into_bytes().into()
}

/// Check the trailing [`HMAC_LENGTH`] bytes of a `frame_len`-byte frame
/// against a digest of the leading `frame_len - HMAC_LENGTH` bytes.
///
/// Returns `false` when the buffer holds fewer than `frame_len` bytes or no
/// key is available. The comparison is a plain byte-range equality check.
pub fn is_valid_hmac(buf: &[u8], frame_len: usize, key: Option<&[u8]>) -> bool {
    if buf.len() < frame_len || frame_len < HMAC_LENGTH {
        return false;
    }
    let Some(key) = key else {
        return false;
    };

    let digest = compute_hmac(buf, 0, frame_len - HMAC_LENGTH, key);
    digest[..] == buf[frame_len - HMAC_LENGTH..frame_len]
}

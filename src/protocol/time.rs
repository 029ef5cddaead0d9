//! Protocol 0: clock synchronization.
//!
//! A device sends one 64-byte frame (the 32-byte standard header followed
//! by a 32-byte HMAC trailer) and receives one 64-byte frame carrying the
//! server's current unix time, the accumulated status byte, and the echoed
//! challenge. One exchange per connection; the server closes after writing.
//!
//! The response is signed with the device key whenever the device is known.
//! For an unregistered device the trailer is left as 32 zero bytes: the
//! device still learns the server time and the `DEVICE_NOT_REGISTERED`
//! flag, it just cannot authenticate them. That degradation is a deliberate,
//! tested contract.

use std::sync::Arc;

use tracing::{debug, error, instrument};

use crate::core::header::{RequestHeader, ResponseHeader, HEADER_LENGTH};
use crate::core::status::StatusFlags;
use crate::error::{PipsqueakError, Result};
use crate::protocol::session::SessionState;
use crate::protocol::Protocol;
use crate::security::hmac::{compute_hmac, is_valid_hmac, HMAC_LENGTH};
use crate::store::{DeviceStore, StoreError};
use crate::transport::socket::SocketHandle;

/// Wire identifier of the time protocol.
pub const TIME_PROTOCOL_ID: u8 = 0;

/// Request and response frames are both header + trailer, nothing between.
pub const REQUEST_LENGTH: usize = HEADER_LENGTH + HMAC_LENGTH;
pub const RESPONSE_LENGTH: usize = HEADER_LENGTH + HMAC_LENGTH;

/// The time sub-protocol. Stateless; one instance serves all connections.
pub struct TimeProtocol {
    store: Arc<dyn DeviceStore>,
}

impl TimeProtocol {
    pub fn new(store: Arc<dyn DeviceStore>) -> Self {
        Self { store }
    }

    /// Resolve the requesting device, tolerating "not found".
    async fn load_device(&self, state: &mut SessionState) -> Result<()> {
        // Zero is not a valid device ID.
        let device_id = match state.device_id {
            Some(id) if id != 0 => id,
            _ => {
                return Err(PipsqueakError::BadRequest(
                    "device ID not specified in time request".into(),
                ))
            }
        };

        match self.store.device_with_key(device_id).await {
            Ok(device) => {
                state.device = Some(device);
                Ok(())
            }
            Err(StoreError::NotFound(_)) => {
                error!(device_id, "device is not registered");
                state.status = state.status.set(StatusFlags::DEVICE_NOT_REGISTERED);
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Copy the header fields into the session state.
fn parse_standard_header(state: &mut SessionState) -> Result<()> {
    let header = RequestHeader::decode(&state.request)?;
    state.device_id = Some(header.device_id);
    state.timestamp = Some(header.timestamp);
    state.challenge = Some(header.challenge);
    Ok(())
}

/// Verify the request trailer against the device key, recording the outcome
/// as status rather than failure. An absent device is an authenticity
/// failure without any HMAC being computed.
fn verify_request(state: &mut SessionState) {
    let key = state.device.as_ref().map(|device| &device.key[..]);
    let authentic = is_valid_hmac(&state.request, state.expected_frame_size, key);
    state.authentic = Some(authentic);
    if !authentic {
        state.status = state.status.set(StatusFlags::AUTHENTICITY_CHECK_FAILED);
    }
}

/// Assemble the 64-byte response: header, then a signed trailer when the
/// device key is known, zeroes otherwise.
fn build_response(state: &SessionState) -> Result<Vec<u8>> {
    let mut response = vec![0u8; RESPONSE_LENGTH];
    ResponseHeader {
        protocol_id: TIME_PROTOCOL_ID,
        status: state.status,
        challenge: state.challenge.unwrap_or(0),
    }
    .write_into(&mut response)?;

    if let Some(device) = &state.device {
        let digest = compute_hmac(&response, 0, HEADER_LENGTH, &device.key);
        response[HEADER_LENGTH..].copy_from_slice(&digest);
    }

    Ok(response)
}

#[async_trait::async_trait]
impl Protocol for TimeProtocol {
    fn id(&self) -> u8 {
        TIME_PROTOCOL_ID
    }

    fn frame_size(&self) -> usize {
        REQUEST_LENGTH
    }

    #[instrument(skip(self, state, socket), fields(peer = %socket.peer()))]
    async fn handle_request(&self, mut state: SessionState, socket: SocketHandle) -> Result<()> {
        parse_standard_header(&mut state)?;
        self.load_device(&mut state).await?;
        verify_request(&mut state);

        let response = build_response(&state)?;

        if socket.send_and_close(&response).await? {
            debug!(
                device_id = state.device_id,
                status = state.status.bits(),
                authentic = state.authentic,
                "time response sent"
            );
        }

        Ok(())
    }
}

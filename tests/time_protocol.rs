#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! End-to-end tests for the time protocol over real loopback TCP.
//!
//! Each test stands up a full server (registry, session machine, transport)
//! on an ephemeral port and talks to it the way a device would.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use pipsqueak::config::ServerConfig;
use pipsqueak::core::header::HEADER_LENGTH;
use pipsqueak::core::status::StatusFlags;
use pipsqueak::security::hmac::{compute_hmac, is_valid_hmac, HMAC_LENGTH};
use pipsqueak::store::{Device, DeviceStore, MemoryDeviceStore, StoreError};
use pipsqueak::utils::time::unix_now;
use pipsqueak::{ProtocolRegistry, Server, TimeProtocol};

const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";
const REQUEST_LENGTH: usize = HEADER_LENGTH + HMAC_LENGTH;

fn signed_request(device_id: u32, challenge: u32, key: &[u8]) -> Vec<u8> {
    let mut frame = vec![0u8; REQUEST_LENGTH];
    frame[0] = 0; // time protocol
    frame[1..5].copy_from_slice(&device_id.to_le_bytes());
    frame[5..9].copy_from_slice(&unix_now().to_le_bytes());
    frame[10..14].copy_from_slice(&challenge.to_le_bytes());
    let digest = compute_hmac(&frame, 0, HEADER_LENGTH, key);
    frame[HEADER_LENGTH..].copy_from_slice(&digest);
    frame
}

/// Start a server with the given store on an ephemeral port.
///
/// The returned sender keeps the server alive; dropping it shuts the
/// server down.
async fn spawn_server(
    store: Arc<dyn DeviceStore>,
    mutate: impl FnOnce(&mut ServerConfig),
) -> (SocketAddr, mpsc::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = ServerConfig::default();
    config.address = addr.to_string();
    mutate(&mut config);

    let mut registry = ProtocolRegistry::new();
    registry.register(Arc::new(TimeProtocol::new(store)));

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    tokio::spawn(Server::new(registry, config).serve_on(listener, shutdown_rx));

    (addr, shutdown_tx)
}

fn store_with(devices: &[Device]) -> Arc<MemoryDeviceStore> {
    let store = MemoryDeviceStore::new();
    for device in devices {
        store.insert(device.clone());
    }
    Arc::new(store)
}

/// Read until the server closes the connection, tolerating a reset: a
/// destroyed socket may surface as an error rather than a clean FIN.
async fn read_until_closed(stream: &mut TcpStream) -> Vec<u8> {
    let mut collected = Vec::new();
    let mut chunk = [0u8; 256];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return collected,
            Ok(n) => collected.extend_from_slice(&chunk[..n]),
        }
    }
}

#[tokio::test]
async fn test_happy_path_returns_signed_time_response() {
    let (addr, _shutdown) = spawn_server(store_with(&[Device::new(1, KEY)]), |_| {}).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let before = unix_now();
    stream.write_all(&signed_request(1, 42, KEY)).await.unwrap();

    let response = read_until_closed(&mut stream).await;
    let after = unix_now();

    assert_eq!(response.len(), REQUEST_LENGTH);
    assert_eq!(response[0], 0);
    let ts = u32::from_le_bytes(response[1..5].try_into().unwrap());
    assert!(ts >= before && ts <= after, "timestamp {ts} outside [{before}, {after}]");
    assert_eq!(response[9], StatusFlags::OK.bits());
    assert_eq!(u32::from_le_bytes(response[10..14].try_into().unwrap()), 42);

    let expected = compute_hmac(&response, 0, HEADER_LENGTH, KEY);
    assert_eq!(&response[HEADER_LENGTH..], &expected[..]);
}

#[tokio::test]
async fn test_unknown_device_gets_flagged_zero_trailer_response() {
    let (addr, _shutdown) = spawn_server(store_with(&[]), |_| {}).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&signed_request(1, 42, KEY)).await.unwrap();

    let response = read_until_closed(&mut stream).await;

    assert_eq!(response.len(), REQUEST_LENGTH);
    let status = StatusFlags::from_bits(response[9]);
    assert!(status.contains(StatusFlags::DEVICE_NOT_REGISTERED));
    assert_eq!(&response[HEADER_LENGTH..], &[0u8; HMAC_LENGTH][..]);
}

#[tokio::test]
async fn test_oversized_request_is_destroyed_without_response() {
    let (addr, _shutdown) = spawn_server(store_with(&[Device::new(1, KEY)]), |_| {}).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&[0u8; 128]).await.unwrap();

    let response = read_until_closed(&mut stream).await;
    assert!(response.is_empty(), "expected no response bytes, got {}", response.len());
}

#[tokio::test]
async fn test_partial_request_then_fin_ends_quietly() {
    let (addr, _shutdown) = spawn_server(store_with(&[Device::new(1, KEY)]), |_| {}).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(&signed_request(1, 42, KEY)[..24])
        .await
        .unwrap();
    stream.shutdown().await.unwrap();

    let response = read_until_closed(&mut stream).await;
    assert!(response.is_empty());
}

#[tokio::test]
async fn test_unsupported_protocol_is_aborted() {
    let (addr, _shutdown) = spawn_server(store_with(&[Device::new(1, KEY)]), |_| {}).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&[0x07u8; 16]).await.unwrap();

    let response = read_until_closed(&mut stream).await;
    assert!(response.is_empty());
}

#[tokio::test]
async fn test_chunked_request_is_accumulated() {
    let (addr, _shutdown) = spawn_server(store_with(&[Device::new(1, KEY)]), |_| {}).await;

    let request = signed_request(1, 7, KEY);
    let mut stream = TcpStream::connect(addr).await.unwrap();
    for part in request.chunks(13) {
        stream.write_all(part).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let response = read_until_closed(&mut stream).await;
    assert_eq!(response.len(), REQUEST_LENGTH);
    assert_eq!(response[9], StatusFlags::OK.bits());
    assert!(is_valid_hmac(&response, response.len(), Some(KEY)));
}

#[tokio::test]
async fn test_tampered_request_is_flagged_but_answered() {
    let (addr, _shutdown) = spawn_server(store_with(&[Device::new(1, KEY)]), |_| {}).await;

    let mut request = signed_request(1, 7, KEY);
    request[40] ^= 0xFF;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&request).await.unwrap();

    let response = read_until_closed(&mut stream).await;
    assert_eq!(response.len(), REQUEST_LENGTH);
    let status = StatusFlags::from_bits(response[9]);
    assert!(status.contains(StatusFlags::AUTHENTICITY_CHECK_FAILED));
    // Signed: the device key is known even though the request was not
    // authentic.
    assert!(is_valid_hmac(&response, response.len(), Some(KEY)));
}

#[tokio::test]
async fn test_idle_connection_times_out_without_response() {
    let (addr, _shutdown) = spawn_server(store_with(&[Device::new(1, KEY)]), |config| {
        config.socket_timeout = Duration::from_millis(100);
    })
    .await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(&signed_request(1, 42, KEY)[..10])
        .await
        .unwrap();

    // Never send the rest; the server must give up on its own.
    let response = read_until_closed(&mut stream).await;
    assert!(response.is_empty());
}

/// Store whose lookups outlive the idle timeout, exercising the race
/// between socket teardown and an in-flight device lookup.
struct SlowStore {
    delay: Duration,
    inner: MemoryDeviceStore,
}

#[async_trait::async_trait]
impl DeviceStore for SlowStore {
    async fn device_with_key(&self, device_id: u32) -> Result<Device, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.device_with_key(device_id).await
    }
}

#[tokio::test]
async fn test_timeout_during_lookup_drops_the_response() {
    let inner = MemoryDeviceStore::new();
    inner.insert(Device::new(1, KEY));
    let store = Arc::new(SlowStore {
        delay: Duration::from_millis(400),
        inner,
    });

    let (addr, _shutdown) = spawn_server(store, |config| {
        config.socket_timeout = Duration::from_millis(100);
    })
    .await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&signed_request(1, 42, KEY)).await.unwrap();

    // The frame dispatches immediately, the lookup is still sleeping when
    // the idle timeout destroys the socket, and the handler must then
    // discard its response rather than write into a dead connection.
    let response = read_until_closed(&mut stream).await;
    assert!(response.is_empty());

    // Give the slow lookup time to resolve so a write-after-teardown bug
    // would actually surface.
    tokio::time::sleep(Duration::from_millis(500)).await;
}

#[tokio::test]
async fn test_connection_limit_refuses_extra_connections() {
    let (addr, _shutdown) = spawn_server(store_with(&[Device::new(1, KEY)]), |config| {
        config.max_connections = 1;
        config.socket_timeout = Duration::from_secs(5);
    })
    .await;

    // Hold the only slot open with a half-sent request.
    let mut first = TcpStream::connect(addr).await.unwrap();
    first
        .write_all(&signed_request(1, 1, KEY)[..16])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The second connection is refused before any session exists.
    let mut second = TcpStream::connect(addr).await.unwrap();
    let _ = second.write_all(&signed_request(1, 2, KEY)).await;
    let response = read_until_closed(&mut second).await;
    assert!(response.is_empty());

    // Completing the first request still works.
    first
        .write_all(&signed_request(1, 1, KEY)[16..])
        .await
        .unwrap();
    let response = read_until_closed(&mut first).await;
    assert_eq!(response.len(), REQUEST_LENGTH);
}

#[tokio::test]
async fn test_zero_device_id_is_destroyed_without_response() {
    let (addr, _shutdown) = spawn_server(store_with(&[Device::new(1, KEY)]), |_| {}).await;

    // A well-framed request naming device 0: bad request, terminal.
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&[0u8; 64]).await.unwrap();

    let response = read_until_closed(&mut stream).await;
    assert!(response.is_empty());
}

#[tokio::test]
async fn test_immediate_fin_without_data_is_quiet() {
    let (addr, _shutdown) = spawn_server(store_with(&[]), |_| {}).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.shutdown().await.unwrap();

    let response = read_until_closed(&mut stream).await;
    assert!(response.is_empty());
}

#[tokio::test]
async fn test_excess_bytes_after_complete_frame_are_ignored() {
    let (addr, _shutdown) = spawn_server(store_with(&[Device::new(1, KEY)]), |_| {}).await;

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&signed_request(1, 42, KEY)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    // A straggler chunk after dispatch must not kill the exchange.
    let _ = stream.write_all(&[0xAAu8; 8]).await;

    let response = read_until_closed(&mut stream).await;
    assert_eq!(response.len(), REQUEST_LENGTH);
    assert_eq!(response[9], StatusFlags::OK.bits());
}

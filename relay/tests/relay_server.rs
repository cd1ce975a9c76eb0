//! End-to-end relay server tests over in-memory serial links.
//!
//! The server runs with `MemoryLink` pairs in place of physical ports, so
//! each test can act as both the operator clients and the devices.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use relay::transport::{MemoryLink, SerialLink};
use relay::{RelayClient, RelayConfig, RelayError, RelayServer};

const RECV: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(300);

struct Fixture {
    server: RelayServer,
    devices: Vec<MemoryLink>,
    _dir: tempfile::TempDir,
}

async fn start(n_devices: usize) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let whitelist = dir.path().join("whitelist.txt");
    std::fs::write(&whitelist, "joe,password23\nkate,hunter2\n").unwrap();

    let mut links: Vec<Box<dyn SerialLink>> = Vec::new();
    let mut devices = Vec::new();
    for _ in 0..n_devices {
        let (station, device) = MemoryLink::pair();
        links.push(Box::new(station));
        devices.push(device);
    }

    let mut config = RelayConfig::new(0, Vec::new(), whitelist);
    config.log_root = dir.path().to_path_buf();
    let server = RelayServer::start_with_links(config, links).await.unwrap();

    Fixture {
        server,
        devices,
        _dir: dir,
    }
}

/// Connect and authenticate, returning the socket halves and the server's
/// one-line auth response.
async fn connect(
    fx: &Fixture,
    username: &str,
    password: &str,
) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf, String) {
    let stream = TcpStream::connect(fx.server.local_addr()).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    write_half
        .write_all(format!("{username}\n{password}\n").as_bytes())
        .await
        .unwrap();

    let mut response = String::new();
    timeout(RECV, reader.read_line(&mut response))
        .await
        .unwrap()
        .unwrap();
    (reader, write_half, response.trim().to_string())
}

async fn read_routed_line(reader: &mut BufReader<OwnedReadHalf>) -> String {
    let mut line = String::new();
    timeout(RECV, reader.read_line(&mut line))
        .await
        .expect("timed out waiting for routed message")
        .unwrap();
    line.trim_end().to_string()
}

/// Poll the device side of a memory link until `expected` shows up.
async fn wait_device_bytes(device: &MemoryLink, expected: &str) -> String {
    let deadline = tokio::time::Instant::now() + RECV;
    let mut got = String::new();
    loop {
        got.push_str(&device.drain_received());
        if got.contains(expected) {
            return got;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "device never received {expected:?}, got {got:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_auth_good_and_bad() {
    let fx = start(1).await;

    let (_reader, _writer, response) = connect(&fx, "joe", "password23").await;
    assert_eq!(response, "GOOD");

    // Whitelist comparison trims both fields.
    let (_reader, _writer, response) = connect(&fx, "  kate  ", "hunter2").await;
    assert_eq!(response, "GOOD");

    let (mut reader, _writer, response) = connect(&fx, "joe", "wrong-password").await;
    assert_eq!(response, "BAD");

    // The server hangs up right after BAD.
    let mut rest = String::new();
    let n = timeout(RECV, reader.read_line(&mut rest))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);

    fx.server.shutdown();
}

#[tokio::test]
async fn test_device_leg_gets_carriage_return() {
    let mut fx = start(1).await;

    let (_reader, mut writer, response) = connect(&fx, "joe", "password23").await;
    assert_eq!(response, "GOOD");

    writer.write_all(b"0W087 045\n").await.unwrap();
    let got = wait_device_bytes(&fx.devices[0], "W087 045\r").await;
    assert_eq!(got, "W087 045\r");

    // An already CR-terminated payload is not doubled.
    fx.devices[0].drain_received();
    writer.write_all(b"0C2\r\n").await.unwrap();
    let got = wait_device_bytes(&fx.devices[0], "C2\r").await;
    assert_eq!(got, "C2\r");

    fx.server.shutdown();
}

#[tokio::test]
async fn test_routing_follows_last_writer() {
    let mut fx = start(2).await;

    let (mut reader_a, mut writer_a, _) = connect(&fx, "joe", "password23").await;
    let (mut reader_b, mut writer_b, _) = connect(&fx, "kate", "hunter2").await;

    // A owns port 0, B owns port 1, concurrently.
    writer_a.write_all(b"0C2\n").await.unwrap();
    writer_b.write_all(b"1FA;\n").await.unwrap();
    wait_device_bytes(&fx.devices[0], "C2\r").await;
    wait_device_bytes(&fx.devices[1], "FA;").await;

    // Each port's response lands only at its own last writer.
    fx.devices[0].write_all(b"+123+045\r").unwrap();
    fx.devices[1].write_all(b"FA00014071000;").unwrap();

    assert_eq!(read_routed_line(&mut reader_a).await, "+123+045");
    assert_eq!(read_routed_line(&mut reader_b).await, "FA00014071000");

    // No crosstalk beyond that.
    let mut extra = String::new();
    assert!(timeout(QUIET, reader_a.read_line(&mut extra)).await.is_err());

    // Ownership moves with the most recent writer.
    writer_b.write_all(b"0C2\n").await.unwrap();
    wait_device_bytes(&fx.devices[0], "C2\r").await;
    fx.devices[0].write_all(b"+200+090\r").unwrap();
    assert_eq!(read_routed_line(&mut reader_b).await, "+200+090");

    fx.server.shutdown();
}

#[tokio::test]
async fn test_bad_frames_are_dropped_but_connection_survives() {
    let mut fx = start(1).await;

    let (_reader, mut writer, _) = connect(&fx, "joe", "password23").await;

    // No leading digit, then an unconfigured port: both dropped.
    writer.write_all(b"xW000 000\n").await.unwrap();
    writer.write_all(b"7PING\n").await.unwrap();

    // The session is still alive and routable afterwards.
    writer.write_all(b"0C2\n").await.unwrap();
    let got = wait_device_bytes(&fx.devices[0], "C2\r").await;
    assert_eq!(got, "C2\r");

    fx.server.shutdown();
}

#[tokio::test]
async fn test_unowned_channel_message_is_dropped() {
    let mut fx = start(1).await;

    let (mut reader, _writer, _) = connect(&fx, "joe", "password23").await;

    // Nothing has written to port 0, so its emission has no destination.
    fx.devices[0].write_all(b"+000+000\r").unwrap();

    let mut line = String::new();
    assert!(timeout(QUIET, reader.read_line(&mut line)).await.is_err());

    fx.server.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_relay_client_end_to_end() {
    let mut fx = start(1).await;
    let addr = fx.server.local_addr();

    let bad = tokio::task::spawn_blocking(move || {
        RelayClient::connect(addr, "joe", "wrong-password").err()
    })
    .await
    .unwrap();
    assert!(matches!(bad, Some(RelayError::Auth)));

    let mut client =
        tokio::task::spawn_blocking(move || RelayClient::connect(addr, "joe", "password23"))
            .await
            .unwrap()
            .unwrap();

    client.send(0, "C2").unwrap();
    wait_device_bytes(&fx.devices[0], "C2\r").await;

    fx.devices[0].write_all(b"+010+020\r").unwrap();
    let line = tokio::task::spawn_blocking(move || client.recv(RECV))
        .await
        .unwrap();
    assert_eq!(line.as_deref(), Some("+010+020"));

    fx.server.shutdown();
}

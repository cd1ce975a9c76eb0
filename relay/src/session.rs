//! One authenticated TCP client connection.
//!
//! A session authenticates with two newline-terminated strings (username,
//! password) checked against the whitelist, then bridges its socket to the
//! server's serial channels: inbound lines are decoded as frames and written
//! to the addressed port, and routed device messages are delivered back as
//! bare `payload\n` lines.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::channel::SerialChannel;
use crate::codec;
use crate::datalog::DataLogger;
use crate::error::{RelayError, RelayResult};
use crate::whitelist::Whitelist;

/// Reply sent when the login is accepted.
pub const VALID_USER_MESSAGE: &str = "GOOD";

/// Reply sent when the login is rejected; the connection closes right after.
pub const INVALID_USER_MESSAGE: &str = "BAD";

/// Bound on the auth handshake; a client that stalls mid-login is dropped.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound messages queued per session before backpressure.
const OUTBOUND_QUEUE: usize = 64;

/// Registry of live sessions, keyed by session id. The router looks
/// destinations up here; sessions deregister themselves on teardown.
pub(crate) type SessionTable = Arc<Mutex<HashMap<u64, mpsc::Sender<String>>>>;

/// Everything one session needs from the server.
pub(crate) struct SessionContext {
    pub id: u64,
    pub whitelist: Arc<Whitelist>,
    pub channels: Arc<Vec<Arc<SerialChannel>>>,
    pub sessions: SessionTable,
    pub logger: DataLogger,
}

/// Drive one connection from accept to teardown.
pub(crate) async fn run(stream: TcpStream, ctx: SessionContext) {
    let peer = stream.peer_addr().ok();
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = write_half;

    match authenticate(&mut reader, &mut writer, &ctx).await {
        Ok(true) => {}
        Ok(false) => {
            info!(session = ctx.id, ?peer, "login rejected");
            return;
        }
        Err(e) => {
            debug!(session = ctx.id, ?peer, error = %e, "login aborted");
            return;
        }
    }

    info!(session = ctx.id, ?peer, "client connected");

    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
    ctx.sessions.lock().unwrap().insert(ctx.id, tx);

    // Either side failing tears the whole session down: a dead write half
    // aborts the read loop and vice versa.
    tokio::select! {
        _ = read_loop(&mut reader, &ctx) => {}
        _ = write_loop(writer, rx, ctx.id) => {}
    }

    ctx.sessions.lock().unwrap().remove(&ctx.id);
    info!(session = ctx.id, "client disconnected");
}

/// Read username and password lines and answer `GOOD` or `BAD`.
///
/// The whole handshake is bounded by [`AUTH_TIMEOUT`]. Returns `Ok(false)`
/// (after sending `BAD`) for credentials not on the whitelist.
async fn authenticate(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    ctx: &SessionContext,
) -> RelayResult<bool> {
    let mut username = String::new();
    let mut password = String::new();

    timeout(AUTH_TIMEOUT, reader.read_line(&mut username))
        .await
        .map_err(|_| RelayError::Auth)??;
    timeout(AUTH_TIMEOUT, reader.read_line(&mut password))
        .await
        .map_err(|_| RelayError::Auth)??;

    if ctx.whitelist.contains(&username, &password) {
        writer
            .write_all(format!("{VALID_USER_MESSAGE}\n").as_bytes())
            .await?;
        Ok(true)
    } else {
        writer
            .write_all(format!("{INVALID_USER_MESSAGE}\n").as_bytes())
            .await?;
        Ok(false)
    }
}

/// Decode inbound frames and forward them to the addressed serial channel
/// until the client disconnects.
async fn read_loop(reader: &mut BufReader<OwnedReadHalf>, ctx: &SessionContext) {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => handle_line(&line, ctx),
            Err(e) => {
                // Peer reset; teardown, not a server failure.
                debug!(session = ctx.id, error = %e, "session read error");
                break;
            }
        }
    }
}

/// Process one inbound line: decode, log, write to the target port.
///
/// A malformed frame or unknown destination is logged and dropped; the
/// connection stays open.
fn handle_line(line: &str, ctx: &SessionContext) {
    if line.trim().is_empty() {
        return;
    }

    let frame = match codec::decode(line) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(session = ctx.id, error = %e, "ignoring message without valid serial destination");
            return;
        }
    };

    ctx.logger.client_data(&frame.payload);

    let Some(channel) = ctx.channels.get(frame.target_port as usize) else {
        warn!(
            session = ctx.id,
            port = frame.target_port,
            "ignoring message with invalid serial destination"
        );
        return;
    };

    // Device protocols are CR-terminated; the frame itself is not.
    let command = codec::ensure_cr(&frame.payload);

    // Serial writes are a handful of bytes into the OS port buffer.
    if let Err(e) = channel.write(&command, ctx.id) {
        warn!(
            session = ctx.id,
            port = frame.target_port,
            error = %e,
            "serial write failed"
        );
        return;
    }

    debug!(
        session = ctx.id,
        port = frame.target_port,
        payload = %frame.payload,
        "routed client message"
    );
}

/// Deliver routed device messages to the client as `payload\n` lines.
async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<String>, id: u64) {
    while let Some(message) = rx.recv().await {
        let result = async {
            writer.write_all(message.as_bytes()).await?;
            writer.write_all(b"\n").await
        }
        .await;

        if let Err(e) = result {
            debug!(session = id, error = %e, "session write failed");
            break;
        }
    }
}

//! Client side of the relay wire protocol.
//!
//! A [`RelayClient`] connects to the relay server, authenticates, and then
//! exchanges frames: outbound writes are prefixed with the target port
//! digit, inbound lines arrive on a queue fed by a background reader
//! thread. Device drivers sit on top of this via `devices::RelayLink`.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::codec;
use crate::error::{RelayError, RelayResult};
use crate::session::VALID_USER_MESSAGE;

/// Bound on establishing the TCP connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Socket read timeout; the reader thread uses it to notice shutdown.
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// An authenticated connection to the relay server.
#[derive(Debug)]
pub struct RelayClient {
    stream: TcpStream,
    lines: Receiver<String>,
}

impl RelayClient {
    /// Connect and authenticate.
    ///
    /// Sends the username and password as two newline-terminated strings
    /// and expects the server's `GOOD` reply; anything else is
    /// [`RelayError::Auth`]. On success a reader thread starts queueing
    /// inbound lines for [`recv`](Self::recv).
    pub fn connect<A: ToSocketAddrs>(
        addr: A,
        username: &str,
        password: &str,
    ) -> RelayResult<RelayClient> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| RelayError::Frame("no address to connect to".to_string()))?;
        let mut stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        stream.set_write_timeout(Some(READ_TIMEOUT))?;

        stream.write_all(format!("{username}\n{password}\n").as_bytes())?;

        let mut reader = BufReader::new(stream.try_clone()?);
        let mut response = String::new();
        reader.read_line(&mut response)?;
        if response.trim() != VALID_USER_MESSAGE {
            return Err(RelayError::Auth);
        }

        info!(%addr, username, "relay client authenticated");

        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("relay-client-reader".to_string())
            .spawn(move || read_lines(reader, tx))?;

        Ok(RelayClient { stream, lines: rx })
    }

    /// Send a payload to the given serial port on the server.
    pub fn send(&mut self, target_port: u8, payload: &str) -> RelayResult<()> {
        let frame = codec::encode(target_port, payload)?;
        self.stream.write_all(frame.as_bytes())?;
        Ok(())
    }

    /// Send raw bytes to the server, nothing added or removed.
    pub fn send_verbatim(&mut self, data: &str) -> RelayResult<()> {
        self.stream.write_all(data.as_bytes())?;
        Ok(())
    }

    /// Wait up to `timeout` for the next line routed back to this client.
    pub fn recv(&mut self, timeout: Duration) -> Option<String> {
        self.lines.recv_timeout(timeout).ok()
    }

    /// Take the next queued line without waiting.
    pub fn try_recv(&mut self) -> Option<String> {
        self.lines.try_recv().ok()
    }
}

/// Reader thread body: queue complete lines until the server goes away or
/// the client is dropped.
fn read_lines(mut reader: BufReader<TcpStream>, tx: Sender<String>) {
    let mut line = String::new();
    loop {
        match reader.read_line(&mut line) {
            Ok(0) => {
                debug!("server closed the connection");
                break;
            }
            Ok(_) => {
                let message = line.trim_end_matches(['\r', '\n']).to_string();
                line.clear();
                if tx.send(message).is_err() {
                    // Client dropped; nobody is listening anymore.
                    break;
                }
            }
            // Timeouts just mean no traffic; any partial read stays
            // accumulated in `line` for the next pass.
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                continue;
            }
            Err(e) => {
                debug!(error = %e, "server connection lost");
                break;
            }
        }
    }
}

//! The link every device driver talks through.
//!
//! [`DeviceLink`] is the full capability set a driver needs: send a
//! CR-terminated command, send raw bytes, and wait for the next delimited
//! response. It has exactly two implementations, selected at construction:
//! [`RelayLink`] tunnels through the relay server, [`LocalLink`] opens the
//! serial device directly on this machine.

use std::net::ToSocketAddrs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use relay::channel::DEFAULT_DELIMITERS;
use relay::codec;
use relay::transport::{self, SerialLink};
use relay::RelayClient;

use crate::error::{DeviceError, DeviceResult};

/// Backoff when a local device has nothing to offer.
const READ_RETRY: Duration = Duration::from_millis(100);

/// Bidirectional message link to one device.
pub trait DeviceLink: Send {
    /// Deliver a command to the device, guaranteeing carriage-return
    /// termination (directly, or via the relay's device leg).
    fn send(&mut self, command: &str) -> DeviceResult<()>;

    /// Deliver bytes exactly as given, no terminator handling. Note that
    /// traffic tunneled through the relay still gets CR termination on the
    /// final device leg.
    fn send_verbatim(&mut self, data: &str) -> DeviceResult<()>;

    /// Wait up to `timeout` for the next delimited message from the
    /// device; `None` means nothing arrived in time.
    fn recv(&mut self, timeout: Duration) -> Option<String>;
}

/// Device link tunneled through the relay server.
#[derive(Debug)]
pub struct RelayLink {
    client: RelayClient,
    target_port: u8,
}

impl RelayLink {
    /// Connect and authenticate to the relay, binding this link to one of
    /// the server's serial ports.
    pub fn connect<A: ToSocketAddrs>(
        addr: A,
        username: &str,
        password: &str,
        target_port: u8,
    ) -> DeviceResult<RelayLink> {
        if target_port > 9 {
            return Err(DeviceError::Range {
                param: "target_port",
                value: target_port as i64,
            });
        }

        let client = RelayClient::connect(addr, username, password)?;
        Ok(RelayLink {
            client,
            target_port,
        })
    }

    /// Wrap an already authenticated client.
    pub fn over(client: RelayClient, target_port: u8) -> DeviceResult<RelayLink> {
        if target_port > 9 {
            return Err(DeviceError::Range {
                param: "target_port",
                value: target_port as i64,
            });
        }
        Ok(RelayLink {
            client,
            target_port,
        })
    }
}

impl DeviceLink for RelayLink {
    fn send(&mut self, command: &str) -> DeviceResult<()> {
        // The server appends the CR on the device leg.
        self.client.send(self.target_port, command)?;
        Ok(())
    }

    fn send_verbatim(&mut self, data: &str) -> DeviceResult<()> {
        self.client.send_verbatim(data)?;
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Option<String> {
        self.client.recv(timeout)
    }
}

/// Device link over a locally attached serial port, no server involved.
///
/// A background thread scans the inbound byte stream with the same
/// delimiter set the relay server uses and queues complete messages.
pub struct LocalLink {
    writer: Box<dyn SerialLink>,
    lines: Receiver<String>,
    shutdown: Arc<AtomicBool>,
}

impl LocalLink {
    /// Open a physical serial port.
    pub fn open(port_name: &str, baud: u32) -> DeviceResult<LocalLink> {
        let link = transport::open_port(port_name, baud)?;
        Self::over(link)
    }

    /// Build a local link over an existing byte stream (tests use a
    /// `MemoryLink` here).
    pub fn over(link: Box<dyn SerialLink>) -> DeviceResult<LocalLink> {
        let reader = link.try_clone_link()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();

        let flag = Arc::clone(&shutdown);
        thread::Builder::new()
            .name("local-link-reader".to_string())
            .spawn(move || scan_messages(reader, tx, flag))?;

        Ok(LocalLink {
            writer: link,
            lines: rx,
            shutdown,
        })
    }
}

impl DeviceLink for LocalLink {
    fn send(&mut self, command: &str) -> DeviceResult<()> {
        let command = codec::ensure_cr(command);
        self.writer.write_all(command.as_bytes())?;
        Ok(())
    }

    fn send_verbatim(&mut self, data: &str) -> DeviceResult<()> {
        self.writer.write_all(data.as_bytes())?;
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Option<String> {
        self.lines.recv_timeout(timeout).ok()
    }
}

impl Drop for LocalLink {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

/// Reader thread body: accumulate bytes into delimited messages.
fn scan_messages(mut link: Box<dyn SerialLink>, tx: Sender<String>, shutdown: Arc<AtomicBool>) {
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; 1];

    while !shutdown.load(Ordering::Relaxed) {
        match link.read(&mut buf) {
            Ok(0) => thread::sleep(READ_RETRY),
            Ok(_) => {
                let byte = buf[0];
                if !DEFAULT_DELIMITERS.contains(&byte) {
                    pending.push(byte);
                    continue;
                }
                if pending.is_empty() {
                    continue;
                }

                let message = String::from_utf8_lossy(&pending).into_owned();
                pending.clear();
                if tx.send(message).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "local serial read error");
                thread::sleep(READ_RETRY);
            }
        }
    }
    debug!("local link reader stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay::transport::MemoryLink;

    #[test]
    fn test_local_link_send_appends_cr() {
        let (station, device) = MemoryLink::pair();
        let mut link = LocalLink::over(Box::new(station)).unwrap();

        link.send("C2").unwrap();
        link.send("W010 045\r").unwrap();
        assert_eq!(device.drain_received(), "C2\rW010 045\r");

        link.send_verbatim("raw").unwrap();
        assert_eq!(device.drain_received(), "raw");
    }

    #[test]
    fn test_local_link_receives_delimited_messages() {
        let (station, mut device) = MemoryLink::pair();
        let mut link = LocalLink::over(Box::new(station)).unwrap();

        device.write_all(b"+087+045\rFA00014071000;").unwrap();
        assert_eq!(
            link.recv(Duration::from_secs(1)).as_deref(),
            Some("+087+045")
        );
        assert_eq!(
            link.recv(Duration::from_secs(1)).as_deref(),
            Some("FA00014071000")
        );
        assert_eq!(link.recv(Duration::from_millis(50)), None);
    }

    #[test]
    fn test_relay_link_rejects_bad_port_digit() {
        // Validated before any connection is attempted.
        let err = RelayLink::connect("127.0.0.1:1", "joe", "pw", 10).unwrap_err();
        assert!(matches!(err, DeviceError::Range { .. }));
    }
}

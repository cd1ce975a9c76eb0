//! Ownership of one physical serial device.
//!
//! A [`SerialChannel`] pairs the writable half of a device link with the
//! identity of the session that wrote to it most recently. The readable half
//! lives in a [`ChannelReader`], a blocking loop on its own thread that
//! accumulates bytes into delimited messages and hands them to the router
//! together with the last-writer id captured at emission time.
//!
//! Port ownership is deliberately "whoever wrote last": there is no
//! reservation, and concurrent multi-client access to the same physical
//! port is unsupported.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::datalog::DataLogger;
use crate::transport::SerialLink;

/// Message boundary characters scanned on the inbound device stream. The
/// rotator answers end in `\r`, the radio in `;`, the C&DH board in `$`.
pub const DEFAULT_DELIMITERS: &[u8] = b"\r\n;$";

/// Backoff when the device has nothing to offer.
const READ_RETRY: Duration = Duration::from_millis(100);

/// One delimited message emitted by a serial channel, tagged with the
/// session that should receive it.
#[derive(Debug)]
pub struct ChannelEvent {
    pub port_index: usize,
    pub message: String,
    /// Last writer at the time of emission; `None` if nothing has ever
    /// been written to this port.
    pub session_id: Option<u64>,
}

/// The writable half of one serial device, shared between sessions.
pub struct SerialChannel {
    port_index: usize,
    writer: Mutex<Box<dyn SerialLink>>,
    /// 0 means no session has written yet; real session ids start at 1.
    last_writer: AtomicU64,
}

impl SerialChannel {
    /// Split a device link into the shared channel and its reader loop.
    pub fn open(
        port_index: usize,
        link: Box<dyn SerialLink>,
        delimiters: Vec<u8>,
        shutdown: Arc<AtomicBool>,
    ) -> std::io::Result<(Arc<SerialChannel>, ChannelReader)> {
        let reader_link = link.try_clone_link()?;
        let channel = Arc::new(SerialChannel {
            port_index,
            writer: Mutex::new(link),
            last_writer: AtomicU64::new(0),
        });

        let reader = ChannelReader {
            link: reader_link,
            delimiters,
            channel: Arc::clone(&channel),
            shutdown,
        };
        Ok((channel, reader))
    }

    /// Write `payload` verbatim to the device and record `session_id` as
    /// the channel's owner for the next inbound message.
    ///
    /// The owner is recorded before the bytes go out, so a response cannot
    /// outrun the ownership change.
    pub fn write(&self, payload: &str, session_id: u64) -> std::io::Result<()> {
        self.last_writer.store(session_id, Ordering::SeqCst);
        let mut writer = self.writer.lock().unwrap();
        writer.write_all(payload.as_bytes())?;
        trace!(port = self.port_index, session_id, payload, "wrote to serial port");
        Ok(())
    }

    /// The most recent writer, if any session has written to this port.
    pub fn last_writer(&self) -> Option<u64> {
        match self.last_writer.load(Ordering::SeqCst) {
            0 => None,
            id => Some(id),
        }
    }

    pub fn port_index(&self) -> usize {
        self.port_index
    }
}

/// Blocking reader loop for one serial device.
pub struct ChannelReader {
    link: Box<dyn SerialLink>,
    delimiters: Vec<u8>,
    channel: Arc<SerialChannel>,
    shutdown: Arc<AtomicBool>,
}

impl ChannelReader {
    /// Run until shutdown, emitting delimited messages into `events`.
    ///
    /// Reads are scanned byte-by-byte; a delimiter terminates the pending
    /// message (the delimiter itself is consumed). Empty reads and read
    /// errors are not fatal: the loop backs off briefly and retries. Every
    /// emitted message is appended to the per-port data log before routing.
    pub fn run(mut self, events: mpsc::Sender<ChannelEvent>, logger: DataLogger) {
        let port = self.channel.port_index;
        let mut pending: Vec<u8> = Vec::new();
        let mut buf = [0u8; 1];

        debug!(port, "serial reader started");
        while !self.shutdown.load(Ordering::Relaxed) {
            match self.link.read(&mut buf) {
                Ok(0) => thread::sleep(READ_RETRY),
                Ok(_) => {
                    let byte = buf[0];
                    if !self.delimiters.contains(&byte) {
                        pending.push(byte);
                        continue;
                    }
                    if pending.is_empty() {
                        continue;
                    }

                    let message = String::from_utf8_lossy(&pending).into_owned();
                    pending.clear();

                    logger.serial_data(port, &message);

                    let event = ChannelEvent {
                        port_index: port,
                        message,
                        session_id: self.channel.last_writer(),
                    };
                    if events.blocking_send(event).is_err() {
                        // Router is gone; the server is shutting down.
                        break;
                    }
                }
                Err(e) => {
                    warn!(port, error = %e, "serial read error");
                    thread::sleep(READ_RETRY);
                }
            }
        }
        debug!(port, "serial reader stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryLink;

    fn start_channel() -> (
        Arc<SerialChannel>,
        MemoryLink,
        mpsc::Receiver<ChannelEvent>,
        Arc<AtomicBool>,
        thread::JoinHandle<()>,
        tempfile::TempDir,
    ) {
        let (station, device) = MemoryLink::pair();
        let shutdown = Arc::new(AtomicBool::new(false));
        let (channel, reader) = SerialChannel::open(
            0,
            Box::new(station),
            DEFAULT_DELIMITERS.to_vec(),
            Arc::clone(&shutdown),
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let logger = DataLogger::new(dir.path());
        let (tx, rx) = mpsc::channel(16);
        let handle = thread::spawn(move || reader.run(tx, logger));

        (channel, device, rx, shutdown, handle, dir)
    }

    #[test]
    fn test_emits_delimited_messages_with_last_writer() {
        let (channel, mut device, mut rx, shutdown, handle, _dir) = start_channel();

        // Nothing written yet: emission carries no session.
        device.write_all(b"+087+045\r").unwrap();
        let event = rx.blocking_recv().unwrap();
        assert_eq!(event.message, "+087+045");
        assert_eq!(event.session_id, None);

        // After a session writes, the next emission is tagged with it.
        channel.write("C2\r", 4).unwrap();
        assert_eq!(device.drain_received(), "C2\r");
        device.write_all(b"+090+050\r").unwrap();
        let event = rx.blocking_recv().unwrap();
        assert_eq!(event.message, "+090+050");
        assert_eq!(event.session_id, Some(4));

        shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap();
    }

    #[test]
    fn test_delimiter_set_and_empty_messages() {
        let (_channel, mut device, mut rx, shutdown, handle, _dir) = start_channel();

        // Consecutive delimiters produce no empty messages; `;` and `$`
        // terminate just like CR/LF.
        device.write_all(b"\r\nFA00014071000;!HELLO,A0$").unwrap();
        let event = rx.blocking_recv().unwrap();
        assert_eq!(event.message, "FA00014071000");
        let event = rx.blocking_recv().unwrap();
        assert_eq!(event.message, "!HELLO,A0");

        shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap();
    }

    #[test]
    fn test_last_writer_tracks_most_recent() {
        let (channel, _device, _rx, shutdown, handle, _dir) = start_channel();

        assert_eq!(channel.last_writer(), None);
        channel.write("a\r", 1).unwrap();
        channel.write("b\r", 2).unwrap();
        assert_eq!(channel.last_writer(), Some(2));

        shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap();
    }
}

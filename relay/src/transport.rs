//! Byte-stream abstraction over physical serial ports.
//!
//! The relay never talks to the OS serial layer directly; it goes through
//! [`SerialLink`], a minimal open/read/write contract. Real hardware is
//! backed by the `serialport` crate ([`open_port`]); tests use the
//! in-memory [`MemoryLink`] pair, which behaves like a null-modem cable.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::info;

use crate::error::{RelayError, RelayResult};

/// Default baud rate for the ground-station devices (GS-232A and TS-2000
/// both ship configured for 9600 8N1).
pub const DEFAULT_BAUD: u32 = 9600;

/// Read timeout on a physical port; expiry is reported as an empty read,
/// not an error, so reader loops can back off and retry.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// A bidirectional byte stream attached to one physical serial device.
///
/// Implementations must support cloning so that a dedicated reader thread
/// and writer(s) can share the same device.
pub trait SerialLink: Send {
    /// Read available bytes into `buf`, returning the count. A read timeout
    /// or momentarily empty device yields `Ok(0)` rather than an error.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `data` to the device.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Clone this link; both halves refer to the same device.
    fn try_clone_link(&self) -> io::Result<Box<dyn SerialLink>>;
}

/// Open a physical serial port at `baud`, 8N1, no flow control.
pub fn open_port(name: &str, baud: u32) -> RelayResult<Box<dyn SerialLink>> {
    let port = serialport::new(name, baud)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(READ_TIMEOUT)
        .open()
        .map_err(|source| RelayError::Device {
            name: name.to_string(),
            source,
        })?;

    info!(port = name, baud, "opened serial port");
    Ok(Box::new(PhysicalPort { port }))
}

struct PhysicalPort {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialLink for PhysicalPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn try_clone_link(&self) -> io::Result<Box<dyn SerialLink>> {
        let port = self
            .port
            .try_clone()
            .map_err(|e| io::Error::other(e.to_string()))?;
        Ok(Box::new(PhysicalPort { port }))
    }
}

/// Truncate a fixed-width read buffer at its trailing zero padding.
///
/// Stable under repetition: trimming an already-trimmed buffer yields the
/// same bytes.
pub fn trim_trailing_zeros(buf: &[u8]) -> &[u8] {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    &buf[..end]
}

/// In-memory stand-in for a serial device.
///
/// [`MemoryLink::pair`] returns the two ends of a simulated cable: bytes
/// written to one end are read from the other. Clones share the same
/// buffers, mirroring `try_clone` on a real port.
#[derive(Clone)]
pub struct MemoryLink {
    rx: Arc<Mutex<VecDeque<u8>>>,
    tx: Arc<Mutex<VecDeque<u8>>>,
}

impl MemoryLink {
    /// Create both ends of a simulated serial cable.
    pub fn pair() -> (MemoryLink, MemoryLink) {
        let a_to_b = Arc::new(Mutex::new(VecDeque::new()));
        let b_to_a = Arc::new(Mutex::new(VecDeque::new()));

        let a = MemoryLink {
            rx: Arc::clone(&b_to_a),
            tx: Arc::clone(&a_to_b),
        };
        let b = MemoryLink {
            rx: a_to_b,
            tx: b_to_a,
        };
        (a, b)
    }

    /// Drain everything the peer has written so far, as a string.
    pub fn drain_received(&self) -> String {
        let mut rx = self.rx.lock().unwrap();
        String::from_utf8_lossy(&rx.drain(..).collect::<Vec<u8>>()).into_owned()
    }
}

impl SerialLink for MemoryLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut rx = self.rx.lock().unwrap();
        let mut n = 0;
        while n < buf.len() {
            match rx.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.tx.lock().unwrap().extend(data);
        Ok(())
    }

    fn try_clone_link(&self) -> io::Result<Box<dyn SerialLink>> {
        Ok(Box::new(self.clone()))
    }
}

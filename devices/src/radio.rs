//! Kenwood TS-2000 radio driver.
//!
//! The TS-2000's terminal protocol is `;`-terminated ASCII: `FA;` polls
//! VFO A and is answered with `FA` plus an 11-digit frequency in Hz;
//! `FAnnnnnnnnnnn;` sets it. The same shape applies to VFO B (`FB`) and
//! the sub-receiver (`FC`).
//!
//! Orthogonally to status traffic, the radio's TNC can be toggled into
//! packet mode (`TC 0;`) for sending and receiving data packets, and back
//! to status mode (`TC 1;`). Frequency operations are only legal in status
//! mode.

use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{DeviceError, DeviceResult};
use crate::link::DeviceLink;

/// Bound on waiting for a status response.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Sentinel frequency reported when a poll times out or the response is
/// malformed.
pub const UNKNOWN_FREQUENCY: i64 = -1;

/// The radio's two operating modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioMode {
    /// Sending and receiving data packets through the TNC.
    Packet,
    /// Updating and polling radio settings (frequencies etc.).
    Status,
}

/// The three tunable receivers addressed by the frequency commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vfo {
    A,
    B,
    Sub,
}

impl Vfo {
    fn prefix(self) -> &'static str {
        match self {
            Vfo::A => "FA",
            Vfo::B => "FB",
            Vfo::Sub => "FC",
        }
    }
}

/// Driver for a TS-2000 behind a [`DeviceLink`].
pub struct Ts2000<L: DeviceLink> {
    link: L,
    mode: RadioMode,
}

impl<L: DeviceLink> Ts2000<L> {
    /// Build the driver and put the radio in status mode.
    pub fn new(mut link: L) -> DeviceResult<Ts2000<L>> {
        link.send("TC 1;")?;
        Ok(Ts2000 {
            link,
            mode: RadioMode::Status,
        })
    }

    pub fn mode(&self) -> RadioMode {
        self.mode
    }

    /// Switch between packet and status mode.
    ///
    /// # Errors
    ///
    /// [`DeviceError::State`] if the radio is already in the requested
    /// mode.
    pub fn set_mode(&mut self, mode: RadioMode) -> DeviceResult<()> {
        if mode == self.mode {
            return Err(DeviceError::State(format!("already in {mode:?} mode")));
        }

        match mode {
            RadioMode::Packet => {
                self.link.send("TC 0;")?;
                // Two bare carriage returns wake the TNC up.
                self.link.send("")?;
                self.link.send("")?;
            }
            RadioMode::Status => self.link.send("TC 1;")?,
        }

        self.mode = mode;
        debug!(?mode, "radio mode changed");
        Ok(())
    }

    /// Set the VFO A frequency in Hz.
    pub fn set_freq_a(&mut self, hz: i64) -> DeviceResult<()> {
        self.set_freq(Vfo::A, hz)
    }

    /// Set the VFO B frequency in Hz.
    pub fn set_freq_b(&mut self, hz: i64) -> DeviceResult<()> {
        self.set_freq(Vfo::B, hz)
    }

    /// Set the sub-receiver frequency in Hz.
    pub fn set_freq_sub(&mut self, hz: i64) -> DeviceResult<()> {
        self.set_freq(Vfo::Sub, hz)
    }

    /// Poll the VFO A frequency; [`UNKNOWN_FREQUENCY`] on timeout or a
    /// malformed response.
    pub fn freq_a(&mut self) -> DeviceResult<i64> {
        self.read_freq(Vfo::A)
    }

    /// Poll the VFO B frequency.
    pub fn freq_b(&mut self) -> DeviceResult<i64> {
        self.read_freq(Vfo::B)
    }

    /// Poll the sub-receiver frequency.
    pub fn freq_sub(&mut self) -> DeviceResult<i64> {
        self.read_freq(Vfo::Sub)
    }

    /// Pass a message through to the radio as-is (packet traffic).
    pub fn send_message(&mut self, message: &str) -> DeviceResult<()> {
        self.link.send(message)
    }

    /// Wait for the next message from the radio.
    pub fn recv(&mut self, timeout: Duration) -> Option<String> {
        self.link.recv(timeout)
    }

    fn require_status_mode(&self) -> DeviceResult<()> {
        if self.mode != RadioMode::Status {
            return Err(DeviceError::State(
                "radio must be in status mode to deal with frequency".to_string(),
            ));
        }
        Ok(())
    }

    fn set_freq(&mut self, vfo: Vfo, hz: i64) -> DeviceResult<()> {
        self.require_status_mode()?;
        if hz < 0 {
            return Err(DeviceError::Range {
                param: "frequency",
                value: hz,
            });
        }

        trace!(vfo = vfo.prefix(), hz, "set frequency");
        self.link.send(&format!("{}{hz:011};", vfo.prefix()))
    }

    fn read_freq(&mut self, vfo: Vfo) -> DeviceResult<i64> {
        self.require_status_mode()?;
        self.link.send(&format!("{};", vfo.prefix()))?;

        let hz = match self.link.recv(RESPONSE_TIMEOUT) {
            Some(line) => parse_freq(vfo.prefix(), &line).unwrap_or_else(|| {
                debug!(line, "malformed frequency response");
                UNKNOWN_FREQUENCY
            }),
            None => {
                debug!(vfo = vfo.prefix(), "frequency poll timed out");
                UNKNOWN_FREQUENCY
            }
        };
        Ok(hz)
    }
}

/// Parse `FAnnnnnnnnnnn` (the `;` terminator may already have been
/// consumed as a message delimiter).
fn parse_freq(prefix: &str, line: &str) -> Option<i64> {
    let rest = line.trim().strip_prefix(prefix)?;
    let digits = rest.strip_suffix(';').unwrap_or(rest);
    if digits.len() != 11 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

//! Yaesu GS-232A antenna rotator driver.
//!
//! The GS-232A speaks a terse CR-terminated command language: `Waaa eee`
//! points the antenna, `C2` asks for the current position and is answered
//! with `+AAA+EEE`. Depending on the controller's protocol revision the
//! position groups are three or four digits wide; the width is selected at
//! construction.
//!
//! A position poll that times out or returns something unparseable yields
//! the sentinel "unknown" position rather than an error: callers must poll
//! again instead of trusting a stale reading.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, trace};

use crate::error::{DeviceError, DeviceResult};
use crate::link::DeviceLink;

/// Bound on waiting for a `C2` position response.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

static THREE_DIGIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+([0-9]{3})\+([0-9]{3})$").unwrap());
static FOUR_DIGIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+([0-9]{4})\+([0-9]{4})$").unwrap());

/// Width of the position groups in a `C2` response; differs between
/// GS-232 protocol revisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseWidth {
    /// `+AAA+EEE`
    #[default]
    ThreeDigit,
    /// `+AAAA+EEEE`
    FourDigit,
}

impl ResponseWidth {
    fn pattern(self) -> &'static Regex {
        match self {
            ResponseWidth::ThreeDigit => &THREE_DIGIT,
            ResponseWidth::FourDigit => &FOUR_DIGIT,
        }
    }
}

/// A rotator position in whole degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub azimuth: i32,
    pub elevation: i32,
}

impl Position {
    /// Sentinel for "no usable position": returned when a poll times out
    /// or the response cannot be parsed.
    pub const UNKNOWN: Position = Position {
        azimuth: -1,
        elevation: -1,
    };

    /// Whether this is a real reading rather than the sentinel.
    pub fn is_known(&self) -> bool {
        self.azimuth >= 0 && self.elevation >= 0
    }
}

/// Minimal command surface the pass scheduler needs from a rotator.
pub trait RotatorDrive: Send {
    /// Point the antenna; does not wait for the motion to complete.
    fn point(&mut self, azimuth: u16, elevation: u16) -> DeviceResult<()>;
}

/// Driver for a GS-232A rotator controller behind a [`DeviceLink`].
pub struct Rotator<L: DeviceLink> {
    link: L,
    width: ResponseWidth,
    position: Position,
}

impl<L: DeviceLink> Rotator<L> {
    /// Driver with the common three-digit response width.
    pub fn new(link: L) -> Rotator<L> {
        Self::with_width(link, ResponseWidth::default())
    }

    pub fn with_width(link: L, width: ResponseWidth) -> Rotator<L> {
        Rotator {
            link,
            width,
            position: Position::UNKNOWN,
        }
    }

    /// Rotate the antenna to the given azimuth and elevation.
    ///
    /// Valid ranges are `[0, 360]` degrees azimuth and `[0, 180]` degrees
    /// elevation; out-of-range values are rejected before anything is
    /// written. The controller sends no response to this command.
    pub fn rotate_to(&mut self, azimuth: u16, elevation: u16) -> DeviceResult<()> {
        if azimuth > 360 {
            return Err(DeviceError::Range {
                param: "azimuth",
                value: azimuth as i64,
            });
        }
        if elevation > 180 {
            return Err(DeviceError::Range {
                param: "elevation",
                value: elevation as i64,
            });
        }

        trace!(azimuth, elevation, "rotate");
        self.link.send(&format!("W{azimuth:03} {elevation:03}"))
    }

    /// Ask the controller for the current position.
    ///
    /// Sends `C2` and waits up to [`POLL_TIMEOUT`] for a `+AAA+EEE`
    /// response. On timeout or a malformed response the stored position
    /// becomes [`Position::UNKNOWN`] and that sentinel is returned.
    pub fn poll_position(&mut self) -> DeviceResult<Position> {
        self.link.send("C2")?;

        self.position = match self.link.recv(POLL_TIMEOUT) {
            Some(line) => self.parse_position(&line).unwrap_or_else(|| {
                debug!(line, "malformed position response");
                Position::UNKNOWN
            }),
            None => {
                debug!("position poll timed out");
                Position::UNKNOWN
            }
        };
        Ok(self.position)
    }

    fn parse_position(&self, line: &str) -> Option<Position> {
        let caps = self.width.pattern().captures(line.trim())?;
        let azimuth = caps[1].parse().ok()?;
        let elevation = caps[2].parse().ok()?;
        Some(Position { azimuth, elevation })
    }

    /// The azimuth recorded by the most recent successful poll.
    ///
    /// # Errors
    ///
    /// [`DeviceError::State`] until a poll has completed successfully.
    pub fn azimuth(&self) -> DeviceResult<i32> {
        if !self.position.is_known() {
            return Err(DeviceError::State(
                "poll the rotator before reading the azimuth".to_string(),
            ));
        }
        Ok(self.position.azimuth)
    }

    /// The elevation recorded by the most recent successful poll.
    ///
    /// # Errors
    ///
    /// [`DeviceError::State`] until a poll has completed successfully.
    pub fn elevation(&self) -> DeviceResult<i32> {
        if !self.position.is_known() {
            return Err(DeviceError::State(
                "poll the rotator before reading the elevation".to_string(),
            ));
        }
        Ok(self.position.elevation)
    }
}

impl<L: DeviceLink> RotatorDrive for Rotator<L> {
    fn point(&mut self, azimuth: u16, elevation: u16) -> DeviceResult<()> {
        self.rotate_to(azimuth, elevation)
    }
}

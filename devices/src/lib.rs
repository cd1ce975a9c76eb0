//! Protocol drivers for the ground-station serial devices.
//!
//! Each driver encodes and decodes one device's command language over a
//! [`link::DeviceLink`], which either tunnels through the relay server
//! ([`link::RelayLink`]) or opens the serial port directly
//! ([`link::LocalLink`]):
//!
//! - [`rotator`] - Yaesu GS-232A antenna rotator
//! - [`radio`] - Kenwood TS-2000 transceiver
//! - [`cdh`] - the satellite's C&DH operating-system board

pub mod cdh;
pub mod error;
pub mod link;
pub mod radio;
pub mod rotator;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{DeviceError, DeviceResult};
pub use link::{DeviceLink, LocalLink, RelayLink};
pub use radio::{RadioMode, Ts2000};
pub use rotator::{Position, ResponseWidth, Rotator, RotatorDrive};

//! Error types shared by the device drivers.

use thiserror::Error;

use relay::RelayError;

/// Errors raised by the device protocol drivers.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// Low-level I/O error on the underlying link.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure in the relay connection carrying this device's traffic.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// A command parameter outside the device's accepted range; checked
    /// before anything is written.
    #[error("{param} out of range: {value}")]
    Range { param: &'static str, value: i64 },

    /// The operation requires a state the driver is not in (wrong radio
    /// mode, position read before any successful poll, ...).
    #[error("invalid state: {0}")]
    State(String),
}

/// Result type for device driver operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

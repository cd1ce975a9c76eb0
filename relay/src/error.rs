//! Error types for the relay server and client.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the relay server, client, and framing layers.
///
/// Most of these are non-fatal at the connection level: a malformed frame is
/// dropped while the connection stays open, and a routing miss is dropped
/// with a log line. The fatal startup conditions (listener bind, whitelist
/// load, device open) surface through [`RelayError::Io`],
/// [`RelayError::Whitelist`], and [`RelayError::Device`] respectively.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Low-level I/O error (socket or serial read/write failure).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed client frame (missing or non-digit port prefix).
    #[error("malformed frame: {0}")]
    Frame(String),

    /// Credentials not present in the whitelist.
    #[error("authentication rejected")]
    Auth,

    /// No destination for a message (unknown port, or no known session).
    #[error("no route for message: {0}")]
    Route(String),

    /// The whitelist file could not be loaded at startup.
    #[error("whitelist file {path}: {source}")]
    Whitelist {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A configured serial device could not be opened at startup.
    #[error("serial device {name}: {source}")]
    Device {
        name: String,
        source: serialport::Error,
    },
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

//! Serial port multiplexing relay.
//!
//! One ground-station machine owns a handful of serial devices (antenna
//! rotator, radio transceiver, satellite C&DH board) and shares them with
//! remote operator clients over a single TCP service. Clients authenticate
//! against a static whitelist, address devices by a single port digit, and
//! each port's responses are routed back to whichever session wrote to it
//! most recently.
//!
//! # Modules
//!
//! - [`codec`] - the `"<digit><payload>\n"` wire frame
//! - [`transport`] - byte-stream abstraction over physical serial ports
//! - [`channel`] - per-device reader loops and last-writer ownership
//! - [`whitelist`] - the username/password whitelist
//! - [`server`] - listener, sessions, and routing
//! - [`client`] - the client side of the wire protocol
//! - [`datalog`] - append-only per-UTC-date traffic logs

pub mod channel;
pub mod client;
pub mod codec;
pub mod datalog;
pub mod error;
pub mod server;
mod session;
pub mod transport;
pub mod whitelist;

pub use client::RelayClient;
pub use error::{RelayError, RelayResult};
pub use server::{RelayConfig, RelayServer};
pub use session::{INVALID_USER_MESSAGE, VALID_USER_MESSAGE};
pub use whitelist::Whitelist;

//! Append-only traffic logs, one file per UTC date.
//!
//! Every message that moves through the relay is durably appended before it
//! is routed: inbound client messages under `Data-Logs/Client-Data/`,
//! outbound device messages under `Data-Logs/Serial-Data/Port-<N>/`. Log
//! writes are fire-and-forget; a failure is reported but never blocks the
//! message itself.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::warn;

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Writer for the relay's per-device and per-client traffic logs.
#[derive(Debug, Clone)]
pub struct DataLogger {
    root: PathBuf,
}

impl DataLogger {
    /// Create a logger rooted at `root`; files land under
    /// `<root>/Data-Logs/...`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DataLogger { root: root.into() }
    }

    /// Append one inbound client message.
    pub fn client_data(&self, message: &str) {
        self.append(&self.root.join("Data-Logs").join("Client-Data"), message);
    }

    /// Append one message emitted by the serial port `port_index`.
    pub fn serial_data(&self, port_index: usize, message: &str) {
        self.append(
            &self
                .root
                .join("Data-Logs")
                .join("Serial-Data")
                .join(format!("Port-{port_index}")),
            message,
        );
    }

    /// Append a trimmed message to today's (UTC) log file in `dir`,
    /// creating the directory and file as needed. Empty messages are
    /// skipped. Failures are reported and swallowed.
    fn append(&self, dir: &Path, message: &str) {
        let message = message.trim();
        if message.is_empty() {
            return;
        }

        if let Err(e) = append_line(dir, message) {
            warn!(dir = %dir.display(), error = %e, "error writing to log file");
        }
    }
}

fn append_line(dir: &Path, message: &str) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;

    let date = OffsetDateTime::now_utc()
        .date()
        .format(DATE_FORMAT)
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(format!("{date}.txt")))?;
    writeln!(file, "{message}")
}

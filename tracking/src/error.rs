//! Error types for pass tracking.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackError {
    /// A command set must carry at least one command; passes below the
    /// minimum elevation are filtered out before they get here.
    #[error("command set is empty: pass has no usable samples")]
    EmptyCommandSet,

    /// A stored rotator command did not parse back into pointing angles.
    #[error("unparseable rotator command: {0:?}")]
    BadCommand(String),
}

pub type TrackResult<T> = Result<T, TrackError>;

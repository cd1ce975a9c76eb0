//! Satellite pass tracking for the ground station.
//!
//! The external pass predictor produces time-stamped azimuth/elevation
//! samples; this crate turns one pass worth of them into a rotator
//! [`pass::CommandSet`] and drives the antenna through it in real time
//! with the [`scheduler::PassScheduler`].

pub mod error;
pub mod pass;
pub mod scheduler;

pub use error::{TrackError, TrackResult};
pub use pass::{above_min_elevation, CommandSet, PassSample};
pub use scheduler::{PassScheduler, SchedulerHandle, TrackerState, TrackerStatus};

//! Pass samples and rotator command sets.
//!
//! The external pass predictor hands over a list of azimuth/elevation
//! samples spaced a fixed number of seconds apart, starting at the pass
//! anchor time. A [`CommandSet`] turns those into the rotator's `"AAA EEE"`
//! command strings, folding the azimuth into the body-relative convention
//! the mount expects: `(azimuth + 180) mod 360`.

use time::OffsetDateTime;

use crate::error::{TrackError, TrackResult};

/// One predicted pointing sample from the pass predictor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassSample {
    /// Azimuth in degrees, `[0, 360)`.
    pub azimuth_deg: f64,
    /// Elevation in degrees, `[0, 180]`.
    pub elevation_deg: f64,
}

impl PassSample {
    pub fn new(azimuth_deg: f64, elevation_deg: f64) -> PassSample {
        PassSample {
            azimuth_deg,
            elevation_deg,
        }
    }
}

/// Keep only the samples at or above `min_elevation_deg`.
pub fn above_min_elevation(samples: &[PassSample], min_elevation_deg: f64) -> Vec<PassSample> {
    samples
        .iter()
        .copied()
        .filter(|s| s.elevation_deg >= min_elevation_deg)
        .collect()
}

/// The timed command sequence for one tracked pass.
///
/// Built once per pass, immutable apart from re-anchoring, and consumed by
/// exactly one scheduler run.
#[derive(Debug, Clone)]
pub struct CommandSet {
    anchor: OffsetDateTime,
    step_seconds: u32,
    commands: Vec<String>,
}

impl CommandSet {
    /// Build the command set from predictor samples spaced `step_seconds`
    /// apart starting at `anchor`.
    ///
    /// # Errors
    ///
    /// [`TrackError::EmptyCommandSet`] if there are no samples.
    pub fn from_samples(
        anchor: OffsetDateTime,
        step_seconds: u32,
        samples: &[PassSample],
    ) -> TrackResult<CommandSet> {
        Self::from_commands(
            anchor,
            step_seconds,
            samples.iter().map(format_command).collect(),
        )
    }

    /// Build a command set from already formatted `"AAA EEE"` strings.
    pub fn from_commands(
        anchor: OffsetDateTime,
        step_seconds: u32,
        commands: Vec<String>,
    ) -> TrackResult<CommandSet> {
        if commands.is_empty() {
            return Err(TrackError::EmptyCommandSet);
        }
        Ok(CommandSet {
            anchor,
            step_seconds,
            commands,
        })
    }

    /// The pass start time (AOS).
    pub fn anchor(&self) -> OffsetDateTime {
        self.anchor
    }

    /// Seconds between consecutive commands.
    pub fn step_seconds(&self) -> u32 {
        self.step_seconds
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Total time the schedule spans.
    pub fn duration_seconds(&self) -> u64 {
        self.commands.len() as u64 * self.step_seconds as u64
    }

    /// Move the anchor to the current time, for tracking a pass that is
    /// already in progress (or for dry runs).
    pub fn start_now(&mut self) {
        self.anchor = OffsetDateTime::now_utc();
    }
}

/// Fold a predicted azimuth into the mount's body-relative convention.
fn fold_azimuth(azimuth_deg: f64) -> i32 {
    ((azimuth_deg + 180.0) % 360.0) as i32
}

fn format_command(sample: &PassSample) -> String {
    format!("{:03} {:03.0}", fold_azimuth(sample.azimuth_deg), sample.elevation_deg)
}

/// Split an `"AAA EEE"` command back into pointing angles.
pub fn parse_command(command: &str) -> TrackResult<(u16, u16)> {
    let mut parts = command.split_whitespace();
    let azimuth = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| TrackError::BadCommand(command.to_string()))?;
    let elevation = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| TrackError::BadCommand(command.to_string()))?;
    Ok((azimuth, elevation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_azimuth_fold_and_formatting() {
        let anchor = datetime!(2015-03-21 18:00:00 UTC);
        let samples = [
            PassSample::new(190.0, 45.0),
            PassSample::new(195.0, 50.4),
            PassSample::new(200.0, 55.0),
            PassSample::new(350.0, 7.0),
        ];

        let set = CommandSet::from_samples(anchor, 5, &samples).unwrap();
        assert_eq!(set.commands(), ["010 045", "015 050", "020 055", "170 007"]);
        assert_eq!(set.step_seconds(), 5);
        assert_eq!(set.anchor(), anchor);
        assert_eq!(set.duration_seconds(), 20);
    }

    #[test]
    fn test_fold_wraps_into_range() {
        assert_eq!(fold_azimuth(0.0), 180);
        assert_eq!(fold_azimuth(180.0), 0);
        assert_eq!(fold_azimuth(359.9), 179);
    }

    #[test]
    fn test_empty_pass_is_rejected() {
        let anchor = datetime!(2015-03-21 18:00:00 UTC);
        assert!(matches!(
            CommandSet::from_samples(anchor, 5, &[]),
            Err(TrackError::EmptyCommandSet)
        ));
    }

    #[test]
    fn test_min_elevation_filter() {
        let samples = [
            PassSample::new(10.0, 2.0),
            PassSample::new(20.0, 10.0),
            PassSample::new(30.0, 45.0),
            PassSample::new(40.0, 9.9),
        ];

        let kept = above_min_elevation(&samples, 10.0);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].azimuth_deg, 20.0);
        assert_eq!(kept[1].azimuth_deg, 30.0);
    }

    #[test]
    fn test_parse_command_round_trip() {
        assert_eq!(parse_command("010 045").unwrap(), (10, 45));
        assert_eq!(parse_command("170 007").unwrap(), (170, 7));
        assert!(parse_command("garbage").is_err());
        assert!(parse_command("010").is_err());
    }
}

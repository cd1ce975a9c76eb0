//! Real-time pass tracking.
//!
//! A [`PassScheduler`] drives the rotator through a built [`CommandSet`]:
//! it waits for AOS, then issues one command every step until the sequence
//! is exhausted. Progression is `Idle -> WaitingForAos -> Tracking ->
//! Finished`, driven by a single 1-second tick; the operator can stop it
//! from any state.
//!
//! Command issuance is best-effort. A rotator I/O failure is logged and
//! the next tick still fires on time; a partially issued sequence simply
//! stops when the scheduler does.

use std::time::Duration;

use devices::rotator::RotatorDrive;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::pass::{parse_command, CommandSet};

/// Scheduler states, in order of progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    WaitingForAos,
    Tracking,
    Finished,
}

/// Live progress readout, refreshed on every tick.
#[derive(Debug, Clone)]
pub struct TrackerStatus {
    pub state: TrackerState,
    /// Seconds until the next command (or, before AOS, until the first).
    pub seconds_to_next: u64,
    /// The command most recently issued.
    pub last_command: Option<String>,
    /// How many commands have been issued so far.
    pub issued: usize,
}

/// A pass scheduler holding a command set and a rotator, not yet started.
pub struct PassScheduler<R> {
    commands: CommandSet,
    rotator: R,
}

impl<R: RotatorDrive + 'static> PassScheduler<R> {
    pub fn new(commands: CommandSet, rotator: R) -> PassScheduler<R> {
        PassScheduler { commands, rotator }
    }

    /// Leave idle: spawn the tick task and start waiting for AOS.
    pub fn start(self) -> SchedulerHandle {
        let (status_tx, status_rx) = watch::channel(TrackerStatus {
            state: TrackerState::Idle,
            seconds_to_next: 0,
            last_command: None,
            issued: 0,
        });
        let (stop_tx, stop_rx) = watch::channel(false);

        let join = tokio::spawn(run(self.commands, self.rotator, status_tx, stop_rx));
        SchedulerHandle {
            status: status_rx,
            stop: stop_tx,
            join,
        }
    }
}

/// Handle to a running scheduler.
pub struct SchedulerHandle {
    status: watch::Receiver<TrackerStatus>,
    stop: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Snapshot of the latest published status.
    pub fn status(&self) -> TrackerStatus {
        self.status.borrow().clone()
    }

    /// A receiver that observes every status update.
    pub fn subscribe(&self) -> watch::Receiver<TrackerStatus> {
        self.status.clone()
    }

    /// Operator abort: cancels the tick timer from any state.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }

    /// Wait until the schedule finishes or is stopped.
    pub async fn wait(self) {
        let SchedulerHandle { stop, join, .. } = self;
        let _ = join.await;
        drop(stop);
    }
}

async fn run<R: RotatorDrive>(
    commands: CommandSet,
    mut rotator: R,
    status: watch::Sender<TrackerStatus>,
    mut stop: watch::Receiver<bool>,
) {
    // Map the wall-clock anchor onto the monotonic timeline once, at
    // start; an anchor already in the past means AOS is now.
    let until_aos = commands.anchor() - OffsetDateTime::now_utc();
    let aos_at = Instant::now() + Duration::try_from(until_aos).unwrap_or(Duration::ZERO);
    let step = Duration::from_secs(commands.step_seconds() as u64);

    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut state = TrackerState::WaitingForAos;
    let mut issued = 0usize;
    let mut last_command: Option<String> = None;
    let mut next_due = aos_at;

    info!(
        commands = commands.len(),
        step = commands.step_seconds(),
        "pass tracking armed, waiting for AOS"
    );

    loop {
        tokio::select! {
            // An explicit stop, or the handle went away entirely.
            _ = stop.changed() => {
                info!(issued, "pass tracking stopped");
                state = TrackerState::Finished;
            }
            _ = tick.tick() => {}
        }

        let now = Instant::now();
        if state == TrackerState::WaitingForAos && now >= aos_at {
            info!("AOS reached, tracking");
            state = TrackerState::Tracking;
        }

        if state == TrackerState::Tracking && now >= next_due {
            // Slice indexing is safe: issued < len until Finished.
            let command = &commands.commands()[issued];
            issue(&mut rotator, command);
            last_command = Some(command.clone());
            issued += 1;
            next_due += step;

            if issued == commands.len() {
                info!(issued, "pass complete");
                state = TrackerState::Finished;
            }
        }

        let _ = status.send(TrackerStatus {
            state,
            seconds_to_next: next_due.saturating_duration_since(now).as_secs(),
            last_command: last_command.clone(),
            issued,
        });

        if state == TrackerState::Finished {
            break;
        }
    }
}

/// Issue one command, best-effort.
fn issue<R: RotatorDrive>(rotator: &mut R, command: &str) {
    match parse_command(command) {
        Ok((azimuth, elevation)) => {
            info!(command, "issuing rotator command");
            if let Err(e) = rotator.point(azimuth, elevation) {
                error!(command, error = %e, "rotator command failed");
            }
        }
        Err(e) => error!(error = %e, "skipping unparseable command"),
    }
}

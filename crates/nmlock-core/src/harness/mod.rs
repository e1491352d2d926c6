//! Orchestration of the lock window and the child's lifetime.
//!
//! A run is a small state machine:
//!
//! ```text
//! Init ──► Configured ──► Locked ──► Running ──► Done
//!   │           │            │
//!   └───────────┴────────────┴──► Failed
//! ```
//!
//! Once `Running`, exactly two events are pending concurrently on the
//! event loop: the hold timer and the child's termination. The timer
//! firing only releases the write handle. The run ends when the child's
//! outcome is known AND the hold window has closed, in whichever order
//! those happen, so a short hold can never drop the child's real exit
//! status and a fast child can never shorten the lock window.
//!
//! # Invariants
//!
//! - The spawn is issued before the hold timer is armed, so the release
//!   is never observable before the spawn.
//! - The write handle is released exactly once per run (a single
//!   `Option` slot drained by `take`), on every path including spawn
//!   failure.
//! - The exit status slot has exactly one writer.
//! - Program termination strictly follows child termination.

use std::fmt;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError};
use crate::index::{IndexError, WriteHandle};
use crate::process::{self, CommandSpec, SpawnedChild};

/// Exit code for the harness's own failures, as opposed to a forwarded
/// child exit code.
pub const EXIT_FAILURE: i32 = 1;

/// Smallest random hold duration, in microseconds (1 ms).
pub const MIN_HOLD_MICROS: u64 = 1_000;

/// Upper bound (exclusive) of the random hold duration, in microseconds
/// (10 min).
pub const MAX_HOLD_MICROS: u64 = 600_000_000;

/// Fatal harness errors.
///
/// A spawn failure is deliberately absent: it degrades the result to
/// [`EXIT_FAILURE`] instead of aborting the run, because the test suite
/// may be exercising exactly that path.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HarnessError {
    /// The configuration could not be resolved or parsed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The index could not be opened in write mode.
    #[error(transparent)]
    Index(#[from] IndexError),
}

/// How long the write handle stays open once acquired.
///
/// A lower bound honored on a best-effort timer: the window may overshoot
/// slightly, never undershoot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldDuration {
    micros: u64,
}

impl HoldDuration {
    /// Use an exact, caller-supplied duration.
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self { micros }
    }

    /// Draw a duration uniformly from `[MIN_HOLD_MICROS, MAX_HOLD_MICROS)`.
    #[must_use]
    pub fn random() -> Self {
        Self {
            micros: rand::thread_rng().gen_range(MIN_HOLD_MICROS..MAX_HOLD_MICROS),
        }
    }

    /// The duration in microseconds.
    #[must_use]
    pub const fn as_micros(self) -> u64 {
        self.micros
    }

    /// The duration as a [`Duration`].
    #[must_use]
    pub const fn as_duration(self) -> Duration {
        Duration::from_micros(self.micros)
    }
}

impl fmt::Display for HoldDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.micros as f64 / 1e6;
        write!(f, "{secs:.6}s")
    }
}

/// Lifecycle phases of a harness run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed; nothing resolved yet.
    Init,
    /// Configuration resolved and command validated.
    Configured,
    /// Write handle acquired; the observable lock window is open.
    Locked,
    /// Hold timer and child lifetime pending concurrently.
    Running,
    /// Child outcome known, lock released.
    Done,
    /// Terminal early-abort state; the fatal error propagates to the
    /// caller.
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Configured => "configured",
            Self::Locked => "locked",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Sequences the lock window against the child's lifetime and maps the
/// child's termination to the program's own exit code.
#[derive(Debug)]
pub struct Harness {
    command: CommandSpec,
    hold: HoldDuration,
    phase: Phase,
}

impl Harness {
    /// Build a harness for a validated command and a fixed hold duration.
    #[must_use]
    pub const fn new(command: CommandSpec, hold: HoldDuration) -> Self {
        Self {
            command,
            hold,
            phase: Phase::Init,
        }
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Run the full state machine, resolving the configuration from the
    /// environment first.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Config` when the configuration cannot be
    /// resolved, and everything `run_with_config` returns.
    pub async fn run(mut self) -> Result<i32, HarnessError> {
        let config = match Config::resolve() {
            Ok(config) => config,
            Err(err) => {
                self.advance(Phase::Failed);
                return Err(err.into());
            },
        };
        self.run_with_config(&config).await
    }

    /// Run the state machine against an already-resolved configuration.
    ///
    /// Returns the program's exit code: the child's own code when it
    /// exited normally, [`EXIT_FAILURE`] when the spawn failed or the
    /// child was terminated by a signal.
    ///
    /// # Errors
    ///
    /// Returns `HarnessError::Index` when the index cannot be opened in
    /// write mode. The lock is never left held past an error.
    pub async fn run_with_config(mut self, config: &Config) -> Result<i32, HarnessError> {
        match self.drive(config).await {
            Ok(code) => {
                self.advance(Phase::Done);
                Ok(code)
            },
            Err(err) => {
                self.advance(Phase::Failed);
                Err(err)
            },
        }
    }

    async fn drive(&mut self, config: &Config) -> Result<i32, HarnessError> {
        self.advance(Phase::Configured);

        info!(path = %config.database_path.display(), "opening mail index");
        let handle = WriteHandle::open(&config.database_path)?;
        self.advance(Phase::Locked);

        // The spawn is issued first, in program order; the timer armed in
        // hold_and_reap then runs concurrently with the child.
        let child = match process::spawn(&self.command) {
            Ok(child) => Some(child),
            Err(err) => {
                warn!(error = %err, "spawn failed; holding the lock anyway");
                None
            },
        };
        self.advance(Phase::Running);

        Ok(self.hold_and_reap(handle, child).await)
    }

    /// The `Running` event loop: release the handle when the hold
    /// elapses, capture the child's status when it terminates, finish
    /// only once both have happened.
    async fn hold_and_reap(&mut self, handle: WriteHandle, child: Option<SpawnedChild>) -> i32 {
        info!(hold = %self.hold, "holding lock");
        let hold_timer = tokio::time::sleep(self.hold.as_duration());
        tokio::pin!(hold_timer);

        // Drained exactly once when the hold elapses.
        let mut held = Some(handle);
        // Single-writer slot for the child's outcome.
        let mut outcome: Option<i32> = None;

        let awaiting_child = child.is_some();
        let mut child = child;

        loop {
            tokio::select! {
                () = &mut hold_timer, if held.is_some() => {
                    if let Some(handle) = held.take() {
                        handle.release();
                    }
                    info!("lock released");
                },
                status = wait_for(&mut child), if awaiting_child && outcome.is_none() => {
                    outcome = Some(match status {
                        Ok(status) => match process::exit_code(status) {
                            Some(code) => {
                                info!(code, "child exited");
                                code
                            },
                            None => {
                                warn!(status = %status, "child terminated without an exit code");
                                EXIT_FAILURE
                            },
                        },
                        Err(err) => {
                            warn!(error = %err, "failed to collect child status");
                            EXIT_FAILURE
                        },
                    });
                },
            }

            let child_settled = outcome.is_some() || !awaiting_child;
            if held.is_none() && child_settled {
                break;
            }
        }

        outcome.unwrap_or(EXIT_FAILURE)
    }

    fn advance(&mut self, next: Phase) {
        debug!(from = %self.phase, to = %next, "phase transition");
        self.phase = next;
    }
}

async fn wait_for(
    child: &mut Option<SpawnedChild>,
) -> Result<std::process::ExitStatus, crate::process::ProcessError> {
    match child {
        Some(child) => child.wait().await,
        // Never polled (the select arm is disabled), but keeps the arm
        // well-typed when no child exists.
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_hold_stays_in_range() {
        for _ in 0..64 {
            let hold = HoldDuration::random();
            assert!(hold.as_micros() >= MIN_HOLD_MICROS);
            assert!(hold.as_micros() < MAX_HOLD_MICROS);
        }
    }

    #[test]
    fn hold_duration_displays_in_seconds() {
        assert_eq!(HoldDuration::from_micros(5_000).to_string(), "0.005000s");
        assert_eq!(HoldDuration::from_micros(1_500_000).to_string(), "1.500000s");
    }

    #[test]
    fn zero_hold_is_legal() {
        let hold = HoldDuration::from_micros(0);
        assert_eq!(hold.as_duration(), Duration::ZERO);
    }

    #[test]
    fn new_harness_starts_in_init() {
        let command = CommandSpec::new(vec!["true".into()]).unwrap();
        let harness = Harness::new(command, HoldDuration::from_micros(1));
        assert_eq!(harness.phase(), Phase::Init);
    }

    #[test]
    fn phases_display_by_name() {
        assert_eq!(Phase::Locked.to_string(), "locked");
        assert_eq!(Phase::Failed.to_string(), "failed");
    }
}

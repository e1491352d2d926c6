//! Spawning of the command under test.

use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::debug;

use super::{CommandSpec, ProcessError};

/// A spawned child with its handle and PID.
///
/// The PID is only meaningful until the exit status has been observed;
/// the OS may reuse it afterwards.
pub struct SpawnedChild {
    child: Child,
    pid: u32,
}

impl SpawnedChild {
    /// OS process ID captured at spawn time.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Suspend until the OS reports the child's termination.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::WaitFailed` if the status cannot be
    /// collected.
    pub async fn wait(&mut self) -> Result<std::process::ExitStatus, ProcessError> {
        self.child.wait().await.map_err(ProcessError::WaitFailed)
    }
}

/// Spawn the command under test.
///
/// The executable is resolved against the caller's `PATH`. The child
/// inherits standard input (and the output streams), so an interactive
/// test suite can drive it directly. The parent keeps reaping
/// responsibility: the child is never detached and never killed on drop.
///
/// # Errors
///
/// Returns `ProcessError::SpawnFailed` if the process cannot be created.
pub fn spawn(spec: &CommandSpec) -> Result<SpawnedChild, ProcessError> {
    let mut cmd = Command::new(spec.program());

    cmd.args(spec.args())
        .stdin(Stdio::inherit())
        .kill_on_drop(false);

    let child = cmd.spawn().map_err(|source| ProcessError::SpawnFailed {
        command: spec.program().to_string(),
        source,
    })?;

    let pid = child.id().ok_or_else(|| ProcessError::SpawnFailed {
        command: spec.program().to_string(),
        source: std::io::Error::other("failed to get process ID"),
    })?;

    debug!(pid, command = spec.program(), "child spawned");
    Ok(SpawnedChild { child, pid })
}

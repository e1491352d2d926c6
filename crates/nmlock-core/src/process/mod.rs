//! Supervision of the command under test.
//!
//! The command is spawned as a real child of this process and reaped by
//! it; nothing is detached. A spawn failure is deliberately survivable:
//! the harness may be exercising exactly that path.

mod spawner;

use std::process::ExitStatus;

use thiserror::Error;

pub use spawner::{SpawnedChild, spawn};

/// Errors raised while spawning or reaping the command under test.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProcessError {
    /// No command words were supplied.
    #[error("no command supplied")]
    EmptyCommand,

    /// The child process could not be created.
    #[error("failed to spawn `{command}`: {source}")]
    SpawnFailed {
        /// The executable that could not be launched.
        command: String,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// The child's termination status could not be collected.
    #[error("failed to wait for child: {0}")]
    WaitFailed(std::io::Error),
}

/// Specification of the external command to run while the lock is held.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    argv: Vec<String>,
}

impl CommandSpec {
    /// Build a spec from command words, program first.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::EmptyCommand` when no program is named.
    pub fn new(argv: Vec<String>) -> Result<Self, ProcessError> {
        if argv.first().is_none_or(String::is_empty) {
            return Err(ProcessError::EmptyCommand);
        }
        Ok(Self { argv })
    }

    /// The executable name, resolved against `PATH` at spawn time.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    /// Arguments following the executable name.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }
}

/// Decode a termination status with the conventional rules.
///
/// `Some(code)` for a normal exit; `None` when the child was terminated
/// by a signal, in which case no exit code exists to forward.
#[must_use]
pub fn exit_code(status: ExitStatus) -> Option<i32> {
    status.code()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_argv_is_rejected() {
        assert!(matches!(
            CommandSpec::new(Vec::new()),
            Err(ProcessError::EmptyCommand)
        ));
        assert!(matches!(
            CommandSpec::new(vec![String::new()]),
            Err(ProcessError::EmptyCommand)
        ));
    }

    #[test]
    fn spec_splits_program_and_args() {
        let spec = CommandSpec::new(vec!["sh".into(), "-c".into(), "exit 0".into()]).unwrap();
        assert_eq!(spec.program(), "sh");
        assert_eq!(spec.args(), ["-c".to_string(), "exit 0".to_string()]);
    }
}

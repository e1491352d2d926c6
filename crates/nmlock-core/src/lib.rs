//! nmlock-core - lock-contention harness for the notmuch mail index.
//!
//! The harness opens the mail index in exclusive write mode, launches an
//! external command while the write lock is held, keeps the lock open for a
//! configurable (or random) hold duration, then releases it and reports the
//! command's exit status. Test suites use it to observe how a second
//! program behaves while the index is locked by another process.
//!
//! Module map:
//! - [`config`]: locates and parses the notmuch configuration file.
//! - [`index`]: the exclusive write handle whose open/close window is the
//!   lock under test.
//! - [`process`]: supervision of the spawned command.
//! - [`harness`]: the state machine sequencing the lock window and the
//!   child's lifetime.

pub mod config;
pub mod harness;
pub mod index;
pub mod process;

pub use config::{Config, ConfigError};
pub use harness::{EXIT_FAILURE, Harness, HarnessError, HoldDuration};
pub use index::{IndexError, WriteHandle};
pub use process::{CommandSpec, ProcessError, SpawnedChild};

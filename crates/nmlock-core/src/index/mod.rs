//! Write-mode access to the mail index.
//!
//! The index's writer lock is an exclusive non-blocking `flock` on the
//! Xapian lock file inside the database directory. Keeping the
//! [`WriteHandle`] open IS the externally observable lock: any other
//! process attempting a write-mode open blocks out until this handle is
//! released, and the OS drops the flock the moment the file descriptor
//! closes.
//!
//! # Invariants
//!
//! - At most one `WriteHandle` is open per database within this process.
//! - The lock is released exactly once per successful open: either by the
//!   deliberate [`WriteHandle::release`] or by `Drop` on a failure path.
//!   It can never leak past an error.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::debug;

/// File whose `flock` serializes index writers.
const LOCK_FILE_NAME: &str = "flintlock";

/// Errors raised while opening or probing the index.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IndexError {
    /// The configured path does not point at an index directory.
    #[error("`{}` is not a mail index directory", path.display())]
    NotADatabase {
        /// The offending database path.
        path: PathBuf,
    },

    /// Another process already holds the write lock.
    #[error("index `{}` is already locked by another process", path.display())]
    AlreadyLocked {
        /// The contended database path.
        path: PathBuf,
    },

    /// Unexpected I/O failure while opening or probing the lock.
    #[error("index I/O error: {context}: {source}")]
    Io {
        /// Description of what was being attempted.
        context: String,
        /// Underlying I/O error.
        source: io::Error,
    },
}

impl IndexError {
    fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// RAII guard for the exclusively-held index write lock.
///
/// The lock window opens when [`WriteHandle::open`] returns and closes
/// when the handle is released or dropped; the underlying `flock` goes
/// away with the file descriptor.
pub struct WriteHandle {
    /// Lock file, held open for the lifetime of the handle.
    _lock_file: File,
    /// Database directory, for diagnostics.
    db_path: PathBuf,
}

impl fmt::Debug for WriteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteHandle")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl WriteHandle {
    /// Open the index in exclusive write mode.
    ///
    /// The database directory must already exist; the lock file itself is
    /// created on first use so a freshly initialized index works.
    ///
    /// # Errors
    ///
    /// Returns `IndexError::NotADatabase` if the path is not an existing
    /// directory, `IndexError::AlreadyLocked` if another process holds the
    /// write lock, and `IndexError::Io` on unexpected filesystem errors.
    pub fn open(db_path: &Path) -> Result<Self, IndexError> {
        if !db_path.is_dir() {
            return Err(IndexError::NotADatabase {
                path: db_path.to_path_buf(),
            });
        }

        let lock_path = lock_file_path(db_path);
        ensure_parent_dir(&lock_path)?;
        let lock_file = open_lock_file(&lock_path)?;

        match FileExt::try_lock_exclusive(&lock_file) {
            Ok(()) => {
                debug!(path = %db_path.display(), "index opened for writing");
                Ok(Self {
                    _lock_file: lock_file,
                    db_path: db_path.to_path_buf(),
                })
            },
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                Err(IndexError::AlreadyLocked {
                    path: db_path.to_path_buf(),
                })
            },
            Err(source) => Err(IndexError::io(
                format!("locking {}", lock_path.display()),
                source,
            )),
        }
    }

    /// Database directory this handle was opened on.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Release the write lock.
    ///
    /// Consumes the handle. Dropping the handle has the same effect, so a
    /// failure path that abandons the handle still releases the lock.
    pub fn release(self) {
        debug!(path = %self.db_path.display(), "index closed");
    }
}

/// Location of the writer lock file for a database directory.
#[must_use]
pub fn lock_file_path(db_path: &Path) -> PathBuf {
    db_path.join(".notmuch").join("xapian").join(LOCK_FILE_NAME)
}

/// Probe whether some process currently holds the write lock.
///
/// Acquires and immediately releases the `flock`, so the probe itself is
/// invisible to other lockers. A database that has never been opened for
/// writing reports unlocked.
///
/// # Errors
///
/// Returns `IndexError::Io` on unexpected filesystem errors.
pub fn is_locked(db_path: &Path) -> Result<bool, IndexError> {
    let lock_path = lock_file_path(db_path);
    if !lock_path.exists() {
        return Ok(false);
    }
    let lock_file = open_lock_file(&lock_path)?;
    match FileExt::try_lock_exclusive(&lock_file) {
        // Acquired: the drop of `lock_file` releases it again.
        Ok(()) => Ok(false),
        Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(true),
        Err(source) => Err(IndexError::io(
            format!("probing {}", lock_path.display()),
            source,
        )),
    }
}

fn open_lock_file(lock_path: &Path) -> Result<File, IndexError> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(lock_path)
        .map_err(|e| IndexError::io(format!("opening lock file {}", lock_path.display()), e))
}

fn ensure_parent_dir(path: &Path) -> Result<(), IndexError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| IndexError::io(format!("creating {}", parent.display()), e))?;
    }
    Ok(())
}

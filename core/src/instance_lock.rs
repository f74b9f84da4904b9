//! Process-wide single instance enforcement
//!
//! A non-blocking exclusive `flock` on a well-known file. The owner writes
//! its PID into the file so an operator can find (and signal) it. A second
//! launch fails fast with [`LockError::AlreadyRunning`] instead of waiting.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::os::fd::IntoRawFd;
use std::path::{Path, PathBuf};

use rustix::fs::{FlockOperation, Mode, OFlags};
use rustix::io::Errno;

use crate::error::LockError;

#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    /// `None` once released
    file: Option<File>,
}

impl InstanceLock {
    /// Open (or create, mode 0600) `path` and take an exclusive lock on it.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();

        let fd = rustix::fs::open(
            path.as_path(),
            OFlags::CREATE | OFlags::RDWR | OFlags::CLOEXEC,
            Mode::RUSR | Mode::WUSR,
        )
        .map_err(|e| LockError::Io {
            path: path.clone(),
            source: e.into(),
        })?;

        match rustix::fs::flock(&fd, FlockOperation::NonBlockingLockExclusive) {
            Ok(()) => {}
            Err(e) if e == Errno::WOULDBLOCK => return Err(LockError::AlreadyRunning { path }),
            Err(e) => {
                return Err(LockError::Io {
                    path,
                    source: e.into(),
                });
            }
        }

        tracing::debug!(path = %path.display(), "instance lock acquired");

        Ok(Self {
            path,
            file: Some(File::from(fd)),
        })
    }

    /// Replace the file contents with this process's PID and sync it to disk.
    ///
    /// Call after daemonizing so the recorded PID is the one that keeps
    /// running. Failure leaves the lock itself intact.
    pub fn report_pid(&mut self) -> Result<u32, LockError> {
        let io_err = |source| LockError::Io {
            path: self.path.clone(),
            source,
        };
        let Some(file) = self.file.as_mut() else {
            return Err(LockError::NotHeld {
                path: self.path.clone(),
            });
        };

        let pid = std::process::id();
        // A stale file from a crashed instance may hold a longer PID
        file.set_len(0).map_err(io_err)?;
        file.seek(SeekFrom::Start(0)).map_err(io_err)?;
        write!(file, "{pid}").map_err(io_err)?;
        file.sync_all().map_err(io_err)?;

        Ok(pid)
    }

    /// Remove the lock file, unlock and close it.
    ///
    /// Returns `false` if the lock was already released. Failures are
    /// logged and skipped so shutdown always completes.
    pub fn release(&mut self) -> bool {
        let Some(file) = self.file.take() else {
            return false;
        };

        // Unlink while still holding the lock so a newcomer can't lock the
        // old inode and then lose its file to us.
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove lock file");
        }

        if let Err(e) = rustix::fs::flock(&file, FlockOperation::Unlock) {
            tracing::warn!(path = %self.path.display(), error = %e, "unlock failed");
        }

        if let Err(e) = nix::unistd::close(file.into_raw_fd()) {
            tracing::warn!(path = %self.path.display(), error = %e, "close failed");
        }

        tracing::debug!(path = %self.path.display(), "instance lock released");
        true
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        self.release();
    }
}

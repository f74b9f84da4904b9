//! Error types for instance locking and process lifecycle

use std::path::PathBuf;
use thiserror::Error;

/// Errors while acquiring or updating the instance lock
#[derive(Debug, Error)]
pub enum LockError {
    #[error("finder is already running (lock held on {path})")]
    AlreadyRunning { path: PathBuf },

    #[error("I/O error on lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("instance lock {path} is no longer held")]
    NotHeld { path: PathBuf },
}

/// Errors while wiring up signals, daemonizing or starting threads
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to register handler for signal {signal}")]
    RegisterSignal {
        signal: i32,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to install fault handler for {signal}")]
    FaultHandler {
        signal: nix::sys::signal::Signal,
        #[source]
        source: nix::Error,
    },

    #[error("lock path {path} contains an interior NUL byte")]
    InvalidLockPath { path: PathBuf },

    #[error("failed to detach from the controlling terminal")]
    Daemonize(#[source] nix::Error),

    #[error("failed to spawn renderer thread")]
    SpawnRenderer(#[source] std::io::Error),

    #[error("display connection already closed")]
    DisplayClosed,
}

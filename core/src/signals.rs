//! Signal wiring
//!
//! Termination signals (`SIGINT`, `SIGTERM`) only raise an atomic flag; the
//! main thread notices it on its next hotkey tick and runs the real
//! teardown outside of signal context.
//!
//! Fault signals (`SIGABRT`, `SIGBUS`, `SIGSEGV`) can't return to the
//! faulting code, so their handler does the one thing that matters for the
//! next launch: it unlinks the lock file, then `_exit(0)`s. The kernel
//! drops the `flock` together with the process. Once shutdown starts
//! releasing the lock the handler is disarmed, so a late fault can't
//! delete a file that a newer instance has created in the meantime.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use signal_hook::consts::{SIGINT, SIGTERM};

use crate::error::LifecycleError;

pub const TERMINATION_SIGNALS: [i32; 2] = [SIGINT, SIGTERM];
pub const FAULT_SIGNALS: [Signal; 3] = [Signal::SIGABRT, Signal::SIGBUS, Signal::SIGSEGV];

/// Lock path the fault handler removes. Set once, before handlers exist.
static FAULT_LOCK_PATH: OnceLock<CString> = OnceLock::new();

/// Whether the fault handler may still unlink [`FAULT_LOCK_PATH`]
static FAULT_ARMED: AtomicBool = AtomicBool::new(false);

/// "Please shut down" flag raised from signal context
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag(&self) -> &AtomicBool {
        &self.requested
    }
}

/// Install every handler finder needs.
pub fn install(shutdown: &ShutdownSignal, lock_path: &Path) -> Result<(), LifecycleError> {
    install_termination_handlers(shutdown)?;
    install_fault_handlers(lock_path)
}

pub fn install_termination_handlers(shutdown: &ShutdownSignal) -> Result<(), LifecycleError> {
    for signal in TERMINATION_SIGNALS {
        signal_hook::flag::register(signal, Arc::clone(&shutdown.requested))
            .map_err(|source| LifecycleError::RegisterSignal { signal, source })?;
    }
    tracing::debug!(signals = ?TERMINATION_SIGNALS, "termination handlers installed");
    Ok(())
}

pub fn install_fault_handlers(lock_path: &Path) -> Result<(), LifecycleError> {
    let c_path = CString::new(lock_path.as_os_str().as_bytes()).map_err(|_| {
        LifecycleError::InvalidLockPath {
            path: lock_path.to_path_buf(),
        }
    })?;
    // A process holds one instance lock; a repeated install keeps the first path
    if FAULT_LOCK_PATH.set(c_path).is_err() {
        tracing::debug!("fault handler lock path already set");
    }

    // SA_RESETHAND: a fault inside the handler falls through to the default action
    let action = SigAction::new(
        SigHandler::Handler(on_fault),
        SaFlags::SA_RESETHAND,
        SigSet::empty(),
    );
    FAULT_ARMED.store(true, Ordering::Release);
    for signal in FAULT_SIGNALS {
        // SAFETY: `on_fault` only calls async-signal-safe functions (unlink, _exit)
        // and reads a OnceLock that is fully initialized before this point.
        unsafe { sigaction(signal, &action) }
            .map_err(|source| LifecycleError::FaultHandler { signal, source })?;
    }
    tracing::debug!(signals = ?FAULT_SIGNALS, "fault handlers installed");
    Ok(())
}

/// Stop the fault handler from touching the lock file. Called by shutdown
/// right before the lock is released; the handler still `_exit`s.
pub fn disarm_fault_handlers() {
    FAULT_ARMED.store(false, Ordering::Release);
}

extern "C" fn on_fault(_signal: nix::libc::c_int) {
    if !FAULT_ARMED.load(Ordering::Acquire) {
        // SAFETY: _exit(2) is async-signal-safe and never returns.
        unsafe { nix::libc::_exit(0) }
    }
    if let Some(path) = FAULT_LOCK_PATH.get() {
        // SAFETY: unlink(2) is async-signal-safe; `path` is a valid NUL-terminated
        // string that lives in a static for the rest of the process.
        unsafe {
            nix::libc::unlink(path.as_ptr());
        }
    }
    // SAFETY: _exit(2) is async-signal-safe and never returns.
    unsafe { nix::libc::_exit(0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_the_flag() {
        let shutdown = ShutdownSignal::new();
        let clone = shutdown.clone();
        assert!(!shutdown.flag().load(Ordering::Acquire));
        clone.requested.store(true, Ordering::Release);
        assert!(shutdown.flag().load(Ordering::Acquire));
    }

    #[test]
    fn test_nul_in_lock_path_is_rejected() {
        let path = Path::new("/tmp/fin\0der");
        assert!(matches!(
            install_fault_handlers(path),
            Err(LifecycleError::InvalidLockPath { .. })
        ));
    }
}

//! Fault signals remove the lock file on the way out
//!
//! A fault kills the process, so each case re-runs this test binary as a
//! child that sets up the lock, raises the signal and dies. The parent
//! checks what the child left behind.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::Arc;
use std::time::Duration;

use finder_core::signals::install_fault_handlers;
use finder_core::{InstanceLock, Lifecycle, SharedState};
use signal_hook::consts::{SIGABRT, SIGBUS, SIGSEGV};

const CHILD_LOCK: &str = "FINDER_FAULT_LOCK";
const CHILD_SIGNAL: &str = "FINDER_FAULT_SIGNAL";

/// Re-run only `test_name` in a child process
fn run_child(test_name: &str, lock_path: &Path, signal: i32) -> ExitStatus {
    Command::new(std::env::current_exe().unwrap())
        .args([test_name, "--exact", "--test-threads=1", "--nocapture"])
        .env(CHILD_LOCK, lock_path)
        .env(CHILD_SIGNAL, signal.to_string())
        .status()
        .unwrap()
}

/// Set when running as the child
fn child_setup() -> Option<(PathBuf, i32)> {
    let lock_path = PathBuf::from(std::env::var_os(CHILD_LOCK)?);
    let signal = std::env::var(CHILD_SIGNAL).ok()?.parse().ok()?;
    Some((lock_path, signal))
}

fn raise_fault(signal: i32) -> ! {
    signal_hook::low_level::raise(signal).unwrap();
    panic!("fault handler for signal {signal} returned");
}

#[test]
fn test_fault_signal_removes_lock_file() {
    if let Some((lock_path, signal)) = child_setup() {
        let mut lock = InstanceLock::acquire(&lock_path).unwrap();
        lock.report_pid().unwrap();
        install_fault_handlers(&lock_path).unwrap();
        raise_fault(signal);
    }

    for signal in [SIGSEGV, SIGBUS, SIGABRT] {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("finder");

        let status = run_child("test_fault_signal_removes_lock_file", &path, signal);

        assert_eq!(status.code(), Some(0), "signal {signal}: {status:?}");
        assert!(!path.exists(), "signal {signal} left the lock file behind");
        assert!(InstanceLock::acquire(&path).is_ok());
    }
}

#[test]
fn test_fault_after_shutdown_spares_new_lock_file() {
    if let Some((lock_path, signal)) = child_setup() {
        let lock = InstanceLock::acquire(&lock_path).unwrap();
        install_fault_handlers(&lock_path).unwrap();

        let (_state, _visibility, run) = SharedState::new();
        let mut lifecycle = Lifecycle::new(lock, Arc::new(()), run, Duration::from_millis(50));
        lifecycle.shutdown();

        // A new instance claims the path before this process is gone
        std::fs::write(&lock_path, "newcomer").unwrap();
        raise_fault(signal);
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("finder");

    let status = run_child("test_fault_after_shutdown_spares_new_lock_file", &path, SIGSEGV);

    assert_eq!(status.code(), Some(0), "{status:?}");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "newcomer");
}

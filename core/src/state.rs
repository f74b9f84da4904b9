//! State shared between the main thread and the renderer thread
//!
//! Two flags, each with exactly one writer:
//!
//! | flag      | writer                         | reader   |
//! |-----------|--------------------------------|----------|
//! | `visible` | hotkey poller ([`VisibilityWriter`]) | renderer |
//! | `running` | lifecycle ([`RunController`])  | renderer |
//!
//! The writer handles are not `Clone` and can only be obtained from
//! [`SharedState::new`], so the single-writer rule is carried by ownership.
//! The condvar only shortens the renderer's sleeps; the flags themselves
//! are plain atomics and a missed wakeup costs at most one poll period.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug)]
pub struct SharedState {
    running: AtomicBool,
    visible: AtomicBool,
    wake: Mutex<()>,
    changed: Condvar,
}

impl SharedState {
    /// Create the state with `running = true`, `visible = false`, plus the
    /// only two handles allowed to write it.
    pub fn new() -> (Arc<Self>, VisibilityWriter, RunController) {
        let state = Arc::new(Self {
            running: AtomicBool::new(true),
            visible: AtomicBool::new(false),
            wake: Mutex::new(()),
            changed: Condvar::new(),
        });
        let visibility = VisibilityWriter {
            state: Arc::clone(&state),
        };
        let run = RunController {
            state: Arc::clone(&state),
        };
        (state, visibility, run)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }

    /// Wait up to `timeout` for the overlay to be requested.
    ///
    /// Returns true if the caller should start painting.
    pub fn wait_for_visible(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, |s| s.is_visible() || !s.is_running());
        self.is_visible() && self.is_running()
    }

    /// Wait up to `timeout` for the overlay to be released or for shutdown.
    ///
    /// Returns true while the overlay should stay on screen.
    pub fn wait_while_visible(&self, timeout: Duration) -> bool {
        !self.wait_until(timeout, |s| !s.is_visible() || !s.is_running())
    }

    fn wait_until(&self, timeout: Duration, done: impl Fn(&Self) -> bool) -> bool {
        let guard = self.wake.lock().unwrap_or_else(PoisonError::into_inner);
        if done(self) {
            return true;
        }
        let _ = self
            .changed
            .wait_timeout_while(guard, timeout, |_| !done(self))
            .unwrap_or_else(PoisonError::into_inner);
        done(self)
    }

    fn notify(&self) {
        // Taking the lock orders the store before a waiter's predicate check
        let _guard = self.wake.lock().unwrap_or_else(PoisonError::into_inner);
        self.changed.notify_all();
    }
}

/// Sole writer of the `visible` flag
#[derive(Debug)]
pub struct VisibilityWriter {
    state: Arc<SharedState>,
}

impl VisibilityWriter {
    /// Store `visible`; returns true if the value changed.
    pub fn set(&self, visible: bool) -> bool {
        let previous = self.state.visible.swap(visible, Ordering::AcqRel);
        if previous != visible {
            self.state.notify();
        }
        previous != visible
    }

    pub fn get(&self) -> bool {
        self.state.is_visible()
    }
}

/// Sole writer of the `running` flag. It only ever goes true -> false.
#[derive(Debug)]
pub struct RunController {
    state: Arc<SharedState>,
}

impl RunController {
    /// Clear `running`. Returns true for the call that actually stopped it.
    pub fn stop(&self) -> bool {
        let was_running = self.state.running.swap(false, Ordering::AcqRel);
        if was_running {
            self.state.notify();
        }
        was_running
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }
}

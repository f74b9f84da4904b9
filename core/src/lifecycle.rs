//! Process lifecycle
//!
//! [`Lifecycle`] owns everything that must be torn down exactly once and
//! only on the main thread: the run flag, the renderer thread handle, the
//! display connection and the instance lock.
//!
//! ```text
//! shutdown()
//!   1. running = false        (renderer wakes up)
//!   2. join renderer          (bounded by the grace period)
//!   3. close display          (drop the last handle)
//!   4. release instance lock  (disarm fault handler, unlink + unlock + close)
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::LifecycleError;
use crate::instance_lock::InstanceLock;
use crate::state::RunController;

/// How often shutdown checks whether the renderer has finished
const JOIN_POLL: Duration = Duration::from_millis(1);

pub struct Lifecycle<D: Send + Sync + 'static> {
    run: RunController,
    renderer: Option<JoinHandle<()>>,
    display: Option<Arc<D>>,
    lock: InstanceLock,
    grace: Duration,
}

impl<D: Send + Sync + 'static> Lifecycle<D> {
    pub fn new(lock: InstanceLock, display: Arc<D>, run: RunController, grace: Duration) -> Self {
        Self {
            run,
            renderer: None,
            display: Some(display),
            lock,
            grace,
        }
    }

    /// Start the renderer thread. It gets a shared handle to the display but
    /// never closes it; that happens in [`shutdown`](Self::shutdown).
    pub fn spawn_renderer<F>(&mut self, render: F) -> Result<(), LifecycleError>
    where
        F: FnOnce(Arc<D>) + Send + 'static,
    {
        let display = self
            .display
            .as_ref()
            .map(Arc::clone)
            .ok_or(LifecycleError::DisplayClosed)?;

        let handle = thread::Builder::new()
            .name("finder-renderer".to_string())
            .spawn(move || render(display))
            .map_err(LifecycleError::SpawnRenderer)?;

        self.renderer = Some(handle);
        Ok(())
    }

    /// The display connection, until shutdown closes it
    pub fn display(&self) -> Option<&D> {
        self.display.as_deref()
    }

    /// Tear everything down. Returns `false` if shutdown already ran.
    pub fn shutdown(&mut self) -> bool {
        if !self.run.stop() {
            return false;
        }
        tracing::info!("shutting down");

        if let Some(handle) = self.renderer.take() {
            self.join_renderer(handle);
        }

        if let Some(display) = self.display.take() {
            if Arc::strong_count(&display) > 1 {
                tracing::warn!("renderer still holds the display; it closes at exit");
            }
            drop(display);
            tracing::debug!("display connection closed");
        }

        crate::signals::disarm_fault_handlers();
        self.lock.release();
        tracing::info!("shutdown complete");
        true
    }

    fn join_renderer(&self, handle: JoinHandle<()>) {
        let deadline = Instant::now() + self.grace;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                tracing::warn!(
                    grace_ms = self.grace.as_millis() as u64,
                    "renderer did not stop in time, detaching"
                );
                return;
            }
            thread::sleep(JOIN_POLL);
        }
        if handle.join().is_err() {
            tracing::error!("renderer thread panicked");
        }
    }
}

impl<D: Send + Sync + 'static> Drop for Lifecycle<D> {
    fn drop(&mut self) {
        // Early returns in main still release the lock
        self.shutdown();
    }
}

/// Detach from the controlling terminal: fork, new session, chdir `/`,
/// standard streams to `/dev/null`.
///
/// Must run before any thread is spawned.
pub fn daemonize() -> Result<(), LifecycleError> {
    nix::unistd::daemon(false, false).map_err(LifecycleError::Daemonize)
}

//! Runtime configuration
//!
//! finder has no configuration file. Every knob lives here with its
//! compiled-in default; the command line only chooses daemon mode.

use std::path::PathBuf;
use std::time::Duration;

/// Well-known lock file location (tmpfs, gone after reboot)
pub const DEFAULT_LOCK_PATH: &str = "/dev/shm/finder";

/// X11 keysym for the Pause key
pub const XK_PAUSE: u32 = 0xff13;

/// Hotkey poll period on the main thread
pub const HOTKEY_POLL: Duration = Duration::from_millis(100);

/// Renderer re-check period while nothing is shown
pub const IDLE_POLL: Duration = Duration::from_millis(10);

/// Renderer re-check period while the overlay is held on screen
pub const HOLD_POLL: Duration = Duration::from_millis(1);

/// Upper bound on how long shutdown waits for the renderer thread
pub const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinderConfig {
    pub lock_path: PathBuf,
    /// Keysym of the key that shows the overlay while held
    pub hotkey: u32,
    pub hotkey_poll: Duration,
    pub idle_poll: Duration,
    pub hold_poll: Duration,
    pub shutdown_grace: Duration,
    /// Detach from the terminal before opening the display
    pub daemonize: bool,
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            lock_path: PathBuf::from(DEFAULT_LOCK_PATH),
            hotkey: XK_PAUSE,
            hotkey_poll: HOTKEY_POLL,
            idle_poll: IDLE_POLL,
            hold_poll: HOLD_POLL,
            shutdown_grace: SHUTDOWN_GRACE,
            daemonize: false,
        }
    }
}

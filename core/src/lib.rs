//! Finder Core Library
//!
//! Everything in finder that does not talk to the display server:
//!
//! - [`instance_lock`]: single instance enforcement through an advisory lock file
//! - [`state`]: the `running` / `visible` flags shared by the two threads
//! - [`hotkey`]: edge-triggered polling of the hotkey's pressed state
//! - [`signals`] and [`lifecycle`]: signal wiring and the single shutdown path

pub mod config;
pub mod error;
pub mod hotkey;
pub mod instance_lock;
pub mod lifecycle;
pub mod signals;
pub mod state;

pub use config::FinderConfig;
pub use error::{LifecycleError, LockError};
pub use hotkey::{HotkeyPoller, KeyboardSource, KeyboardState};
pub use instance_lock::InstanceLock;
pub use lifecycle::Lifecycle;
pub use signals::ShutdownSignal;
pub use state::{RunController, SharedState, VisibilityWriter};

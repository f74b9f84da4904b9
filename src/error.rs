use finder_core::{LifecycleError, LockError};
use finder_overlay::PlatformError;
use thiserror::Error;

/// Anything that stops finder before the hotkey loop starts. All map to exit 1.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Display(#[from] PlatformError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}

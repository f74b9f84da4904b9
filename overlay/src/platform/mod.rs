//! Platform abstraction for the display server
//!
//! The renderer only needs a handful of capabilities: list screens, put a
//! full-screen overlay on one, ask where the pointer is, and flush. They
//! are expressed as traits so the render loop can run against a fake.

use thiserror::Error;

use crate::renderer::StrokeCanvas;

pub mod x11;

/// One screen of the display, as enumerated at the start of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenInfo {
    /// Position in the display's screen list
    pub index: usize,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// Where the pointer was when the pass queried it. Never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerSample {
    pub screen: usize,
    pub root_x: i32,
    pub root_y: i32,
    /// Relative to the overlay window (which covers the whole screen)
    pub local_x: i32,
    pub local_y: i32,
}

impl PointerSample {
    pub fn local(&self) -> (i32, i32) {
        (self.local_x, self.local_y)
    }
}

/// Errors that can occur in platform operations
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Could not open the display connection
    #[error("failed to connect to display: {0}")]
    ConnectionFailed(String),

    /// Screen has no depth-32 TrueColor visual
    #[error("no 32-bit TrueColor visual on screen {screen}")]
    VisualUnavailable { screen: usize },

    #[error("pointer query failed on screen {screen}: {reason}")]
    PointerQueryFailed { screen: usize, reason: String },

    #[error("no screen with index {0}")]
    NoSuchScreen(usize),

    /// Shared memory / pixel buffer allocation failed
    #[error("buffer error: {0}")]
    BufferError(String),

    /// A protocol request or its reply failed
    #[error("request failed: {0}")]
    Request(String),
}

impl PlatformError {
    pub(crate) fn request(e: impl std::fmt::Display) -> Self {
        Self::Request(e.to_string())
    }
}

/// A transient full-screen overlay window.
///
/// Created mapped and empty. Dropping it tears it down: drawing context,
/// window, colormap, in that order.
pub trait OverlaySurface {
    type Canvas: StrokeCanvas;

    fn canvas(&mut self) -> &mut Self::Canvas;

    /// Push what was drawn to the screen and flush immediately
    fn present(&mut self) -> Result<(), PlatformError>;
}

/// The display connection, as seen by the renderer thread
pub trait DisplayBackend: Send + Sync {
    type Surface<'a>: OverlaySurface
    where
        Self: 'a;

    /// Enumerate screens. Called once per visible episode.
    fn screens(&self) -> Vec<ScreenInfo>;

    /// Borderless, override-redirect, transparent window covering `screen`,
    /// already mapped.
    fn create_overlay(&self, screen: &ScreenInfo) -> Result<Self::Surface<'_>, PlatformError>;

    fn query_pointer(&self, screen: &ScreenInfo) -> Result<PointerSample, PlatformError>;

    fn flush(&self) -> Result<(), PlatformError>;
}

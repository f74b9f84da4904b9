//! Finder Overlay Library
//!
//! Draws the pointer burst on every X11 screen while the hotkey is held.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    overlay                          │
//! │                 OverlayRenderer                     │
//! │      (idle wait, paint pass, hold, teardown)        │
//! ├─────────────────────────────────────────────────────┤
//! │                     grid                            │
//! │       border points -> lines to the pointer         │
//! ├─────────────────────────────────────────────────────┤
//! │                   renderer                          │
//! │         StrokeCanvas, tiny-skia PixmapCanvas        │
//! ├─────────────────────────────────────────────────────┤
//! │                   platform/                         │
//! │          DisplayBackend traits, x11 (x11rb)         │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod grid;
pub mod overlay;
pub mod platform;
pub mod renderer;

// Re-export commonly used types
pub use overlay::{OverlayRenderer, RenderTiming};
pub use platform::x11::X11Display;
pub use platform::{DisplayBackend, OverlaySurface, PlatformError, PointerSample, ScreenInfo};
pub use renderer::{OverlayStyle, PixmapCanvas, StrokeCanvas, colors};

// Re-export tiny_skia Color for external use
pub use tiny_skia::Color;

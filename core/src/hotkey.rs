//! Hotkey polling
//!
//! The main thread samples the whole keyboard bitmap every tick and flips
//! the shared `visible` flag on press/release edges of one key.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::state::VisibilityWriter;

/// Size of the keyboard bitmap: one bit per keycode, 256 keycodes
pub const KEYMAP_BYTES: usize = 32;

/// Snapshot of which physical keys are down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyboardState {
    keys: [u8; KEYMAP_BYTES],
}

impl KeyboardState {
    pub fn new(keys: [u8; KEYMAP_BYTES]) -> Self {
        Self { keys }
    }

    pub fn is_pressed(&self, keycode: u8) -> bool {
        self.keys[usize::from(keycode >> 3)] & (1 << (keycode & 7)) != 0
    }

    /// Copy of this snapshot with `keycode` held down
    pub fn with_pressed(mut self, keycode: u8) -> Self {
        self.keys[usize::from(keycode >> 3)] |= 1 << (keycode & 7);
        self
    }
}

/// Where keyboard snapshots come from (the display server in production)
pub trait KeyboardSource {
    type Error: std::fmt::Display;

    /// Query the live state of every key
    fn query_keymap(&self) -> Result<KeyboardState, Self::Error>;

    /// Translate a keysym to the physical keycode currently producing it
    fn keycode_for(&self, keysym: u32) -> Option<u8>;
}

pub struct HotkeyPoller<'a, K: KeyboardSource> {
    source: &'a K,
    keysym: u32,
    visibility: VisibilityWriter,
    interval: Duration,
    warned_unmapped: bool,
}

impl<'a, K: KeyboardSource> HotkeyPoller<'a, K> {
    pub fn new(source: &'a K, keysym: u32, visibility: VisibilityWriter, interval: Duration) -> Self {
        Self {
            source,
            keysym,
            visibility,
            interval,
            warned_unmapped: false,
        }
    }

    /// Sample the keyboard once.
    ///
    /// Returns the new visibility if this tick saw an edge.
    pub fn tick(&mut self) -> Option<bool> {
        let pressed = self.hotkey_pressed()?;
        let visible = self.visibility.get();

        if pressed != visible {
            self.visibility.set(pressed);
            tracing::debug!(visible = pressed, "hotkey edge");
            Some(pressed)
        } else {
            None
        }
    }

    /// Poll until `stop` is raised. Checked once per tick.
    pub fn run_until(&mut self, stop: &AtomicBool) {
        tracing::info!("watching hotkey keysym {:#x}", self.keysym);
        while !stop.load(Ordering::Acquire) {
            self.tick();
            thread::sleep(self.interval);
        }
        tracing::debug!("hotkey poller stopped");
    }

    /// `None` means no usable sample this tick
    fn hotkey_pressed(&mut self) -> Option<bool> {
        let keymap = match self.source.query_keymap() {
            Ok(keymap) => keymap,
            Err(e) => {
                tracing::debug!(error = %e, "keymap query failed");
                return None;
            }
        };

        let Some(keycode) = self.source.keycode_for(self.keysym) else {
            if !self.warned_unmapped {
                tracing::warn!("hotkey keysym {:#x} is not mapped to any key", self.keysym);
                self.warned_unmapped = true;
            }
            return None;
        };
        self.warned_unmapped = false;

        Some(keymap.is_pressed(keycode))
    }

}

//! The renderer loop
//!
//! Runs on its own thread. While the hotkey is up it only waits on the
//! shared state. Once it is pressed the screens are visited in order: each
//! one gets a fresh overlay with the pointer burst, which stays up until
//! the key is released (or the process is stopping) and is torn down before
//! the next screen is visited.

use std::time::Duration;

use finder_core::{FinderConfig, SharedState};

use crate::grid::paint_radial_grid;
use crate::platform::{DisplayBackend, OverlaySurface, PlatformError, ScreenInfo};
use crate::renderer::OverlayStyle;

/// Maximum re-check intervals for the two waiting states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTiming {
    pub idle_poll: Duration,
    pub hold_poll: Duration,
}

impl Default for RenderTiming {
    fn default() -> Self {
        Self::from(&FinderConfig::default())
    }
}

impl From<&FinderConfig> for RenderTiming {
    fn from(config: &FinderConfig) -> Self {
        Self {
            idle_poll: config.idle_poll,
            hold_poll: config.hold_poll,
        }
    }
}

pub struct OverlayRenderer<'a, B: DisplayBackend> {
    backend: &'a B,
    style: OverlayStyle,
    timing: RenderTiming,
}

impl<'a, B: DisplayBackend> OverlayRenderer<'a, B> {
    pub fn new(backend: &'a B, style: OverlayStyle, timing: RenderTiming) -> Self {
        Self {
            backend,
            style,
            timing,
        }
    }

    /// Loop until `running` goes false
    pub fn run(&self, state: &SharedState) {
        tracing::debug!("renderer started");
        let mut episodes: u64 = 0;

        while state.is_running() {
            if !state.wait_for_visible(self.timing.idle_poll) {
                continue;
            }
            let shown = self.show_episode(state);
            episodes += 1;
            tracing::debug!(screens = shown, "overlay cleared");
        }

        tracing::debug!(episodes, "renderer stopped");
    }

    /// One pass over the screens: each gets its overlay, held while the
    /// key stays down, then torn down before the next screen is touched.
    ///
    /// Returns how many screens actually got an overlay.
    pub fn show_episode(&self, state: &SharedState) -> usize {
        let mut shown = 0;

        for screen in self.backend.screens() {
            if !state.is_running() {
                break;
            }
            let surface = match self.paint_screen(&screen) {
                Ok(surface) => surface,
                Err(PlatformError::VisualUnavailable { screen }) => {
                    tracing::debug!(screen, "no 32-bit visual, skipping screen");
                    continue;
                }
                Err(e) => {
                    tracing::debug!(screen = screen.index, error = %e, "overlay failed, skipping screen");
                    continue;
                }
            };
            shown += 1;

            while state.wait_while_visible(self.timing.hold_poll) {}

            drop(surface);
            if let Err(e) = self.backend.flush() {
                tracing::debug!(screen = screen.index, error = %e, "flush after teardown failed");
            }
        }

        shown
    }

    fn paint_screen(&self, screen: &ScreenInfo) -> Result<B::Surface<'a>, PlatformError> {
        let mut surface = self.backend.create_overlay(screen)?;

        match self.backend.query_pointer(screen) {
            Ok(pointer) => paint_radial_grid(
                surface.canvas(),
                screen.width,
                screen.height,
                pointer.local(),
                &self.style,
            ),
            // Keep the empty overlay up; the next episode queries again
            Err(e) => tracing::debug!(error = %e, "pointer unavailable, overlay left empty"),
        }

        surface.present()?;
        Ok(surface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PointerSample;
    use crate::renderer::StrokeCanvas;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use tiny_skia::Color;

    #[derive(Default)]
    struct CountingCanvas {
        lines: usize,
        strokes: usize,
    }

    impl StrokeCanvas for CountingCanvas {
        fn set_color(&mut self, _color: Color) {}
        fn set_line_width(&mut self, _width: f32) {}
        fn move_to(&mut self, _x: f32, _y: f32) {}
        fn line_to(&mut self, _x: f32, _y: f32) {
            self.lines += 1;
        }
        fn stroke(&mut self) {
            self.strokes += 1;
        }
    }

    /// Counts every windowing call the renderer makes
    #[derive(Default)]
    struct FakeBackend {
        screens: Vec<ScreenInfo>,
        no_visual: HashSet<usize>,
        no_pointer: HashSet<usize>,
        enumerations: AtomicUsize,
        created: AtomicUsize,
        destroyed: AtomicUsize,
        /// Most overlays alive at once
        peak_live: AtomicUsize,
        flushes: AtomicUsize,
        /// (screen, lines, strokes) per present
        presented: Mutex<Vec<(usize, usize, usize)>>,
    }

    impl FakeBackend {
        fn with_screens(count: usize) -> Self {
            Self {
                screens: (0..count)
                    .map(|index| ScreenInfo {
                        index,
                        width: 1920,
                        height: 1080,
                    })
                    .collect(),
                ..Default::default()
            }
        }

        fn created(&self) -> usize {
            self.created.load(Ordering::SeqCst)
        }

        fn destroyed(&self) -> usize {
            self.destroyed.load(Ordering::SeqCst)
        }
    }

    struct FakeSurface<'a> {
        backend: &'a FakeBackend,
        screen: usize,
        canvas: CountingCanvas,
    }

    impl OverlaySurface for FakeSurface<'_> {
        type Canvas = CountingCanvas;

        fn canvas(&mut self) -> &mut CountingCanvas {
            &mut self.canvas
        }

        fn present(&mut self) -> Result<(), PlatformError> {
            self.backend.presented.lock().unwrap().push((
                self.screen,
                self.canvas.lines,
                self.canvas.strokes,
            ));
            Ok(())
        }
    }

    impl Drop for FakeSurface<'_> {
        fn drop(&mut self) {
            self.backend.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl DisplayBackend for FakeBackend {
        type Surface<'a> = FakeSurface<'a>;

        fn screens(&self) -> Vec<ScreenInfo> {
            self.enumerations.fetch_add(1, Ordering::SeqCst);
            self.screens.clone()
        }

        fn create_overlay(&self, screen: &ScreenInfo) -> Result<FakeSurface<'_>, PlatformError> {
            if self.no_visual.contains(&screen.index) {
                return Err(PlatformError::VisualUnavailable {
                    screen: screen.index,
                });
            }
            let created = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            let live = created - self.destroyed();
            self.peak_live.fetch_max(live, Ordering::SeqCst);
            Ok(FakeSurface {
                backend: self,
                screen: screen.index,
                canvas: CountingCanvas::default(),
            })
        }

        fn query_pointer(&self, screen: &ScreenInfo) -> Result<PointerSample, PlatformError> {
            if self.no_pointer.contains(&screen.index) {
                return Err(PlatformError::PointerQueryFailed {
                    screen: screen.index,
                    reason: "pointer is on another screen".into(),
                });
            }
            Ok(PointerSample {
                screen: screen.index,
                root_x: 100,
                root_y: 200,
                local_x: 100,
                local_y: 200,
            })
        }

        fn flush(&self) -> Result<(), PlatformError> {
            self.flushes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fast_timing() -> RenderTiming {
        RenderTiming {
            idle_poll: Duration::from_millis(1),
            hold_poll: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_timing_follows_config() {
        let timing = RenderTiming::default();
        assert_eq!(timing.idle_poll, Duration::from_millis(10));
        assert_eq!(timing.hold_poll, Duration::from_millis(1));
    }

    #[test]
    fn test_idle_makes_no_windowing_calls() {
        let backend = FakeBackend::with_screens(2);
        let (state, _visibility, run) = SharedState::new();
        let renderer = OverlayRenderer::new(&backend, OverlayStyle::default(), fast_timing());

        thread::scope(|s| {
            let handle = s.spawn(|| renderer.run(&state));
            thread::sleep(Duration::from_millis(50));
            run.stop();
            handle.join().unwrap();
        });

        assert_eq!(backend.enumerations.load(Ordering::SeqCst), 0);
        assert_eq!(backend.created(), 0);
        assert_eq!(backend.flushes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_episode_holds_one_screen_at_a_time() {
        let backend = FakeBackend::with_screens(2);
        let (state, visibility, _run) = SharedState::new();
        let renderer = OverlayRenderer::new(&backend, OverlayStyle::default(), fast_timing());
        visibility.set(true);

        let (shown, during_hold) = thread::scope(|s| {
            let handle = s.spawn(|| renderer.show_episode(&state));
            thread::sleep(Duration::from_millis(30));
            let during_hold = (backend.created(), backend.destroyed());
            visibility.set(false);
            (handle.join().unwrap(), during_hold)
        });

        // Only the first screen is up while the key is held
        assert_eq!(during_hold, (1, 0));
        // After release the remaining screen is still visited and torn down
        assert_eq!(shown, 2);
        assert_eq!(backend.destroyed(), 2);
        assert_eq!(backend.peak_live.load(Ordering::SeqCst), 1);
        assert_eq!(backend.flushes.load(Ordering::SeqCst), 2);
        assert_eq!(
            *backend.presented.lock().unwrap(),
            vec![(0, 32, 1), (1, 32, 1)]
        );
    }

    #[test]
    fn test_screen_without_visual_is_skipped() {
        let mut backend = FakeBackend::with_screens(2);
        backend.no_visual.insert(0);
        let (state, visibility, _run) = SharedState::new();
        let renderer = OverlayRenderer::new(&backend, OverlayStyle::default(), fast_timing());
        visibility.set(true);

        let shown = thread::scope(|s| {
            let handle = s.spawn(|| renderer.show_episode(&state));
            thread::sleep(Duration::from_millis(20));
            visibility.set(false);
            handle.join().unwrap()
        });

        assert_eq!(shown, 1);
        assert_eq!(*backend.presented.lock().unwrap(), vec![(1, 32, 1)]);
    }

    #[test]
    fn test_pointer_failure_keeps_empty_overlay() {
        let mut backend = FakeBackend::with_screens(1);
        backend.no_pointer.insert(0);
        let (state, visibility, _run) = SharedState::new();
        let renderer = OverlayRenderer::new(&backend, OverlayStyle::default(), fast_timing());
        visibility.set(true);

        let shown = thread::scope(|s| {
            let handle = s.spawn(|| renderer.show_episode(&state));
            thread::sleep(Duration::from_millis(20));
            visibility.set(false);
            handle.join().unwrap()
        });

        assert_eq!(shown, 1);
        assert_eq!(*backend.presented.lock().unwrap(), vec![(0, 0, 0)]);
        assert_eq!(backend.destroyed(), 1);
    }

    #[test]
    fn test_stopped_state_creates_nothing() {
        let backend = FakeBackend::with_screens(3);
        let (state, visibility, run) = SharedState::new();
        let renderer = OverlayRenderer::new(&backend, OverlayStyle::default(), fast_timing());
        visibility.set(true);
        run.stop();

        assert_eq!(renderer.show_episode(&state), 0);
        assert_eq!(backend.created(), 0);
    }

    #[test]
    fn test_stop_mid_hold_tears_down_and_exits() {
        let backend = Arc::new(FakeBackend::with_screens(2));
        let (state, visibility, run) = SharedState::new();
        visibility.set(true);

        let worker = {
            let backend = Arc::clone(&backend);
            let state = Arc::clone(&state);
            thread::spawn(move || {
                OverlayRenderer::new(&*backend, OverlayStyle::default(), fast_timing()).run(&state)
            })
        };

        thread::sleep(Duration::from_millis(30));
        let created_during_hold = backend.created();
        run.stop();
        worker.join().unwrap();

        // Key is still held, but the held overlay was torn down and the
        // second screen was never visited
        assert_eq!(created_during_hold, 1);
        assert!(state.is_visible());
        assert_eq!(backend.created(), 1);
        assert_eq!(backend.destroyed(), 1);
    }
}

//! X11 backend
//!
//! Uses XCB via x11rb. Each overlay is an override-redirect window with a
//! 32-bit ARGB visual (transparent background under a compositor) and an
//! empty input shape, so clicks fall through to whatever is below. Pixels
//! are rasterized by tiny-skia and uploaded through MIT-SHM, or with plain
//! `PutImage` requests where shared memory is unavailable (remote displays).

use std::fs::File;
use std::os::fd::AsFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use finder_core::{KeyboardSource, KeyboardState};
use rustix::fs::{MemfdFlags, memfd_create};
use rustix::mm::{MapFlags, ProtFlags, mmap};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::shape::{self, ConnectionExt as _};
use x11rb::protocol::shm::{self, ConnectionExt as _};
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;

use super::{DisplayBackend, OverlaySurface, PlatformError, PointerSample, ScreenInfo};
use crate::renderer::PixmapCanvas;

// ─────────────────────────────────────────────────────────────────────────────
// Display Connection
// ─────────────────────────────────────────────────────────────────────────────

/// The process-wide X server connection
pub struct X11Display {
    conn: RustConnection,
    /// Shape extension present (needed for click-through)
    shape: bool,
    /// SHM usable; cleared after the first failed attach
    shm: AtomicBool,
    /// Keyboard mapping, fetched on demand
    keysyms: Mutex<Option<KeysymTable>>,
}

impl X11Display {
    /// Connect to `$DISPLAY`. Fails only if the server is unreachable.
    pub fn open() -> Result<Self, PlatformError> {
        let (conn, default_screen) =
            x11rb::connect(None).map_err(|e| PlatformError::ConnectionFailed(e.to_string()))?;

        let shm = conn
            .shm_query_version()
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .is_some();
        if !shm {
            tracing::info!("SHM extension missing, uploading pixels with PutImage");
        }

        let shape = conn
            .shape_query_version()
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .is_some();
        if !shape {
            tracing::warn!("shape extension missing, overlays will swallow clicks");
        }

        tracing::info!(
            screens = conn.setup().roots.len(),
            default_screen,
            "connected to X server"
        );

        Ok(Self {
            conn,
            shape,
            shm: AtomicBool::new(shm),
            keysyms: Mutex::new(None),
        })
    }

    fn fetch_keysyms(&self) -> Option<KeysymTable> {
        let setup = self.conn.setup();
        let min_keycode = setup.min_keycode;
        let count = setup.max_keycode.saturating_sub(min_keycode).saturating_add(1);

        let mapping = match self
            .conn
            .get_keyboard_mapping(min_keycode, count)
            .map_err(PlatformError::request)
            .and_then(|cookie| cookie.reply().map_err(PlatformError::request))
        {
            Ok(mapping) => mapping,
            Err(e) => {
                tracing::debug!(error = %e, "keyboard mapping query failed");
                return None;
            }
        };

        Some(KeysymTable {
            min_keycode,
            per_keycode: usize::from(mapping.keysyms_per_keycode),
            keysyms: mapping.keysyms,
        })
    }

    fn screen(&self, index: usize) -> Result<&Screen, PlatformError> {
        self.conn
            .setup()
            .roots
            .get(index)
            .ok_or(PlatformError::NoSuchScreen(index))
    }
}

/// Find a 32-bit TrueColor visual for transparency
fn find_argb_visual(screen: &Screen) -> Option<(Visualid, u8)> {
    for depth in &screen.allowed_depths {
        if depth.depth == 32 {
            for visual in &depth.visuals {
                if visual.class == VisualClass::TRUE_COLOR {
                    return Some((visual.visual_id, depth.depth));
                }
            }
        }
    }
    None
}

/// Keysyms for every keycode, `per_keycode` columns per row
struct KeysymTable {
    min_keycode: u8,
    per_keycode: usize,
    keysyms: Vec<Keysym>,
}

impl KeysymTable {
    /// First keycode producing `keysym`, searching column 0 of every
    /// keycode before moving on to the next column (like `XKeysymToKeycode`)
    fn lookup(&self, keysym: Keysym) -> Option<u8> {
        if keysym == x11rb::NO_SYMBOL || self.per_keycode == 0 {
            return None;
        }

        (0..self.per_keycode)
            .find_map(|column| {
                self.keysyms
                    .chunks_exact(self.per_keycode)
                    .position(|row| row[column] == keysym)
            })
            .and_then(|offset| u8::try_from(offset).ok())
            .and_then(|offset| self.min_keycode.checked_add(offset))
    }
}

impl KeyboardSource for X11Display {
    type Error = PlatformError;

    fn query_keymap(&self) -> Result<KeyboardState, PlatformError> {
        let reply = self
            .conn
            .query_keymap()
            .map_err(PlatformError::request)
            .and_then(|cookie| cookie.reply().map_err(PlatformError::request));

        match reply {
            Ok(reply) => Ok(KeyboardState::new(reply.keys)),
            Err(e) => {
                // Refetch the mapping too once the server answers again
                *self.keysyms.lock().unwrap_or_else(PoisonError::into_inner) = None;
                Err(e)
            }
        }
    }

    fn keycode_for(&self, keysym: u32) -> Option<u8> {
        let mut cached = self.keysyms.lock().unwrap_or_else(PoisonError::into_inner);
        if cached.is_none() {
            *cached = self.fetch_keysyms();
        }

        let keycode = cached.as_ref()?.lookup(keysym);
        if keycode.is_none() {
            // Layout may have changed since the fetch; try again next tick
            *cached = None;
        }
        keycode
    }
}

impl DisplayBackend for X11Display {
    type Surface<'a> = X11Surface<'a>;

    fn screens(&self) -> Vec<ScreenInfo> {
        self.conn
            .setup()
            .roots
            .iter()
            .enumerate()
            .map(|(index, screen)| ScreenInfo {
                index,
                width: screen.width_in_pixels.into(),
                height: screen.height_in_pixels.into(),
            })
            .collect()
    }

    fn create_overlay(&self, info: &ScreenInfo) -> Result<X11Surface<'_>, PlatformError> {
        let screen = self.screen(info.index)?;
        X11Surface::create(&self.conn, screen, info, self.shape, &self.shm)
    }

    fn query_pointer(&self, info: &ScreenInfo) -> Result<PointerSample, PlatformError> {
        let failed = |reason: String| PlatformError::PointerQueryFailed {
            screen: info.index,
            reason,
        };

        let root = self.screen(info.index)?.root;
        let reply = self
            .conn
            .query_pointer(root)
            .map_err(|e| failed(e.to_string()))?
            .reply()
            .map_err(|e| failed(e.to_string()))?;

        if !reply.same_screen {
            return Err(failed("pointer is on another screen".into()));
        }

        Ok(PointerSample {
            screen: info.index,
            root_x: reply.root_x.into(),
            root_y: reply.root_y.into(),
            local_x: reply.win_x.into(),
            local_y: reply.win_y.into(),
        })
    }

    fn flush(&self) -> Result<(), PlatformError> {
        self.conn.flush().map_err(PlatformError::request)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Overlay Window
// ─────────────────────────────────────────────────────────────────────────────

/// SHM buffer for efficient pixel transfer
struct ShmBuffer {
    seg_id: shm::Seg,
    ptr: *mut u8,
    size: usize,
}

impl ShmBuffer {
    /// Map `size` bytes of anonymous shared memory and attach it to the server
    fn create(conn: &RustConnection, size: usize) -> Result<Self, PlatformError> {
        if size == 0 {
            return Err(PlatformError::BufferError("zero-sized overlay".into()));
        }

        let fd = memfd_create(c"finder-overlay", MemfdFlags::CLOEXEC)
            .map_err(|e| PlatformError::BufferError(format!("memfd_create failed: {}", e)))?;

        rustix::fs::ftruncate(&fd, size as u64)
            .map_err(|e| PlatformError::BufferError(format!("ftruncate failed: {}", e)))?;

        // SAFETY: a fresh shared mapping of a memfd sized above; nothing else
        // references this memory yet.
        let ptr = unsafe {
            mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                fd.as_fd(),
                0,
            )
        }
        .map_err(|e| PlatformError::BufferError(format!("mmap failed: {}", e)))?;

        // From here on Drop unmaps, even if attaching fails
        let mut buffer = Self {
            seg_id: x11rb::NONE,
            ptr: ptr.cast(),
            size,
        };

        let seg_id = conn
            .generate_id()
            .map_err(|e| PlatformError::BufferError(e.to_string()))?;

        // x11rb shm_attach_fd takes ownership of the fd. Checked right away:
        // a remote server advertises SHM but can't attach our memory.
        conn.shm_attach_fd(seg_id, File::from(fd), false)
            .map_err(|e| PlatformError::BufferError(format!("shm_attach_fd failed: {}", e)))?
            .check()
            .map_err(|e| PlatformError::BufferError(format!("shm_attach_fd failed: {}", e)))?;
        buffer.seg_id = seg_id;

        Ok(buffer)
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: `ptr` maps `size` writable bytes for as long as `self` lives,
        // and `&mut self` makes this the only view.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.size) }
    }
}

impl Drop for ShmBuffer {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`size` came from a successful mmap and are unmapped once.
        unsafe {
            rustix::mm::munmap(self.ptr.cast(), self.size).ok();
        }
    }
}

/// Where presented pixels are staged before the server copies them
enum PixelUpload {
    Shm(ShmBuffer),
    /// Sent inline with `PutImage`
    Plain(Vec<u8>),
}

impl PixelUpload {
    fn new(conn: &RustConnection, size: usize, shm: &AtomicBool) -> Self {
        if shm.load(Ordering::Acquire) {
            match ShmBuffer::create(conn, size) {
                Ok(buffer) => return Self::Shm(buffer),
                Err(e) => {
                    if shm.swap(false, Ordering::AcqRel) {
                        tracing::warn!(error = %e, "shared memory unusable, uploading pixels with PutImage");
                    }
                }
            }
        }
        Self::Plain(vec![0u8; size])
    }
}

/// Size of a `PutImage` request without its pixel data
const PUT_IMAGE_HEADER: usize = 24;

/// How many image rows fit in one `PutImage` request
fn rows_per_request(max_request_bytes: usize, row_bytes: usize) -> usize {
    if row_bytes == 0 {
        return 1;
    }
    (max_request_bytes.saturating_sub(PUT_IMAGE_HEADER) / row_bytes).max(1)
}

/// One screen's overlay for one visible episode
pub struct X11Surface<'a> {
    conn: &'a RustConnection,
    window: Window,
    colormap: Colormap,
    gc: Gcontext,
    depth: u8,
    width: u16,
    height: u16,
    canvas: PixmapCanvas,
    upload: Option<PixelUpload>,
}

impl<'a> X11Surface<'a> {
    fn create(
        conn: &'a RustConnection,
        screen: &Screen,
        info: &ScreenInfo,
        shape: bool,
        shm: &AtomicBool,
    ) -> Result<Self, PlatformError> {
        let (visual, depth) =
            find_argb_visual(screen).ok_or(PlatformError::VisualUnavailable { screen: info.index })?;

        let width = u16::try_from(info.width).map_err(PlatformError::request)?;
        let height = u16::try_from(info.height).map_err(PlatformError::request)?;
        if width == 0 || height == 0 {
            return Err(PlatformError::BufferError("zero-sized screen".into()));
        }

        // Colormap for the 32-bit visual
        let colormap = conn.generate_id().map_err(PlatformError::request)?;
        conn.create_colormap(ColormapAlloc::NONE, colormap, screen.root, visual)
            .map_err(PlatformError::request)?;

        // Everything below is released by Drop if a later step fails
        let mut surface = Self {
            conn,
            window: x11rb::NONE,
            colormap,
            gc: x11rb::NONE,
            depth,
            width,
            height,
            canvas: PixmapCanvas::new(info.width, info.height),
            upload: None,
        };

        let window = conn.generate_id().map_err(PlatformError::request)?;
        let win_aux = CreateWindowAux::new()
            .background_pixel(0)
            .border_pixel(0)
            .colormap(colormap)
            .override_redirect(1);

        conn.create_window(
            depth,
            window,
            screen.root,
            0,
            0,
            width,
            height,
            0,
            WindowClass::INPUT_OUTPUT,
            visual,
            &win_aux,
        )
        .map_err(PlatformError::request)?;
        surface.window = window;

        if shape {
            // Empty input region - clicks pass through
            conn.shape_rectangles(
                shape::SO::SET,
                shape::SK::INPUT,
                ClipOrdering::UNSORTED,
                window,
                0,
                0,
                &[],
            )
            .map_err(PlatformError::request)?;
        }

        conn.map_window(window).map_err(PlatformError::request)?;

        let gc = conn.generate_id().map_err(PlatformError::request)?;
        conn.create_gc(gc, window, &CreateGCAux::new())
            .map_err(PlatformError::request)?;
        surface.gc = gc;

        surface.upload = Some(PixelUpload::new(
            conn,
            usize::from(width) * usize::from(height) * 4,
            shm,
        ));

        tracing::debug!(screen = info.index, window, width, height, "overlay created");
        Ok(surface)
    }
}

impl OverlaySurface for X11Surface<'_> {
    type Canvas = PixmapCanvas;

    fn canvas(&mut self) -> &mut PixmapCanvas {
        &mut self.canvas
    }

    fn present(&mut self) -> Result<(), PlatformError> {
        match &mut self.upload {
            Some(PixelUpload::Shm(shm)) => {
                rgba_to_bgra(self.canvas.pixels(), shm.as_mut_slice());
                self.conn
                    .shm_put_image(
                        self.window,
                        self.gc,
                        self.width,
                        self.height,
                        0,
                        0,
                        self.width,
                        self.height,
                        0,
                        0,
                        self.depth,
                        ImageFormat::Z_PIXMAP.into(),
                        false,
                        shm.seg_id,
                        0,
                    )
                    .map_err(PlatformError::request)?;
            }
            Some(PixelUpload::Plain(staging)) => {
                rgba_to_bgra(self.canvas.pixels(), staging);

                let row_bytes = usize::from(self.width) * 4;
                let rows = rows_per_request(self.conn.maximum_request_bytes(), row_bytes);

                for (band, data) in staging.chunks(rows * row_bytes).enumerate() {
                    let y = i16::try_from(band * rows).map_err(PlatformError::request)?;
                    let band_height =
                        u16::try_from(data.len() / row_bytes).map_err(PlatformError::request)?;
                    self.conn
                        .put_image(
                            ImageFormat::Z_PIXMAP,
                            self.window,
                            self.gc,
                            self.width,
                            band_height,
                            0,
                            y,
                            0,
                            self.depth,
                            data,
                        )
                        .map_err(PlatformError::request)?;
                }
            }
            None => {
                return Err(PlatformError::BufferError("no pixel buffer".into()));
            }
        }

        self.conn.flush().map_err(PlatformError::request)
    }
}

impl Drop for X11Surface<'_> {
    fn drop(&mut self) {
        // Drawing context first, then the window, then its colormap
        if let Some(PixelUpload::Shm(shm)) = self.upload.take() {
            if shm.seg_id != x11rb::NONE {
                let _ = self.conn.shm_detach(shm.seg_id);
            }
        }
        if self.gc != x11rb::NONE {
            let _ = self.conn.free_gc(self.gc);
        }
        if self.window != x11rb::NONE {
            let _ = self.conn.unmap_window(self.window);
            let _ = self.conn.destroy_window(self.window);
        }
        let _ = self.conn.free_colormap(self.colormap);
        let _ = self.conn.flush();
    }
}

/// Convert renderer RGBA into the server's BGRA byte order
fn rgba_to_bgra(src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        d[0] = s[2]; // B
        d[1] = s[1]; // G
        d[2] = s[0]; // R
        d[3] = s[3]; // A
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba_to_bgra_swaps_red_and_blue() {
        let src = [1, 2, 3, 4, 10, 20, 30, 40];
        let mut dst = [0u8; 8];
        rgba_to_bgra(&src, &mut dst);
        assert_eq!(dst, [3, 2, 1, 4, 30, 20, 10, 40]);
    }

    #[test]
    fn test_put_image_bands_fit_request_limit() {
        // 1920 px rows are 7680 bytes; the classic 256 KiB limit fits 34 of them
        let rows = rows_per_request(262_140, 1920 * 4);
        assert_eq!(rows, 34);
        assert!(PUT_IMAGE_HEADER + rows * 1920 * 4 <= 262_140);

        // BIG-REQUESTS: a whole 1080p frame fits in one request
        assert!(rows_per_request(16 * 1024 * 1024, 1920 * 4) >= 1080);
    }

    #[test]
    fn test_put_image_band_never_empty() {
        // A row larger than the limit still goes out one row at a time
        assert_eq!(rows_per_request(1024, 8192), 1);
        assert_eq!(rows_per_request(0, 0), 1);
    }

    fn table(per_keycode: usize, keysyms: &[u32]) -> KeysymTable {
        KeysymTable {
            min_keycode: 8,
            per_keycode,
            keysyms: keysyms.to_vec(),
        }
    }

    #[test]
    fn test_keysym_lookup_prefers_first_column() {
        const PAUSE: u32 = 0xff13;
        // keycode 8 has Pause in its second column, keycode 9 in its first
        let keysyms = table(2, &[0x61, PAUSE, PAUSE, 0x62]);
        assert_eq!(keysyms.lookup(PAUSE), Some(9));
        assert_eq!(keysyms.lookup(0x62), Some(9));
        assert_eq!(keysyms.lookup(0x61), Some(8));
    }

    #[test]
    fn test_keysym_lookup_misses() {
        let keysyms = table(2, &[0x61, 0, 0x62, 0]);
        assert_eq!(keysyms.lookup(0xff13), None);
        // NoSymbol never resolves, even though empty slots hold it
        assert_eq!(keysyms.lookup(0), None);
        assert_eq!(table(0, &[]).lookup(0x61), None);
    }

    #[test]
    fn test_rgba_to_bgra_stops_at_shorter_buffer() {
        let src = [1, 2, 3, 4, 5, 6, 7, 8];
        let mut dst = [0u8; 4];
        rgba_to_bgra(&src, &mut dst);
        assert_eq!(dst, [3, 2, 1, 4]);
    }
}

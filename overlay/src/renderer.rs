//! Software stroke renderer using tiny-skia
//!
//! Drawing goes through [`StrokeCanvas`], a cairo-like path API (set color,
//! set width, move-to/line-to, stroke). [`PixmapCanvas`] rasterizes into an
//! RGBA buffer that the platform layer uploads to its window; tests swap in
//! a canvas that just records segments.

use tiny_skia::{Color, LineCap, Paint, PathBuilder, PixmapMut, Stroke, Transform};

/// Stroke-only drawing surface
pub trait StrokeCanvas {
    fn set_color(&mut self, color: Color);
    fn set_line_width(&mut self, width: f32);
    fn move_to(&mut self, x: f32, y: f32);
    fn line_to(&mut self, x: f32, y: f32);
    /// Stroke and clear the current path
    fn stroke(&mut self);
}

/// How the pointer burst is drawn
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub color: Color,
    pub line_width: f32,
    /// Cells per side of the grid whose border points feed the burst
    pub divisions: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            color: colors::highlight(),
            line_width: 1.0,
            divisions: crate::grid::GRID_DIVISIONS,
        }
    }
}

/// A [`StrokeCanvas`] backed by an RGBA (premultiplied) pixel buffer
pub struct PixmapCanvas {
    buffer: Vec<u8>,
    width: u32,
    height: u32,
    path: PathBuilder,
    color: Color,
    line_width: f32,
}

impl PixmapCanvas {
    /// Fully transparent canvas of the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buffer: vec![0u8; width as usize * height as usize * 4],
            width,
            height,
            path: PathBuilder::new(),
            color: colors::highlight(),
            line_width: 1.0,
        }
    }

    /// RGBA bytes, row-major, premultiplied alpha
    pub fn pixels(&self) -> &[u8] {
        &self.buffer
    }
}

impl StrokeCanvas for PixmapCanvas {
    fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    fn set_line_width(&mut self, width: f32) {
        self.line_width = width;
    }

    fn move_to(&mut self, x: f32, y: f32) {
        self.path.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.path.line_to(x, y);
    }

    fn stroke(&mut self) {
        let Some(path) = std::mem::replace(&mut self.path, PathBuilder::new()).finish() else {
            return;
        };
        let Some(mut pixmap) = PixmapMut::from_bytes(&mut self.buffer, self.width, self.height)
        else {
            return;
        };

        let mut paint = Paint::default();
        paint.set_color(self.color);
        paint.anti_alias = true;

        let stroke = Stroke {
            width: self.line_width,
            line_cap: LineCap::Butt,
            ..Default::default()
        };

        pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    }
}

pub mod colors {
    use tiny_skia::Color;

    /// Opaque red used for the pointer burst
    #[inline]
    pub fn highlight() -> Color {
        Color::from_rgba8(255, 0, 0, 255)
    }
}

//! Pointer burst geometry
//!
//! The screen is cut into an N×N grid (N = 8). Every grid intersection on
//! the outer border gets a straight line to the pointer, which gives 4·N
//! lines converging on the cursor.

use crate::renderer::{OverlayStyle, StrokeCanvas};

pub const GRID_DIVISIONS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub from: (f32, f32),
    pub to: (f32, f32),
}

/// Border intersections of a `divisions`×`divisions` grid over the screen.
///
/// Steps use integer division (`width / divisions`), so on sizes that don't
/// divide evenly the last row/column sits slightly inside the edge. Order:
/// column-major, `i` outer, `j` inner.
pub fn border_points(width: u32, height: u32, divisions: u32) -> impl Iterator<Item = (u32, u32)> {
    let divisions = divisions.max(1);
    let step_x = width / divisions;
    let step_y = height / divisions;

    (0..=divisions).flat_map(move |i| {
        (0..=divisions)
            .filter(move |&j| i == 0 || i == divisions || j == 0 || j == divisions)
            .map(move |j| (i * step_x, j * step_y))
    })
}

/// Every line of the burst, border point first, pointer second
pub fn radial_segments(width: u32, height: u32, divisions: u32, pointer: (i32, i32)) -> Vec<Segment> {
    let to = (pointer.0 as f32, pointer.1 as f32);
    border_points(width, height, divisions)
        .map(|(x, y)| Segment {
            from: (x as f32, y as f32),
            to,
        })
        .collect()
}

/// Draw the burst as one path and stroke it once.
pub fn paint_radial_grid<C: StrokeCanvas + ?Sized>(
    canvas: &mut C,
    width: u32,
    height: u32,
    pointer: (i32, i32),
    style: &OverlayStyle,
) {
    canvas.set_color(style.color);
    canvas.set_line_width(style.line_width);

    for segment in radial_segments(width, height, style.divisions, pointer) {
        canvas.move_to(segment.from.0, segment.from.1);
        canvas.line_to(segment.to.0, segment.to.1);
    }

    canvas.stroke();
}

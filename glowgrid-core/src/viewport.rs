//! Destination-rectangle math and the pixel-to-cell inverse transform.

use glowgrid_data::Color;

use crate::backend::PixelRect;

/// How a rendered console is fitted into the output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportOptions {
    /// Preserve the console aspect ratio instead of stretching.
    pub keep_aspect: bool,
    /// Snap upscale factors to whole numbers; downscales stay fractional.
    pub integer_scaling: bool,
    /// Horizontal placement of the leftover space, 0.0 (left) to 1.0
    /// (right). Values outside the range are clamped.
    pub align_x: f32,
    /// Vertical placement, 0.0 (top) to 1.0 (bottom).
    pub align_y: f32,
    /// Fill color for output pixels outside the destination rectangle.
    pub clear_color: Color,
}

impl Default for ViewportOptions {
    /// Stretch to fill, centered, black surround.
    fn default() -> Self {
        Self {
            keep_aspect: false,
            integer_scaling: false,
            align_x: 0.5,
            align_y: 0.5,
            clear_color: Color::BLACK,
        }
    }
}

/// Computes where a `source_width` x `source_height` pixel image lands
/// within an output of `output_width` x `output_height` pixels.
#[must_use]
pub fn destination_rect(
    source_width: i32,
    source_height: i32,
    output_width: i32,
    output_height: i32,
    options: &ViewportOptions,
) -> PixelRect {
    let mut scale_w = output_width as f32 / source_width as f32;
    let mut scale_h = output_height as f32 / source_height as f32;
    if options.integer_scaling {
        if scale_w > 1.0 {
            scale_w = scale_w.floor();
        }
        if scale_h > 1.0 {
            scale_h = scale_h.floor();
        }
    }
    if options.keep_aspect {
        let scale = scale_w.min(scale_h);
        scale_w = scale;
        scale_h = scale;
    }

    let w = (source_width as f32 * scale_w) as i32;
    let h = (source_height as f32 * scale_h) as i32;
    let x = ((output_width - w) as f32 * options.align_x.clamp(0.0, 1.0)) as i32;
    let y = ((output_height - h) as f32 * options.align_y.clamp(0.0, 1.0)) as i32;
    PixelRect::new(x, y, w, h)
}

/// Affine map from output pixel coordinates to fractional cell
/// coordinates, cached from the last composited viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorTransform {
    offset_x: f64,
    offset_y: f64,
    scale_x: f64,
    scale_y: f64,
}

impl Default for CursorTransform {
    /// Identity: pixels map one-to-one to cells.
    fn default() -> Self {
        Self {
            offset_x: 0.0,
            offset_y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }
}

impl CursorTransform {
    /// Inverse of rendering a `columns` x `rows` console into `dest`.
    #[must_use]
    pub fn for_viewport(columns: i32, rows: i32, dest: PixelRect) -> Self {
        let scale_x = f64::from(columns) / f64::from(dest.w.max(1));
        let scale_y = f64::from(rows) / f64::from(dest.h.max(1));
        Self {
            offset_x: -f64::from(dest.x) * scale_x,
            offset_y: -f64::from(dest.y) * scale_y,
            scale_x,
            scale_y,
        }
    }

    /// Maps an output pixel position to fractional cell coordinates.
    /// Positions outside the destination rectangle map outside
    /// `[0, columns) x [0, rows)`.
    #[must_use]
    pub fn apply(&self, pixel_x: f64, pixel_y: f64) -> (f64, f64) {
        (
            self.offset_x + pixel_x * self.scale_x,
            self.offset_y + pixel_y * self.scale_y,
        )
    }
}

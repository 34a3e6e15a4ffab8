//! The seam between the rasterizer and the graphics API.
//!
//! The rasterizer is written against the [`Backend`] trait and issues
//! only large batched operations: texture uploads, indexed quad draws,
//! target switches. [`GlBackend`] is the production implementation over
//! `glow`; tests drive the same code paths through a recording double.

mod gl;
mod program;
#[cfg(test)]
pub(crate) mod recording;
mod state;

pub use gl::{GlBackend, GlslVersion};
use glowgrid_data::Color;

use crate::error::Error;

/// Opaque handle to a backend-owned texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub(crate) u32);

/// Integer rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PixelRect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width.
    pub w: i32,
    /// Height.
    pub h: i32,
}

impl PixelRect {
    /// A rectangle from its top-left corner and size.
    #[must_use]
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }
}

/// One vertex of a quad: pixel position plus color.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    /// Horizontal pixel position.
    pub x: f32,
    /// Vertical pixel position, top-left origin.
    pub y: f32,
    /// Vertex color, multiplied with the sampled texel.
    pub rgba: Color,
}

/// Normalized texture coordinates for one vertex.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VertexUv {
    /// Horizontal texture coordinate in `[0, 1]`.
    pub u: f32,
    /// Vertical texture coordinate in `[0, 1]`.
    pub v: f32,
}

/// Blend state for a quad submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Source replaces destination; used by the background pass.
    Opaque,
    /// Standard alpha blending; used by the foreground glyph pass.
    Alpha,
}

/// Intended usage of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureAccess {
    /// Uploaded from the CPU, sampled during draws.
    Static,
    /// Can be bound as a render target.
    Target,
}

/// Pixels read back from the current render target, RGBA8 row-major from
/// the top-left corner.
#[derive(Debug, Clone)]
pub struct PixelReadback {
    /// RGBA8 pixel data, 4 bytes per pixel.
    pub pixels: Vec<u8>,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

/// Graphics API surface consumed by the rasterizer.
///
/// All calls are synchronous and single-threaded; no call suspends. A
/// backend owns every texture it creates and must release them when the
/// backend itself is torn down, whether or not the caller destroyed them
/// individually.
pub trait Backend {
    /// Size in pixels of the final output (window or swapchain image).
    fn output_size(&self) -> (i32, i32);

    /// Allocates a texture.
    ///
    /// # Errors
    /// Returns [`Error::OutOfMemory`] when allocation fails.
    fn create_texture(
        &mut self,
        width: i32,
        height: i32,
        access: TextureAccess,
    ) -> Result<TextureId, Error>;

    /// Releases a texture. Unknown handles are ignored.
    fn destroy_texture(&mut self, texture: TextureId);

    /// Dimensions of a live texture.
    fn texture_size(&self, texture: TextureId) -> (i32, i32);

    /// Uploads pixels into a sub-rectangle of a texture.
    ///
    /// # Errors
    /// Fails on unknown handles or if the upload is rejected.
    fn upload_texture(
        &mut self,
        texture: TextureId,
        rect: PixelRect,
        pixels: &[Color],
    ) -> Result<(), Error>;

    /// Submits one indexed draw of textured or untextured quads to the
    /// current render target. `uvs`, when present, must be parallel to
    /// `vertices`.
    ///
    /// # Errors
    /// Fails on unknown texture handles or graphics API errors.
    fn draw_quads(
        &mut self,
        texture: Option<TextureId>,
        blend: BlendMode,
        vertices: &[Vertex],
        uvs: Option<&[VertexUv]>,
        indices: &[u16],
    ) -> Result<(), Error>;

    /// Stretches `texture` over `dest` on the current render target.
    ///
    /// # Errors
    /// Fails on unknown texture handles or graphics API errors.
    fn copy_texture(&mut self, texture: TextureId, dest: PixelRect) -> Result<(), Error>;

    /// Redirects subsequent draws to `target`, or to the output when
    /// `None`.
    ///
    /// # Errors
    /// Fails if `target` is not a [`TextureAccess::Target`] texture.
    fn set_render_target(&mut self, target: Option<TextureId>) -> Result<(), Error>;

    /// The current render target.
    fn render_target(&self) -> Option<TextureId>;

    /// Fills the current render target with `color`.
    ///
    /// # Errors
    /// Fails on graphics API errors.
    fn clear(&mut self, color: Color) -> Result<(), Error>;

    /// Reads back the pixels of the current render target.
    ///
    /// # Errors
    /// Fails on graphics API errors.
    fn read_pixels(&mut self) -> Result<PixelReadback, Error>;

    /// Publishes the output frame.
    fn present(&mut self);

    /// Edge-triggered flag: returns true once after the backend lost the
    /// contents of its render targets (device reset, context loss).
    /// Checked at the top of every frame so caches can be invalidated
    /// before the next diff.
    fn take_target_reset(&mut self) -> bool;
}

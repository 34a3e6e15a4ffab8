//! Fixed-capacity quad batch shared by the two render passes.
//!
//! Indices for quad `k` always reference vertices `4k..4k+4`, so the
//! index table depends only on the quad count. It is generated lazily,
//! grows monotonically, and survives flushes; only the vertex data is
//! rebuilt each pass.

use glowgrid_data::Cell;

use crate::{
    atlas::GlyphAtlas,
    backend::{Backend, BlendMode, TextureId, Vertex, VertexUv},
    error::Error,
};

/// Largest quad count whose indices fit `u16`: `65_536 / 6`.
pub(crate) const QUAD_CAPACITY: usize = 10_922;

/// Accumulates cell quads and submits them as one indexed draw.
#[derive(Debug, Default)]
pub struct QuadBatch {
    vertices: Vec<Vertex>,
    uvs: Vec<VertexUv>,
    indices: Vec<u16>,
    quads: usize,
}

impl QuadBatch {
    /// An empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the opaque background quad of one cell, flushing the
    /// background pass first when the batch is full.
    ///
    /// # Errors
    /// Propagates a failed flush.
    pub fn push_background<B: Backend>(
        &mut self,
        backend: &mut B,
        x: i32,
        y: i32,
        cell: &Cell,
        tile_width: i32,
        tile_height: i32,
    ) -> Result<(), Error> {
        if self.quads == QUAD_CAPACITY {
            self.flush_background(backend)?;
        }
        self.push_corners(
            (x * tile_width) as f32,
            (y * tile_height) as f32,
            tile_width as f32,
            tile_height as f32,
            cell,
            false,
        );
        Ok(())
    }

    /// Queues the textured glyph quad of one cell, flushing the
    /// foreground pass first when the batch is full. `u_mul` and `v_mul`
    /// are the reciprocal atlas texture dimensions.
    ///
    /// # Errors
    /// Propagates a failed flush or an unprepared atlas.
    pub fn push_foreground<B: Backend>(
        &mut self,
        backend: &mut B,
        x: i32,
        y: i32,
        cell: &Cell,
        atlas: &GlyphAtlas,
        u_mul: f32,
        v_mul: f32,
    ) -> Result<(), Error> {
        if self.quads == QUAD_CAPACITY {
            self.flush_foreground(backend, atlas.texture()?)?;
        }
        let (tile_width, tile_height) = (atlas.tile_width(), atlas.tile_height());
        self.push_corners(
            (x * tile_width) as f32,
            (y * tile_height) as f32,
            tile_width as f32,
            tile_height as f32,
            cell,
            true,
        );

        let rect = atlas.glyph_rect(cell.glyph as usize);
        let (u0, v0) = (rect.x as f32 * u_mul, rect.y as f32 * v_mul);
        let (u1, v1) = (
            (rect.x + rect.w) as f32 * u_mul,
            (rect.y + rect.h) as f32 * v_mul,
        );
        self.uvs.extend_from_slice(&[
            VertexUv { u: u0, v: v0 },
            VertexUv { u: u0, v: v1 },
            VertexUv { u: u1, v: v0 },
            VertexUv { u: u1, v: v1 },
        ]);
        Ok(())
    }

    /// Submits queued background quads: untextured, blending disabled.
    ///
    /// The batch is emptied whether or not the draw succeeds; quads from
    /// a failed submission must never leak into a later pass.
    ///
    /// # Errors
    /// Propagates backend draw failures.
    pub fn flush_background<B: Backend>(&mut self, backend: &mut B) -> Result<(), Error> {
        if self.quads == 0 {
            return Ok(());
        }
        self.sync_indices();
        let result = backend.draw_quads(
            None,
            BlendMode::Opaque,
            &self.vertices,
            None,
            &self.indices[..self.quads * 6],
        );
        self.reset();
        result
    }

    /// Submits queued glyph quads: atlas-textured, alpha blended.
    ///
    /// The batch is emptied whether or not the draw succeeds.
    ///
    /// # Errors
    /// Propagates backend draw failures.
    pub fn flush_foreground<B: Backend>(
        &mut self,
        backend: &mut B,
        texture: TextureId,
    ) -> Result<(), Error> {
        if self.quads == 0 {
            return Ok(());
        }
        self.sync_indices();
        let result = backend.draw_quads(
            Some(texture),
            BlendMode::Alpha,
            &self.vertices,
            Some(&self.uvs),
            &self.indices[..self.quads * 6],
        );
        self.reset();
        result
    }

    /// Appends the four corners of one quad: upper-left, lower-left,
    /// upper-right, lower-right.
    fn push_corners(&mut self, x: f32, y: f32, w: f32, h: f32, cell: &Cell, foreground: bool) {
        let rgba = if foreground { cell.fg } else { cell.bg };
        self.vertices.extend_from_slice(&[
            Vertex { x, y, rgba },
            Vertex { x, y: y + h, rgba },
            Vertex { x: x + w, y, rgba },
            Vertex { x: x + w, y: y + h, rgba },
        ]);
        self.quads += 1;
    }

    /// Extends the retained index table to cover the current quad count.
    fn sync_indices(&mut self) {
        while self.indices.len() < self.quads * 6 {
            let base = ((self.indices.len() / 6) * 4) as u16;
            self.indices
                .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 1, base + 3]);
        }
    }

    fn reset(&mut self) {
        self.vertices.clear();
        self.uvs.clear();
        self.quads = 0;
    }
}

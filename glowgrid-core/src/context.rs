//! The rendering context: owns the backend, the glyph atlas, the shadow
//! cache, and the intermediate render-target texture, and drives the
//! whole per-frame pipeline.

use std::{cell::RefCell, fs::File, io::BufWriter, path::Path, rc::Rc};

use glowgrid_data::{Surface, Tileset};
use tracing::{debug, warn};

use crate::{
    atlas::GlyphAtlas,
    backend::{Backend, TextureAccess, TextureId},
    batch::QuadBatch,
    cache::ShadowCache,
    error::Error,
    raster,
    viewport::{CursorTransform, ViewportOptions, destination_rect},
};

/// Incremental console renderer over a [`Backend`].
///
/// The console is rasterized into an intermediate texture sized to the
/// console's pixel dimensions, then stretched into the viewport's
/// destination rectangle. Rendering into the intermediate texture is
/// what makes the diff cache sound: its contents persist between frames,
/// so only changed cells need repainting.
#[derive(Debug)]
pub struct Context<B: Backend> {
    backend: B,
    atlas: GlyphAtlas,
    batch: QuadBatch,
    cache: Option<ShadowCache>,
    target: Option<TextureId>,
    cursor_transform: CursorTransform,
}

impl<B: Backend> Context<B> {
    /// Builds a context rendering `tileset` glyphs onto `backend`.
    ///
    /// # Errors
    /// Fails when the atlas cannot be built. A failed construction
    /// leaves no textures allocated on the backend.
    pub fn new(mut backend: B, tileset: Rc<RefCell<Tileset>>) -> Result<Self, Error> {
        let atlas = GlyphAtlas::new(&mut backend, tileset)?;
        Ok(Self {
            backend,
            atlas,
            batch: QuadBatch::new(),
            cache: None,
            target: None,
            cursor_transform: CursorTransform::default(),
        })
    }

    /// The backend this context renders through.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the backend, e.g. to report a window resize.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Renders `surface`, composites it into the output, and publishes
    /// the frame.
    ///
    /// # Errors
    /// Per-frame failures leave the context reusable; see
    /// [`accumulate`](Self::accumulate).
    pub fn present(
        &mut self,
        surface: &Surface,
        options: &ViewportOptions,
    ) -> Result<(), Error> {
        self.backend.set_render_target(None)?;
        self.backend.clear(options.clear_color)?;
        self.accumulate(surface, options)?;
        self.backend.present();
        Ok(())
    }

    /// Renders `surface` into the intermediate texture and composites it
    /// onto the current render target, without publishing a frame.
    ///
    /// Also refreshes the cursor transform, so
    /// [`pixel_to_cell`](Self::pixel_to_cell) reflects this composition.
    ///
    /// # Errors
    /// The context stays valid after a failed frame, except that a
    /// failed intermediate-texture allocation drops the shadow cache
    /// along with the texture it described.
    pub fn accumulate(
        &mut self,
        surface: &Surface,
        options: &ViewportOptions,
    ) -> Result<(), Error> {
        if self.backend.take_target_reset() {
            debug!("render target contents lost, invalidating cache");
            if let Some(cache) = self.cache.as_mut() {
                cache.invalidate();
            }
        }
        if self.atlas.sync(&mut self.backend)? {
            if let Some(cache) = self.cache.as_mut() {
                cache.invalidate();
            }
        }

        let width = surface.width() * self.atlas.tile_width();
        let height = surface.height() * self.atlas.tile_height();
        let target = self.ensure_target(width, height)?;
        self.ensure_cache(surface);

        raster::render_to_target(
            &mut self.backend,
            &self.atlas,
            &mut self.batch,
            target,
            surface,
            self.cache.as_mut(),
        )?;

        let output = self.backend.output_size();
        let dest = destination_rect(width, height, output.0, output.1, options);
        self.backend.copy_texture(target, dest)?;
        self.cursor_transform =
            CursorTransform::for_viewport(surface.width(), surface.height(), dest);
        Ok(())
    }

    /// Writes the last composited frame to `path` as a PNG.
    ///
    /// # Errors
    /// Before the first frame there is nothing to save: an empty file is
    /// written and [`Error::Warning`] returned. I/O and encoding
    /// failures are fatal for the snapshot only.
    pub fn save_snapshot(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        let Some(target) = self.target else {
            warn!("snapshot requested before anything was rendered");
            File::create(path).map_err(Error::snapshot_failed)?;
            return Err(Error::nothing_rendered());
        };

        let previous = self.backend.render_target();
        self.backend.set_render_target(Some(target))?;
        let readback = self.backend.read_pixels();
        self.backend.set_render_target(previous)?;
        let readback = readback?;

        let file = File::create(path).map_err(Error::snapshot_failed)?;
        let mut encoder = png::Encoder::new(
            BufWriter::new(file),
            readback.width as u32,
            readback.height as u32,
        );
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().map_err(Error::snapshot_failed)?;
        writer
            .write_image_data(&readback.pixels)
            .map_err(Error::snapshot_failed)?;
        Ok(())
    }

    /// Replaces the active tileset.
    ///
    /// The new atlas is built first; on failure the context keeps the
    /// old tileset and atlas untouched. On success the shadow cache is
    /// dropped, forcing a full repaint with the new glyphs.
    ///
    /// # Errors
    /// Propagates atlas construction failures.
    pub fn set_tileset(&mut self, tileset: Rc<RefCell<Tileset>>) -> Result<(), Error> {
        let atlas = GlyphAtlas::new(&mut self.backend, tileset)?;
        let old = std::mem::replace(&mut self.atlas, atlas);
        old.delete(&mut self.backend);
        self.cache = None;
        debug!("tileset replaced, cache dropped");
        Ok(())
    }

    /// Console dimensions that would fill the output at `magnification`.
    /// Never recommends fewer than one cell per axis.
    ///
    /// # Errors
    /// Fails instead of dividing by a non-positive magnification.
    pub fn recommended_grid_size(&self, magnification: f32) -> Result<(i32, i32), Error> {
        if magnification <= 0.0 {
            return Err(Error::InvalidArgument(format!(
                "Magnification must be positive, got {magnification}"
            )));
        }
        let (output_w, output_h) = self.backend.output_size();
        let tile_w = (self.atlas.tile_width() as f32 * magnification) as i32;
        let tile_h = (self.atlas.tile_height() as f32 * magnification) as i32;
        if tile_w <= 0 || tile_h <= 0 {
            return Err(Error::zero_tile_size());
        }
        Ok(((output_w / tile_w).max(1), (output_h / tile_h).max(1)))
    }

    /// Maps an output pixel position to fractional cell coordinates of
    /// the last composited console.
    #[must_use]
    pub fn pixel_to_cell(&self, pixel_x: f64, pixel_y: f64) -> (f64, f64) {
        self.cursor_transform.apply(pixel_x, pixel_y)
    }

    /// Destroys all textures owned by this context and hands the backend
    /// back for its own teardown.
    pub fn delete(mut self) -> B {
        if let Some(target) = self.target.take() {
            self.backend.destroy_texture(target);
        }
        self.atlas.delete(&mut self.backend);
        self.backend
    }

    /// Keeps the intermediate texture sized to the console's pixel
    /// dimensions, recreating it (and invalidating the cache) on change.
    fn ensure_target(&mut self, width: i32, height: i32) -> Result<TextureId, Error> {
        if let Some(target) = self.target {
            if self.backend.texture_size(target) == (width, height) {
                return Ok(target);
            }
            self.backend.destroy_texture(target);
            self.target = None;
        }

        match self.backend.create_texture(width, height, TextureAccess::Target) {
            Ok(target) => {
                self.target = Some(target);
                if let Some(cache) = self.cache.as_mut() {
                    cache.invalidate();
                }
                Ok(target)
            },
            Err(err) => {
                // the cache described a texture that no longer exists
                self.cache = None;
                Err(err)
            },
        }
    }

    fn ensure_cache(&mut self, surface: &Surface) {
        let fits = self
            .cache
            .as_ref()
            .is_some_and(|c| c.width() == surface.width() && c.height() == surface.height());
        if !fits {
            self.cache = Some(ShadowCache::new(surface.width(), surface.height()));
        }
    }
}

//! Glyph atlas: one square texture holding every defined glyph bitmap.
//!
//! The atlas owns the only texture the foreground pass samples. Glyph
//! slots are packed row-major at fixed tile size; capacity grows by
//! doubling the texture side and repacking, which invalidates every
//! texture coordinate handed out before the repack.

use std::{cell::RefCell, rc::Rc};

use glowgrid_data::{Tileset, TilesetEvent};
use tracing::debug;

use crate::{
    backend::{Backend, PixelRect, TextureAccess, TextureId},
    error::Error,
};

const INITIAL_TEXTURE_SIZE: i32 = 256;

/// Backend texture mirroring a [`Tileset`], addressed by glyph index.
#[derive(Debug)]
pub struct GlyphAtlas {
    tileset: Rc<RefCell<Tileset>>,
    tile_width: i32,
    tile_height: i32,
    texture: Option<TextureId>,
    texture_size: i32,
    columns: i32,
}

impl GlyphAtlas {
    /// Builds an atlas for `tileset`, allocating the texture and packing
    /// every defined glyph.
    ///
    /// # Errors
    /// Fails on zero-dimension tiles or a failed texture allocation; no
    /// texture survives a failed construction.
    pub fn new<B: Backend>(
        backend: &mut B,
        tileset: Rc<RefCell<Tileset>>,
    ) -> Result<Self, Error> {
        let (tile_width, tile_height) = {
            let tileset = tileset.borrow();
            (tileset.tile_width(), tileset.tile_height())
        };
        if tile_width <= 0 || tile_height <= 0 {
            return Err(Error::zero_tile_size());
        }

        let mut atlas = Self {
            tileset,
            tile_width,
            tile_height,
            texture: None,
            texture_size: 0,
            columns: 0,
        };
        atlas.ensure_capacity(backend)?;
        Ok(atlas)
    }

    /// The texture the foreground pass samples from.
    ///
    /// # Errors
    /// Fails if the last allocation attempt left the atlas without a
    /// texture.
    pub fn texture(&self) -> Result<TextureId, Error> {
        self.texture.ok_or_else(Error::atlas_not_prepared)
    }

    /// Side length in pixels of the (square) atlas texture.
    #[must_use]
    pub fn texture_size(&self) -> i32 {
        self.texture_size
    }

    /// Width of one glyph tile in pixels.
    #[must_use]
    pub fn tile_width(&self) -> i32 {
        self.tile_width
    }

    /// Height of one glyph tile in pixels.
    #[must_use]
    pub fn tile_height(&self) -> i32 {
        self.tile_height
    }

    /// Shared handle to the backing tileset.
    #[must_use]
    pub fn tileset(&self) -> Rc<RefCell<Tileset>> {
        Rc::clone(&self.tileset)
    }

    /// Pixel rectangle of `glyph` within the atlas texture.
    #[must_use]
    pub fn glyph_rect(&self, glyph: usize) -> PixelRect {
        let glyph = glyph as i32;
        PixelRect::new(
            (glyph % self.columns) * self.tile_width,
            (glyph / self.columns) * self.tile_height,
            self.tile_width,
            self.tile_height,
        )
    }

    /// Grows the texture until every reserved glyph slot fits, repacking
    /// all defined glyphs into the new texture.
    ///
    /// Returns true when a repack happened; previously issued texture
    /// coordinates are stale and any shadow cache must be invalidated.
    ///
    /// # Errors
    /// A failed allocation destroys the old texture and leaves the atlas
    /// unprepared; rendering before the next successful call is an error.
    pub fn ensure_capacity<B: Backend>(&mut self, backend: &mut B) -> Result<bool, Error> {
        let capacity = self.tileset.borrow().capacity() as i64;
        let mut size = INITIAL_TEXTURE_SIZE;
        while self.slots_at(size) < capacity {
            size *= 2;
        }
        if self.texture.is_some() && size == self.texture_size {
            return Ok(false);
        }

        let texture = match backend.create_texture(size, size, TextureAccess::Static) {
            Ok(texture) => texture,
            Err(err) => {
                if let Some(old) = self.texture.take() {
                    backend.destroy_texture(old);
                }
                self.texture_size = 0;
                self.columns = 0;
                return Err(err);
            },
        };
        if let Some(old) = self.texture.take() {
            backend.destroy_texture(old);
        }
        self.texture = Some(texture);
        self.texture_size = size;
        self.columns = size / self.tile_width;
        if let Err(err) = self.repack(backend) {
            // a partially packed texture is unusable; drop it so the
            // retry rebuilds and repacks from scratch
            if let Some(texture) = self.texture.take() {
                backend.destroy_texture(texture);
            }
            self.texture_size = 0;
            self.columns = 0;
            return Err(err);
        }

        debug!(size, columns = self.columns, capacity, "repacked glyph atlas");
        Ok(true)
    }

    /// Uploads the current bitmap of one glyph into its atlas slot.
    ///
    /// # Errors
    /// Fails when the atlas has no texture or the upload is rejected.
    pub fn upload_glyph<B: Backend>(
        &mut self,
        backend: &mut B,
        glyph: usize,
    ) -> Result<(), Error> {
        let texture = self.texture()?;
        let rect = self.glyph_rect(glyph);
        let tileset = self.tileset.borrow();
        backend.upload_texture(texture, rect, tileset.glyph_pixels(glyph))
    }

    /// Drains pending tileset events, growing and repacking when the
    /// reserved capacity changed and re-uploading individually changed
    /// glyphs otherwise.
    ///
    /// Returns true when a repack invalidated texture coordinates.
    ///
    /// # Errors
    /// Propagates allocation and upload failures. Unapplied events are
    /// put back on the tileset's queue, so the next frame retries them
    /// instead of leaving stale glyphs behind.
    pub fn sync<B: Backend>(&mut self, backend: &mut B) -> Result<bool, Error> {
        let events = self.tileset.borrow_mut().take_events();
        if events.is_empty() {
            return Ok(false);
        }

        let grow = events
            .iter()
            .any(|event| matches!(event, TilesetEvent::CapacityChanged));
        if grow {
            match self.ensure_capacity(backend) {
                // the repack re-uploaded every defined glyph
                Ok(true) => return Ok(true),
                Ok(false) => {},
                Err(err) => {
                    self.tileset.borrow_mut().requeue_events(events);
                    return Err(err);
                },
            }
        }

        for (applied, event) in events.iter().enumerate() {
            if let TilesetEvent::GlyphChanged(glyph) = *event {
                if let Err(err) = self.upload_glyph(backend, glyph) {
                    self.tileset
                        .borrow_mut()
                        .requeue_events(events[applied..].to_vec());
                    return Err(err);
                }
            }
        }
        Ok(false)
    }

    /// Releases the atlas texture.
    pub fn delete<B: Backend>(self, backend: &mut B) {
        if let Some(texture) = self.texture {
            backend.destroy_texture(texture);
        }
    }

    fn slots_at(&self, size: i32) -> i64 {
        let columns = (size / self.tile_width) as i64;
        let rows = (size / self.tile_height) as i64;
        columns * rows
    }

    fn repack<B: Backend>(&mut self, backend: &mut B) -> Result<(), Error> {
        let capacity = self.tileset.borrow().capacity();
        for glyph in 0..capacity {
            if self.tileset.borrow().is_defined(glyph) {
                self.upload_glyph(backend, glyph)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use glowgrid_data::Color;

    use super::*;
    use crate::backend::recording::RecordingBackend;

    fn shared_tileset(tile: i32, capacity: usize) -> Rc<RefCell<Tileset>> {
        Rc::new(RefCell::new(Tileset::new(tile, tile, capacity)))
    }

    fn define_glyphs(tileset: &Rc<RefCell<Tileset>>, glyphs: &[usize]) {
        let mut tileset = tileset.borrow_mut();
        let tile = vec![Color::WHITE; tileset.tile_len()];
        for &glyph in glyphs {
            tileset.set_glyph(glyph, &tile).unwrap();
        }
    }

    #[test]
    fn picks_minimal_doubling_from_256() {
        let mut backend = RecordingBackend::new((640, 480));
        // 16x16 tiles: a 256 texture holds 256 slots, too few for 300
        let tileset = shared_tileset(16, 300);
        let atlas = GlyphAtlas::new(&mut backend, tileset).unwrap();

        assert_eq!(atlas.texture_size(), 512);
        assert_eq!(backend.texture_size(atlas.texture().unwrap()), (512, 512));
    }

    #[test]
    fn repack_uploads_each_defined_glyph_once() {
        let mut backend = RecordingBackend::new((640, 480));
        let tileset = shared_tileset(16, 256);
        define_glyphs(&tileset, &[0, 7, 255]);
        tileset.borrow_mut().take_events();

        let mut atlas = GlyphAtlas::new(&mut backend, Rc::clone(&tileset)).unwrap();
        assert_eq!(backend.uploads.len(), 3);

        // growing past 256 slots doubles once and re-uploads everything
        backend.uploads.clear();
        tileset.borrow_mut().reserve(257);
        assert!(atlas.sync(&mut backend).unwrap());
        assert_eq!(atlas.texture_size(), 512);
        assert_eq!(backend.uploads.len(), 3);
    }

    #[test]
    fn sync_uploads_changed_glyphs_without_repack() {
        let mut backend = RecordingBackend::new((640, 480));
        let tileset = shared_tileset(8, 64);
        let mut atlas = GlyphAtlas::new(&mut backend, Rc::clone(&tileset)).unwrap();
        backend.uploads.clear();

        define_glyphs(&tileset, &[3, 9]);
        assert!(!atlas.sync(&mut backend).unwrap());

        let texture = atlas.texture().unwrap();
        let rects: Vec<PixelRect> = backend
            .uploads_for(texture)
            .iter()
            .map(|u| u.rect)
            .collect();
        assert_eq!(rects, vec![atlas.glyph_rect(3), atlas.glyph_rect(9)]);
    }

    #[test]
    fn glyph_rect_walks_rows() {
        let mut backend = RecordingBackend::new((640, 480));
        let tileset = shared_tileset(16, 64);
        let atlas = GlyphAtlas::new(&mut backend, tileset).unwrap();

        // 256 / 16 = 16 columns
        assert_eq!(atlas.glyph_rect(0), PixelRect::new(0, 0, 16, 16));
        assert_eq!(atlas.glyph_rect(15), PixelRect::new(240, 0, 16, 16));
        assert_eq!(atlas.glyph_rect(16), PixelRect::new(0, 16, 16, 16));
    }

    #[test]
    fn failed_mid_sync_upload_is_retried_next_frame() {
        let mut backend = RecordingBackend::new((640, 480));
        let tileset = shared_tileset(8, 64);
        let mut atlas = GlyphAtlas::new(&mut backend, Rc::clone(&tileset)).unwrap();
        backend.uploads.clear();

        define_glyphs(&tileset, &[3, 9, 12]);
        backend.fail_upload_at = Some(1); // glyph 3 lands, glyph 9 fails
        assert!(atlas.sync(&mut backend).is_err());
        assert_eq!(backend.uploads.len(), 1);
        assert_eq!(backend.uploads[0].rect, atlas.glyph_rect(3));

        // the failed event and everything after it were put back
        backend.uploads.clear();
        assert!(!atlas.sync(&mut backend).unwrap());
        let rects: Vec<PixelRect> = backend.uploads.iter().map(|u| u.rect).collect();
        assert_eq!(rects, vec![atlas.glyph_rect(9), atlas.glyph_rect(12)]);
    }

    #[test]
    fn zero_tile_size_is_rejected() {
        let mut backend = RecordingBackend::new((640, 480));
        let tileset = shared_tileset(0, 16);
        let result = GlyphAtlas::new(&mut backend, tileset);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert_eq!(backend.live_textures(), 0);
    }

    #[test]
    fn failed_growth_leaves_atlas_unprepared() {
        let mut backend = RecordingBackend::new((640, 480));
        let tileset = shared_tileset(16, 256);
        let mut atlas = GlyphAtlas::new(&mut backend, Rc::clone(&tileset)).unwrap();

        backend.fail_next_create = true;
        tileset.borrow_mut().reserve(1000);
        assert!(atlas.sync(&mut backend).is_err());
        assert!(atlas.texture().is_err());
        assert_eq!(backend.live_textures(), 0);

        // the growth event was requeued, so the next sync recovers
        assert!(atlas.sync(&mut backend).unwrap());
        assert_eq!(atlas.texture_size(), 512);
        assert!(atlas.texture().is_ok());
    }
}

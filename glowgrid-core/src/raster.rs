//! Two-pass rasterization of a console surface.
//!
//! Pass one paints opaque background quads, pass two alpha-blends glyph
//! quads sampled from the atlas. Cells are normalized before any cache
//! comparison so that the many ways a cell can be "glyphless" collapse
//! to a single representation.

use glowgrid_data::{Cell, Color, GLYPH_NONE, GLYPH_SPACE, Surface, Tileset};

use crate::{
    atlas::GlyphAtlas,
    backend::{Backend, TextureId},
    batch::QuadBatch,
    cache::ShadowCache,
    error::Error,
};

/// Collapses every invisible-glyph case to [`GLYPH_NONE`] with a zeroed
/// foreground, so equal-looking cells compare equal in the shadow cache.
pub(crate) fn normalize_cell(cell: &Cell, tileset: &Tileset) -> Cell {
    let mut cell = *cell;
    if cell.glyph == GLYPH_SPACE {
        cell.glyph = GLYPH_NONE;
    }
    if cell.glyph < 0
        || cell.glyph as usize >= tileset.capacity()
        || !tileset.is_defined(cell.glyph as usize)
    {
        cell.glyph = GLYPH_NONE;
    }
    if cell.fg.a == 0 {
        cell.glyph = GLYPH_NONE;
    }
    if cell.fg.a == 255 && cell.bg.a == 255 && cell.fg.eq_rgb(&cell.bg) {
        // the glyph would be drawn in the background color
        cell.glyph = GLYPH_NONE;
    }
    if cell.glyph == GLYPH_NONE {
        cell.fg = Color::TRANSPARENT;
    }
    cell
}

/// Rasterizes `surface` onto the current render target.
///
/// With a cache, only cells whose normalized state changed since the
/// last render are drawn; without one, every cell is.
///
/// # Errors
/// Fails when the cache dimensions do not match the surface (caller
/// error, nothing is drawn), when the atlas has no texture, or on
/// backend draw failures. A draw failure invalidates the cache, since
/// it has already recorded cells the target never received; the next
/// render repaints everything.
pub fn render<B: Backend>(
    backend: &mut B,
    atlas: &GlyphAtlas,
    batch: &mut QuadBatch,
    surface: &Surface,
    mut cache: Option<&mut ShadowCache>,
) -> Result<(), Error> {
    if let Some(cache) = cache.as_deref() {
        if cache.width() != surface.width() || cache.height() != surface.height() {
            return Err(Error::cache_size_mismatch());
        }
    }
    let result = render_passes(backend, atlas, batch, surface, cache.as_deref_mut());
    if result.is_err() {
        if let Some(cache) = cache.as_deref_mut() {
            cache.invalidate();
        }
    }
    result
}

fn render_passes<B: Backend>(
    backend: &mut B,
    atlas: &GlyphAtlas,
    batch: &mut QuadBatch,
    surface: &Surface,
    mut cache: Option<&mut ShadowCache>,
) -> Result<(), Error> {
    let texture = atlas.texture()?;
    let tileset = atlas.tileset();
    let tileset = tileset.borrow();
    let width = surface.width();
    let (tile_width, tile_height) = (atlas.tile_width(), atlas.tile_height());

    // background pass
    for (index, raw) in surface.cells().iter().enumerate() {
        let cell = normalize_cell(raw, &tileset);
        if let Some(cache) = cache.as_deref_mut() {
            if !cache.background_dirty(index, &cell) {
                continue;
            }
        }
        let (x, y) = (index as i32 % width, index as i32 / width);
        batch.push_background(backend, x, y, &cell, tile_width, tile_height)?;
    }
    batch.flush_background(backend)?;

    // foreground pass
    let u_mul = 1.0 / atlas.texture_size() as f32;
    let v_mul = u_mul; // the atlas texture is square
    for (index, raw) in surface.cells().iter().enumerate() {
        let cell = normalize_cell(raw, &tileset);
        if cell.glyph == GLYPH_NONE {
            continue;
        }
        if let Some(cache) = cache.as_deref_mut() {
            if !cache.foreground_dirty(index, &cell) {
                continue;
            }
        }
        let (x, y) = (index as i32 % width, index as i32 / width);
        batch.push_foreground(backend, x, y, &cell, atlas, u_mul, v_mul)?;
    }
    batch.flush_foreground(backend, texture)
}

/// Runs [`render`] against `target` instead of the current render
/// target, restoring the previous target afterwards even when the
/// render fails.
///
/// # Errors
/// Propagates [`render`] failures, then target-restore failures.
pub fn render_to_target<B: Backend>(
    backend: &mut B,
    atlas: &GlyphAtlas,
    batch: &mut QuadBatch,
    target: TextureId,
    surface: &Surface,
    cache: Option<&mut ShadowCache>,
) -> Result<(), Error> {
    let previous = backend.render_target();
    backend.set_render_target(Some(target))?;
    let result = render(backend, atlas, batch, surface, cache);
    let restored = backend.set_render_target(previous);
    result.and(restored)
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::backend::{BlendMode, TextureAccess, recording::RecordingBackend};

    const GLYPH_A: i32 = 65;

    fn fixture() -> (RecordingBackend, GlyphAtlas, QuadBatch) {
        let mut backend = RecordingBackend::new((640, 480));
        let mut tileset = Tileset::new(8, 8, 128);
        let tile = vec![Color::WHITE; tileset.tile_len()];
        tileset.set_glyph(GLYPH_A as usize, &tile).unwrap();
        tileset.take_events();

        let atlas = GlyphAtlas::new(&mut backend, Rc::new(RefCell::new(tileset))).unwrap();
        (backend, atlas, QuadBatch::new())
    }

    fn tileset_of(atlas: &GlyphAtlas) -> Rc<RefCell<Tileset>> {
        atlas.tileset()
    }

    #[test]
    fn normalization_is_idempotent() {
        let (_, atlas, _) = fixture();
        let tileset = tileset_of(&atlas);
        let tileset = tileset.borrow();
        let cells = [
            Cell::new(GLYPH_A, Color::WHITE, Color::BLACK),
            Cell::new(GLYPH_SPACE, Color::WHITE, Color::BLACK),
            Cell::new(-3, Color::WHITE, Color::BLACK),
            Cell::new(GLYPH_A, Color::TRANSPARENT, Color::BLACK),
        ];
        for cell in &cells {
            let once = normalize_cell(cell, &tileset);
            assert_eq!(normalize_cell(&once, &tileset), once);
        }
    }

    #[test]
    fn invisible_glyphs_normalize_to_none() {
        let (_, atlas, _) = fixture();
        let tileset = tileset_of(&atlas);
        let tileset = tileset.borrow();

        // transparent foreground
        let cell = Cell::new(GLYPH_A, Color::new(255, 255, 255, 0), Color::BLACK);
        let normalized = normalize_cell(&cell, &tileset);
        assert_eq!(normalized.glyph, GLYPH_NONE);
        assert_eq!(normalized.fg, Color::TRANSPARENT);

        // opaque foreground on the identical opaque background
        let grey = Color::rgb(128, 128, 128);
        let cell = Cell::new(GLYPH_A, grey, grey);
        assert_eq!(normalize_cell(&cell, &tileset).glyph, GLYPH_NONE);

        // same colors but translucent background still shows the glyph
        let cell = Cell::new(GLYPH_A, grey, Color::new(128, 128, 128, 200));
        assert_eq!(normalize_cell(&cell, &tileset).glyph, GLYPH_A);

        // undefined and out-of-range glyph indices
        let cell = Cell::new(66, Color::WHITE, Color::BLACK);
        assert_eq!(normalize_cell(&cell, &tileset).glyph, GLYPH_NONE);
        let cell = Cell::new(100_000, Color::WHITE, Color::BLACK);
        assert_eq!(normalize_cell(&cell, &tileset).glyph, GLYPH_NONE);
    }

    #[test]
    fn uncached_render_draws_two_passes() {
        let (mut backend, atlas, mut batch) = fixture();
        let mut surface = Surface::new(4, 3);
        surface.put(1, 1, Cell::new(GLYPH_A, Color::WHITE, Color::BLACK));

        render(&mut backend, &atlas, &mut batch, &surface, None).unwrap();

        assert_eq!(backend.draws.len(), 2);
        let bg = &backend.draws[0];
        assert_eq!(bg.blend, BlendMode::Opaque);
        assert!(bg.texture.is_none());
        assert_eq!(bg.vertices.len(), 4 * 12); // every cell has a background

        let fg = &backend.draws[1];
        assert_eq!(fg.blend, BlendMode::Alpha);
        assert_eq!(fg.texture, Some(atlas.texture().unwrap()));
        assert_eq!(fg.vertices.len(), 4); // one visible glyph
        let uvs = fg.uvs.as_ref().unwrap();
        assert!(uvs.iter().all(|uv| (0.0..=1.0).contains(&uv.u)));
    }

    #[test]
    fn cached_rerender_of_unchanged_surface_draws_nothing() {
        let (mut backend, atlas, mut batch) = fixture();
        let mut surface = Surface::new(4, 3);
        surface.put(0, 0, Cell::new(GLYPH_A, Color::WHITE, Color::BLACK));
        let mut cache = ShadowCache::new(4, 3);

        render(&mut backend, &atlas, &mut batch, &surface, Some(&mut cache)).unwrap();
        backend.draws.clear();

        render(&mut backend, &atlas, &mut batch, &surface, Some(&mut cache)).unwrap();
        assert!(backend.draws.is_empty());
    }

    #[test]
    fn cached_rerender_draws_only_changed_cells() {
        let (mut backend, atlas, mut batch) = fixture();
        let mut surface = Surface::new(4, 3);
        let mut cache = ShadowCache::new(4, 3);
        render(&mut backend, &atlas, &mut batch, &surface, Some(&mut cache)).unwrap();
        backend.draws.clear();

        surface.put(2, 2, Cell::new(GLYPH_A, Color::WHITE, Color::rgb(0, 0, 64)));
        render(&mut backend, &atlas, &mut batch, &surface, Some(&mut cache)).unwrap();

        assert_eq!(backend.draws.len(), 2);
        assert_eq!(backend.draws[0].vertices.len(), 4);
        assert_eq!(backend.draws[1].vertices.len(), 4);
    }

    #[test]
    fn glyph_recolor_redraws_background_and_glyph() {
        let (mut backend, atlas, mut batch) = fixture();
        let mut surface = Surface::new(2, 1);
        surface.put(0, 0, Cell::new(GLYPH_A, Color::WHITE, Color::BLACK));
        let mut cache = ShadowCache::new(2, 1);
        render(&mut backend, &atlas, &mut batch, &surface, Some(&mut cache)).unwrap();
        backend.draws.clear();

        surface.put(0, 0, Cell::new(GLYPH_A, Color::rgb(255, 0, 0), Color::BLACK));
        render(&mut backend, &atlas, &mut batch, &surface, Some(&mut cache)).unwrap();

        // the background quad erases the white glyph, the foreground quad
        // repaints it in red
        assert_eq!(backend.draws.len(), 2);
        assert_eq!(backend.draws[0].blend, BlendMode::Opaque);
        assert_eq!(backend.draws[1].blend, BlendMode::Alpha);
        assert!(
            backend.draws[1]
                .vertices
                .iter()
                .all(|v| v.rgba == Color::rgb(255, 0, 0))
        );
    }

    #[test]
    fn invalidated_cache_redraws_everything() {
        let (mut backend, atlas, mut batch) = fixture();
        let surface = Surface::new(3, 2);
        let mut cache = ShadowCache::new(3, 2);
        render(&mut backend, &atlas, &mut batch, &surface, Some(&mut cache)).unwrap();
        backend.draws.clear();

        cache.invalidate();
        render(&mut backend, &atlas, &mut batch, &surface, Some(&mut cache)).unwrap();
        assert_eq!(backend.draws[0].vertices.len(), 4 * 6);
    }

    #[test]
    fn failed_foreground_flush_repaints_cleanly_next_frame() {
        let (mut backend, atlas, mut batch) = fixture();
        let mut surface = Surface::new(2, 1);
        let mut cache = ShadowCache::new(2, 1);
        render(&mut backend, &atlas, &mut batch, &surface, Some(&mut cache)).unwrap();

        // adding a glyph over an unchanged background dirties only the
        // foreground pass, so the failing draw is the glyph submission
        surface.put(0, 0, Cell::new(GLYPH_A, Color::rgb(255, 0, 0), Color::BLACK));
        backend.fail_next_draw = true;
        let result = render(&mut backend, &atlas, &mut batch, &surface, Some(&mut cache));
        assert!(result.is_err());
        backend.draws.clear();

        render(&mut backend, &atlas, &mut batch, &surface, Some(&mut cache)).unwrap();

        // no quad from the failed glyph submission may leak into the
        // opaque pass, and the glyph itself must be drawn this time
        let bg = &backend.draws[0];
        assert_eq!(bg.blend, BlendMode::Opaque);
        assert!(bg.vertices.iter().all(|v| v.rgba == Color::BLACK));
        let fg = &backend.draws[1];
        assert_eq!(fg.blend, BlendMode::Alpha);
        assert_eq!(fg.vertices.len(), 4);
        assert!(fg.vertices.iter().all(|v| v.rgba == Color::rgb(255, 0, 0)));
    }

    #[test]
    fn mismatched_cache_dimensions_are_rejected() {
        let (mut backend, atlas, mut batch) = fixture();
        let surface = Surface::new(4, 3);
        let mut cache = ShadowCache::new(3, 4);

        let result = render(&mut backend, &atlas, &mut batch, &surface, Some(&mut cache));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
        assert!(backend.draws.is_empty());
    }

    #[test]
    fn render_to_target_restores_previous_target() {
        let (mut backend, atlas, mut batch) = fixture();
        let target = backend.create_texture(32, 24, TextureAccess::Target).unwrap();
        let surface = Surface::new(4, 3);

        render_to_target(&mut backend, &atlas, &mut batch, target, &surface, None).unwrap();
        assert_eq!(backend.render_target(), None);
        assert!(backend.draws.iter().all(|d| d.target == Some(target)));

        // an error mid-render must still restore the target
        let mut cache = ShadowCache::new(1, 1);
        let result = render_to_target(
            &mut backend,
            &atlas,
            &mut batch,
            target,
            &surface,
            Some(&mut cache),
        );
        assert!(result.is_err());
        assert_eq!(backend.render_target(), None);
    }
}

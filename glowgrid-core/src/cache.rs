//! Shadow cache: the last rendered state of every cell, consulted by the
//! two render passes to skip unchanged quads.
//!
//! The two passes are coupled through the cache. The background pass
//! repaints a cell whenever its background changed, but also whenever a
//! still-cached glyph is about to change or recolor, because the opaque
//! background quad is what erases the old glyph. When it repaints, it
//! clears the cached glyph so the foreground pass sees the cell as
//! glyphless and redraws. The foreground pass then only compares glyph
//! indices.

use glowgrid_data::{Cell, Color, GLYPH_NONE};

/// Cached glyph value meaning "unknown, treat as dirty".
const GLYPH_UNKNOWN: i32 = -1;

/// Per-cell memory of what the render target currently shows.
#[derive(Debug, Clone)]
pub struct ShadowCache {
    width: i32,
    height: i32,
    cells: Vec<Cell>,
}

impl ShadowCache {
    /// Creates a cache where every cell counts as dirty.
    #[must_use]
    pub fn new(width: i32, height: i32) -> Self {
        let len = (width.max(0) as usize) * (height.max(0) as usize);
        Self {
            width,
            height,
            cells: vec![Self::unknown_cell(); len],
        }
    }

    /// Cached grid width in cells.
    #[must_use]
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Cached grid height in cells.
    #[must_use]
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Marks every cell dirty. Called after an atlas repack or a backend
    /// target loss, when the target contents can no longer be trusted.
    pub fn invalidate(&mut self) {
        self.cells.fill(Self::unknown_cell());
    }

    /// Background-pass check for the cell at flat index `index`, holding
    /// the already normalized `cell`.
    ///
    /// When dirty, the cache entry is rewritten to a glyphless cell with
    /// the new background, so a changed glyph also reads as dirty in the
    /// foreground pass.
    pub(crate) fn background_dirty(&mut self, index: usize, cell: &Cell) -> bool {
        let cached = &self.cells[index];
        let glyph_repaint = cached.glyph != GLYPH_NONE
            && (cached.glyph != cell.glyph || cached.fg != cell.fg);
        if cached.bg == cell.bg && !glyph_repaint {
            return false;
        }
        self.cells[index] = Cell::new(GLYPH_NONE, Color::TRANSPARENT, cell.bg);
        true
    }

    /// Foreground-pass check for the cell at flat index `index`. The
    /// background pass already demoted glyph recolors to glyph changes,
    /// so comparing glyph indices is sufficient here.
    pub(crate) fn foreground_dirty(&mut self, index: usize, cell: &Cell) -> bool {
        let cached = &mut self.cells[index];
        if cached.glyph == cell.glyph {
            return false;
        }
        cached.glyph = cell.glyph;
        cached.fg = cell.fg;
        true
    }

    fn unknown_cell() -> Cell {
        Cell::new(GLYPH_UNKNOWN, Color::TRANSPARENT, Color::TRANSPARENT)
    }
}

use crate::Color;

/// Glyph index meaning "no visible foreground glyph".
pub const GLYPH_NONE: i32 = 0;

/// Glyph index of the space character.
///
/// Glyph indices follow the codepoint-for-ASCII convention, so a space is
/// always `0x20`. Spaces never draw a foreground glyph and normalize to
/// [`GLYPH_NONE`] before cache comparison.
pub const GLYPH_SPACE: i32 = 0x20;

/// One character position on a console surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    /// Index into the active tileset. Negative values are reserved for
    /// renderer-internal sentinels and never draw.
    pub glyph: i32,
    /// Foreground (glyph) color.
    pub fg: Color,
    /// Background fill color.
    pub bg: Color,
}

impl Cell {
    /// A cell from explicit glyph and colors.
    #[must_use]
    pub const fn new(glyph: i32, fg: Color, bg: Color) -> Self {
        Self { glyph, fg, bg }
    }
}

impl Default for Cell {
    /// A blank cell: space glyph, white on black.
    fn default() -> Self {
        Self::new(GLYPH_SPACE, Color::WHITE, Color::BLACK)
    }
}

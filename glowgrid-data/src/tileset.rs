use std::{fs::File, path::Path};

use crate::Color;

/// Errors raised while building or loading a tileset.
#[derive(thiserror::Error, Debug)]
pub enum TilesetError {
    /// Failed to read a tile-sheet file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The tile-sheet file is not a decodable PNG.
    #[error("PNG decode error: {0}")]
    Decode(#[from] png::DecodingError),

    /// The decoded image or supplied pixel data has the wrong shape.
    #[error("Tile layout error: {0}")]
    Layout(String),
}

/// A change to a tileset, queued for the renderer.
///
/// Events are recorded by mutating calls and drained synchronously by the
/// glyph atlas before the next frame. There is no ambient dispatch; a
/// tileset has no idea who consumes its events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TilesetEvent {
    /// The bitmap for one glyph slot changed.
    GlyphChanged(usize),
    /// The number of reserved glyph slots changed.
    CapacityChanged,
}

/// Storage for glyph bitmaps, addressed by glyph index.
///
/// All glyphs share the same pixel dimensions. Capacity grows on demand;
/// slots that were never written stay undefined and render as empty.
#[derive(Debug, Clone)]
pub struct Tileset {
    tile_width: i32,
    tile_height: i32,
    defined: Vec<bool>,
    pixels: Vec<Color>,
    events: Vec<TilesetEvent>,
}

impl Tileset {
    /// Creates an empty tileset with `capacity` reserved glyph slots.
    #[must_use]
    pub fn new(tile_width: i32, tile_height: i32, capacity: usize) -> Self {
        debug_assert!(tile_width >= 0 && tile_height >= 0);

        let tile_len = (tile_width.max(0) * tile_height.max(0)) as usize;
        Self {
            tile_width,
            tile_height,
            defined: vec![false; capacity],
            pixels: vec![Color::TRANSPARENT; capacity * tile_len],
            events: Vec::new(),
        }
    }

    /// Loads a tileset from a PNG tile sheet divided into an even grid of
    /// `columns` x `rows` tiles, assigned glyph indices in raster order.
    ///
    /// Accepts 8-bit RGB and RGBA images; RGB pixels become fully opaque.
    ///
    /// # Errors
    /// Fails if the file cannot be read or decoded, or if its dimensions
    /// do not divide evenly into the requested grid.
    pub fn from_png(path: impl AsRef<Path>, columns: i32, rows: i32) -> Result<Self, TilesetError> {
        let decoder = png::Decoder::new(File::open(path)?);
        let mut reader = decoder.read_info()?;
        let mut raw = vec![0u8; reader.output_buffer_size()];
        let frame = reader.next_frame(&mut raw)?;
        raw.truncate(frame.buffer_size());

        if columns <= 0 || rows <= 0 {
            return Err(TilesetError::Layout(format!(
                "Tile grid must be positive, got {columns}x{rows}"
            )));
        }
        if frame.bit_depth != png::BitDepth::Eight {
            return Err(TilesetError::Layout(
                "Only 8-bit tile sheets are supported".to_string(),
            ));
        }
        let sheet = decode_rgba(&raw, frame.color_type)?;

        let (width, height) = (frame.width as i32, frame.height as i32);
        if width % columns != 0 || height % rows != 0 {
            return Err(TilesetError::Layout(format!(
                "Image size {width}x{height} does not divide into {columns}x{rows} tiles"
            )));
        }

        let tile_width = width / columns;
        let tile_height = height / rows;
        let mut tileset = Self::new(tile_width, tile_height, (columns * rows) as usize);
        let mut tile = vec![Color::TRANSPARENT; (tile_width * tile_height) as usize];
        for ty in 0..rows {
            for tx in 0..columns {
                for row in 0..tile_height {
                    let src = ((ty * tile_height + row) * width + tx * tile_width) as usize;
                    let dst = (row * tile_width) as usize;
                    tile[dst..dst + tile_width as usize]
                        .copy_from_slice(&sheet[src..src + tile_width as usize]);
                }
                tileset.set_glyph((ty * columns + tx) as usize, &tile)?;
            }
        }
        tileset.events.clear(); // freshly loaded, nothing to sync yet
        Ok(tileset)
    }

    /// Width in pixels of every glyph bitmap.
    #[must_use]
    pub fn tile_width(&self) -> i32 {
        self.tile_width
    }

    /// Height in pixels of every glyph bitmap.
    #[must_use]
    pub fn tile_height(&self) -> i32 {
        self.tile_height
    }

    /// Number of pixels in one glyph bitmap.
    #[must_use]
    pub fn tile_len(&self) -> usize {
        (self.tile_width * self.tile_height) as usize
    }

    /// Number of reserved glyph slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.defined.len()
    }

    /// Returns true if a bitmap has been assigned to `glyph`.
    #[must_use]
    pub fn is_defined(&self, glyph: usize) -> bool {
        self.defined.get(glyph).copied().unwrap_or(false)
    }

    /// The bitmap assigned to `glyph`, row-major. Undefined slots return
    /// transparent pixels.
    #[must_use]
    pub fn glyph_pixels(&self, glyph: usize) -> &[Color] {
        let tile_len = self.tile_len();
        &self.pixels[glyph * tile_len..(glyph + 1) * tile_len]
    }

    /// Assigns a bitmap to `glyph`, growing capacity when needed.
    ///
    /// # Errors
    /// Fails if `pixels` does not hold exactly one tile worth of pixels.
    pub fn set_glyph(&mut self, glyph: usize, pixels: &[Color]) -> Result<(), TilesetError> {
        if pixels.len() != self.tile_len() {
            return Err(TilesetError::Layout(format!(
                "Expected {} pixels per glyph, got {}",
                self.tile_len(),
                pixels.len()
            )));
        }
        self.reserve(glyph + 1);

        let tile_len = self.tile_len();
        self.pixels[glyph * tile_len..(glyph + 1) * tile_len].copy_from_slice(pixels);
        self.defined[glyph] = true;
        self.events.push(TilesetEvent::GlyphChanged(glyph));
        Ok(())
    }

    /// Grows the reserved slot count to at least `capacity`.
    pub fn reserve(&mut self, capacity: usize) {
        if capacity <= self.capacity() {
            return;
        }
        let tile_len = self.tile_len();
        self.defined.resize(capacity, false);
        self.pixels.resize(capacity * tile_len, Color::TRANSPARENT);
        self.events.push(TilesetEvent::CapacityChanged);
    }

    /// Drains all pending change events, oldest first.
    pub fn take_events(&mut self) -> Vec<TilesetEvent> {
        std::mem::take(&mut self.events)
    }

    /// Puts drained but unapplied events back at the front of the queue,
    /// ahead of anything recorded since, so a consumer that failed
    /// partway retries them in order.
    pub fn requeue_events(&mut self, events: Vec<TilesetEvent>) {
        if events.is_empty() {
            return;
        }
        let mut restored = events;
        restored.append(&mut self.events);
        self.events = restored;
    }
}

fn decode_rgba(raw: &[u8], color_type: png::ColorType) -> Result<Vec<Color>, TilesetError> {
    match color_type {
        png::ColorType::Rgba => Ok(raw
            .chunks_exact(4)
            .map(|px| Color::new(px[0], px[1], px[2], px[3]))
            .collect()),
        png::ColorType::Rgb => Ok(raw
            .chunks_exact(3)
            .map(|px| Color::rgb(px[0], px[1], px[2]))
            .collect()),
        other => Err(TilesetError::Layout(format!(
            "Unsupported PNG color type: {other:?}"
        ))),
    }
}

//! Data types shared by the glowgrid console renderer.
//!
//! This crate carries no rendering dependencies: it defines the console
//! [`Surface`] of [`Cell`]s, the [`Color`] type used for cell and vertex
//! colors, and the [`Tileset`] holding glyph bitmaps that the renderer
//! packs into its texture atlas.

mod cell;
mod color;
mod surface;
mod tileset;

pub use cell::{Cell, GLYPH_NONE, GLYPH_SPACE};
pub use color::Color;
pub use surface::Surface;
pub use tileset::{Tileset, TilesetError, TilesetEvent};

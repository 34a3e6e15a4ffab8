//! Incremental rasterizer for console surfaces of character cells.
//!
//! A [`Context`] renders a [`Surface`](glowgrid_data::Surface) of glyph
//! cells through a [`backend::Backend`] in two passes: opaque background
//! quads, then alpha-blended glyphs sampled from a growable texture
//! atlas. A per-cell shadow cache keeps redraws proportional to what
//! actually changed between frames.
//!
//! ```no_run
//! use std::{cell::RefCell, rc::Rc};
//!
//! use glowgrid_core::{Context, ViewportOptions, data::{Cell, Color, Surface, Tileset}};
//! # fn example(backend: glowgrid_core::backend::GlBackend) -> Result<(), glowgrid_core::Error> {
//! let tileset = Tileset::from_png("font_8x8.png", 16, 16)?;
//! let mut context = Context::new(backend, Rc::new(RefCell::new(tileset)))?;
//!
//! let mut surface = Surface::new(80, 50);
//! surface.put(0, 0, Cell::new('@' as i32, Color::WHITE, Color::BLACK));
//! context.present(&surface, &ViewportOptions::default())?;
//! # Ok(())
//! # }
//! ```

mod atlas;
/// Rendering backend abstraction and the OpenGL implementation.
pub mod backend;
mod batch;
mod cache;
mod context;
mod error;
mod raster;
mod viewport;

pub use atlas::GlyphAtlas;
pub use batch::QuadBatch;
pub use cache::ShadowCache;
pub use context::Context;
pub use error::Error;
pub use glowgrid_data as data;
pub use raster::{render, render_to_target};
pub use viewport::{CursorTransform, ViewportOptions, destination_rect};

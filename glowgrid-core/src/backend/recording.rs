//! In-memory [`Backend`] double that records every call, used to assert
//! on batching, pass ordering, and upload traffic without a GL context.

use std::collections::HashMap;

use glowgrid_data::Color;

use super::{
    Backend, BlendMode, PixelReadback, PixelRect, TextureAccess, TextureId, Vertex, VertexUv,
};
use crate::error::Error;

/// One recorded `draw_quads` submission.
#[derive(Debug, Clone)]
pub(crate) struct DrawCall {
    pub(crate) texture: Option<TextureId>,
    pub(crate) blend: BlendMode,
    pub(crate) vertices: Vec<Vertex>,
    pub(crate) uvs: Option<Vec<VertexUv>>,
    pub(crate) indices: Vec<u16>,
    pub(crate) target: Option<TextureId>,
}

/// One recorded `upload_texture` call.
#[derive(Debug, Clone)]
pub(crate) struct Upload {
    pub(crate) texture: TextureId,
    pub(crate) rect: PixelRect,
    pub(crate) pixel_count: usize,
}

#[derive(Debug)]
pub(crate) struct RecordingBackend {
    output_size: (i32, i32),
    textures: HashMap<u32, (i32, i32)>,
    next_texture: u32,
    target: Option<TextureId>,
    target_reset: bool,
    pub(crate) draws: Vec<DrawCall>,
    pub(crate) uploads: Vec<Upload>,
    pub(crate) copies: Vec<(TextureId, PixelRect)>,
    pub(crate) clears: Vec<(Option<TextureId>, Color)>,
    pub(crate) presents: u32,
    /// When set, the next `create_texture` call fails once.
    pub(crate) fail_next_create: bool,
    /// When set, the next non-empty `draw_quads` call fails once.
    pub(crate) fail_next_draw: bool,
    /// When set to `Some(n)`, the `upload_texture` call that would be
    /// recorded at index `n` fails once.
    pub(crate) fail_upload_at: Option<usize>,
}

impl RecordingBackend {
    pub(crate) fn new(output_size: (i32, i32)) -> Self {
        Self {
            output_size,
            textures: HashMap::new(),
            next_texture: 1,
            target: None,
            target_reset: false,
            draws: Vec::new(),
            uploads: Vec::new(),
            copies: Vec::new(),
            clears: Vec::new(),
            presents: 0,
            fail_next_create: false,
            fail_next_draw: false,
            fail_upload_at: None,
        }
    }

    pub(crate) fn set_target_reset(&mut self) {
        self.target_reset = true;
    }

    pub(crate) fn texture_alive(&self, texture: TextureId) -> bool {
        self.textures.contains_key(&texture.0)
    }

    pub(crate) fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Uploads targeting `texture`, in submission order.
    pub(crate) fn uploads_for(&self, texture: TextureId) -> Vec<&Upload> {
        self.uploads
            .iter()
            .filter(|u| u.texture == texture)
            .collect()
    }
}

impl Backend for RecordingBackend {
    fn output_size(&self) -> (i32, i32) {
        self.output_size
    }

    fn create_texture(
        &mut self,
        width: i32,
        height: i32,
        _access: TextureAccess,
    ) -> Result<TextureId, Error> {
        if self.fail_next_create {
            self.fail_next_create = false;
            return Err(Error::texture_allocation_failed("simulated failure"));
        }
        let id = self.next_texture;
        self.next_texture += 1;
        self.textures.insert(id, (width, height));
        Ok(TextureId(id))
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture.0);
        if self.target == Some(texture) {
            self.target = None;
        }
    }

    fn texture_size(&self, texture: TextureId) -> (i32, i32) {
        self.textures.get(&texture.0).copied().unwrap_or((0, 0))
    }

    fn upload_texture(
        &mut self,
        texture: TextureId,
        rect: PixelRect,
        pixels: &[Color],
    ) -> Result<(), Error> {
        if !self.textures.contains_key(&texture.0) {
            return Err(Error::unknown_texture());
        }
        if self.fail_upload_at == Some(self.uploads.len()) {
            self.fail_upload_at = None;
            return Err(Error::Backend("simulated upload failure".to_string()));
        }
        self.uploads.push(Upload {
            texture,
            rect,
            pixel_count: pixels.len(),
        });
        Ok(())
    }

    fn draw_quads(
        &mut self,
        texture: Option<TextureId>,
        blend: BlendMode,
        vertices: &[Vertex],
        uvs: Option<&[VertexUv]>,
        indices: &[u16],
    ) -> Result<(), Error> {
        if vertices.is_empty() || indices.is_empty() {
            return Ok(());
        }
        if self.fail_next_draw {
            self.fail_next_draw = false;
            return Err(Error::Backend("simulated draw failure".to_string()));
        }
        self.draws.push(DrawCall {
            texture,
            blend,
            vertices: vertices.to_vec(),
            uvs: uvs.map(<[VertexUv]>::to_vec),
            indices: indices.to_vec(),
            target: self.target,
        });
        Ok(())
    }

    fn copy_texture(&mut self, texture: TextureId, dest: PixelRect) -> Result<(), Error> {
        if !self.textures.contains_key(&texture.0) {
            return Err(Error::unknown_texture());
        }
        self.copies.push((texture, dest));
        Ok(())
    }

    fn set_render_target(&mut self, target: Option<TextureId>) -> Result<(), Error> {
        if let Some(id) = target {
            if !self.textures.contains_key(&id.0) {
                return Err(Error::unknown_texture());
            }
        }
        self.target = target;
        Ok(())
    }

    fn render_target(&self) -> Option<TextureId> {
        self.target
    }

    fn clear(&mut self, color: Color) -> Result<(), Error> {
        self.clears.push((self.target, color));
        Ok(())
    }

    fn read_pixels(&mut self) -> Result<PixelReadback, Error> {
        let (width, height) = match self.target {
            Some(id) => self.texture_size(id),
            None => self.output_size,
        };
        Ok(PixelReadback {
            pixels: vec![0; (width.max(0) * height.max(0) * 4) as usize],
            width,
            height,
        })
    }

    fn present(&mut self) {
        self.presents += 1;
    }

    fn take_target_reset(&mut self) -> bool {
        std::mem::take(&mut self.target_reset)
    }
}

use std::collections::HashMap;

use glow::{HasContext, PixelPackData, PixelUnpackData};
use glowgrid_data::Color;

use super::{
    Backend, BlendMode, PixelReadback, PixelRect, TextureAccess, TextureId, Vertex, VertexUv,
    program::ShaderProgram, state::GlState,
};
use crate::error::Error;

/// GL shader language target for version injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlslVersion {
    /// WebGL2 / OpenGL ES 3.0: `#version 300 es`
    Es300,
    /// OpenGL 3.3 Core: `#version 330 core`
    Gl330,
}

impl GlslVersion {
    fn vertex_preamble(&self) -> &'static str {
        match self {
            Self::Es300 => "#version 300 es\nprecision highp float;\n",
            Self::Gl330 => "#version 330 core\n",
        }
    }

    fn fragment_preamble(&self) -> &'static str {
        match self {
            Self::Es300 => "#version 300 es\nprecision mediump float;\n",
            Self::Gl330 => "#version 330 core\n",
        }
    }
}

struct TextureEntry {
    texture: glow::Texture,
    framebuffer: Option<glow::Framebuffer>,
    size: (i32, i32),
}

/// [`Backend`] implementation over a `glow` context.
///
/// Owns one shader program and three streaming buffers shared by every
/// draw; textures and their framebuffers live in a registry keyed by
/// [`TextureId`]. The embedder supplies the context and a swap callback;
/// window management stays outside this crate.
#[must_use = "call `delete()` before dropping to avoid GPU resource leaks"]
pub struct GlBackend {
    gl: glow::Context,
    program: ShaderProgram,
    state: GlState,
    vao: glow::VertexArray,
    vbo_vertex: glow::Buffer,
    vbo_uv: glow::Buffer,
    ebo: glow::Buffer,
    u_projection: glow::UniformLocation,
    u_textured: glow::UniformLocation,
    u_sampler: glow::UniformLocation,
    textures: HashMap<u32, TextureEntry>,
    next_texture: u32,
    output_size: (i32, i32),
    target: Option<TextureId>,
    target_reset: bool,
    swap: Box<dyn FnMut()>,
    // scratch for untextured draws, so attribute 2 never reads past its buffer
    zero_uvs: Vec<VertexUv>,
}

impl GlBackend {
    const FRAGMENT_GLSL: &'static str = include_str!("../shaders/quad.frag");
    const VERTEX_GLSL: &'static str = include_str!("../shaders/quad.vert");

    /// Wraps an existing `glow` context.
    ///
    /// `swap` publishes the finished frame (e.g. a buffer-swap closure
    /// from the windowing layer).
    ///
    /// # Errors
    /// Fails if the shader program or streaming buffers cannot be
    /// created; nothing is left allocated on failure.
    pub fn new(
        gl: glow::Context,
        output_size: (i32, i32),
        glsl_version: GlslVersion,
        swap: impl FnMut() + 'static,
    ) -> Result<Self, Error> {
        let vertex_source = format!("{}{}", glsl_version.vertex_preamble(), Self::VERTEX_GLSL);
        let fragment_source =
            format!("{}{}", glsl_version.fragment_preamble(), Self::FRAGMENT_GLSL);
        let program = ShaderProgram::create(&gl, &vertex_source, &fragment_source)?;

        let buffers = Self::create_buffers(&gl);
        let (vao, vbo_vertex, vbo_uv, ebo) = match buffers {
            Ok(buffers) => buffers,
            Err(err) => {
                program.delete(&gl);
                return Err(err);
            },
        };

        program.use_program(&gl);
        let (u_projection, u_textured, u_sampler) = match Self::locate_uniforms(&gl, &program) {
            Ok(locations) => locations,
            Err(err) => {
                program.delete(&gl);
                unsafe {
                    gl.delete_vertex_array(vao);
                    gl.delete_buffer(vbo_vertex);
                    gl.delete_buffer(vbo_uv);
                    gl.delete_buffer(ebo);
                }
                return Err(err);
            },
        };

        Ok(Self {
            gl,
            program,
            state: GlState::new(),
            vao,
            vbo_vertex,
            vbo_uv,
            ebo,
            u_projection,
            u_textured,
            u_sampler,
            textures: HashMap::new(),
            next_texture: 1,
            output_size,
            target: None,
            target_reset: false,
            swap: Box::new(swap),
            zero_uvs: Vec::new(),
        })
    }

    /// Updates the output size after a window resize.
    pub fn set_output_size(&mut self, size: (i32, i32)) {
        self.output_size = size;
    }

    /// Records a device reset; the next frame observes it via
    /// [`Backend::take_target_reset`].
    pub fn notify_target_reset(&mut self) {
        self.target_reset = true;
    }

    /// Releases every GPU resource owned by this backend.
    pub fn delete(self) {
        let gl = &self.gl;
        for entry in self.textures.values() {
            if let Some(fbo) = entry.framebuffer {
                unsafe { gl.delete_framebuffer(fbo) };
            }
            unsafe { gl.delete_texture(entry.texture) };
        }
        unsafe {
            gl.delete_vertex_array(self.vao);
            gl.delete_buffer(self.vbo_vertex);
            gl.delete_buffer(self.vbo_uv);
            gl.delete_buffer(self.ebo);
        }
        self.program.delete(gl);
    }

    fn locate_uniforms(
        gl: &glow::Context,
        program: &ShaderProgram,
    ) -> Result<(glow::UniformLocation, glow::UniformLocation, glow::UniformLocation), Error> {
        let locate = |name: &str| {
            unsafe { gl.get_uniform_location(program.program, name) }
                .ok_or_else(|| Error::Backend(format!("Failed to get uniform location: {name}")))
        };
        Ok((locate("u_projection")?, locate("u_textured")?, locate("u_sampler")?))
    }

    fn create_buffers(
        gl: &glow::Context,
    ) -> Result<(glow::VertexArray, glow::Buffer, glow::Buffer, glow::Buffer), Error> {
        let vao = unsafe { gl.create_vertex_array() }
            .map_err(|e| Error::Backend(format!("Failed to create vertex array object: {e}")))?;
        unsafe { gl.bind_vertex_array(Some(vao)) };

        let buffer = |name: &str| {
            unsafe { gl.create_buffer() }
                .map_err(|e| Error::Backend(format!("Failed to create {name} buffer: {e}")))
        };
        let vbo_vertex = buffer("vertex")?;
        let vbo_uv = buffer("uv")?;
        let ebo = buffer("index")?;

        let vertex_stride = size_of::<Vertex>() as i32;
        let uv_stride = size_of::<VertexUv>() as i32;
        unsafe {
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo_vertex));
            gl.enable_vertex_attrib_array(0);
            gl.vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, vertex_stride, 0);
            gl.enable_vertex_attrib_array(1);
            gl.vertex_attrib_pointer_f32(1, 4, glow::UNSIGNED_BYTE, true, vertex_stride, 8);

            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo_uv));
            gl.enable_vertex_attrib_array(2);
            gl.vertex_attrib_pointer_f32(2, 2, glow::FLOAT, false, uv_stride, 0);

            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(ebo));
            gl.bind_vertex_array(None);
        }

        Ok((vao, vbo_vertex, vbo_uv, ebo))
    }

    fn texture_entry(&self, texture: TextureId) -> Result<&TextureEntry, Error> {
        self.textures
            .get(&texture.0)
            .ok_or_else(Error::unknown_texture)
    }

    /// Uploads the projection for the current target and sets the
    /// viewport to match it.
    fn apply_projection(&mut self) -> Result<(), Error> {
        // Render-target textures keep pixel row 0 in texture row 0; only
        // the default framebuffer is y-flipped for presentation.
        let (size, flip) = match self.target {
            Some(id) => (self.texture_entry(id)?.size, false),
            None => (self.output_size, true),
        };
        let matrix = ortho(size.0 as f32, size.1 as f32, flip);
        unsafe {
            self.gl
                .uniform_matrix_4_f32_slice(Some(&self.u_projection), false, &matrix);
        }
        self.state.viewport(&self.gl, size.0, size.1);
        Ok(())
    }
}

impl Backend for GlBackend {
    fn output_size(&self) -> (i32, i32) {
        self.output_size
    }

    fn create_texture(
        &mut self,
        width: i32,
        height: i32,
        access: TextureAccess,
    ) -> Result<TextureId, Error> {
        let gl = &self.gl;
        let texture = unsafe { gl.create_texture() }
            .map_err(|e| Error::texture_allocation_failed(&e))?;

        let zeroed = vec![0u8; (width.max(0) * height.max(0) * 4) as usize];
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA8 as i32,
                width,
                height,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                PixelUnpackData::Slice(Some(&zeroed)),
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MIN_FILTER,
                glow::NEAREST as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MAG_FILTER,
                glow::NEAREST as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_S,
                glow::CLAMP_TO_EDGE as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_T,
                glow::CLAMP_TO_EDGE as i32,
            );
        }

        let framebuffer = match access {
            TextureAccess::Static => None,
            TextureAccess::Target => {
                let fbo = match unsafe { gl.create_framebuffer() } {
                    Ok(fbo) => fbo,
                    Err(e) => {
                        unsafe { gl.delete_texture(texture) };
                        return Err(Error::texture_allocation_failed(&e));
                    },
                };
                unsafe {
                    gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
                    gl.framebuffer_texture_2d(
                        glow::FRAMEBUFFER,
                        glow::COLOR_ATTACHMENT0,
                        glow::TEXTURE_2D,
                        Some(texture),
                        0,
                    );
                }
                let status = unsafe { gl.check_framebuffer_status(glow::FRAMEBUFFER) };
                let restore = self
                    .target
                    .and_then(|id| self.textures.get(&id.0))
                    .and_then(|entry| entry.framebuffer);
                unsafe { gl.bind_framebuffer(glow::FRAMEBUFFER, restore) };
                if status != glow::FRAMEBUFFER_COMPLETE {
                    unsafe {
                        gl.delete_framebuffer(fbo);
                        gl.delete_texture(texture);
                    }
                    return Err(Error::texture_allocation_failed("incomplete framebuffer"));
                }
                Some(fbo)
            },
        };

        let id = self.next_texture;
        self.next_texture += 1;
        self.textures.insert(
            id,
            TextureEntry {
                texture,
                framebuffer,
                size: (width, height),
            },
        );
        Ok(TextureId(id))
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some(entry) = self.textures.remove(&texture.0) {
            if self.target == Some(texture) {
                unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, None) };
                self.target = None;
            }
            if let Some(fbo) = entry.framebuffer {
                unsafe { self.gl.delete_framebuffer(fbo) };
            }
            unsafe { self.gl.delete_texture(entry.texture) };
        }
    }

    fn texture_size(&self, texture: TextureId) -> (i32, i32) {
        self.texture_entry(texture)
            .map(|entry| entry.size)
            .unwrap_or((0, 0))
    }

    fn upload_texture(
        &mut self,
        texture: TextureId,
        rect: PixelRect,
        pixels: &[Color],
    ) -> Result<(), Error> {
        if pixels.len() != (rect.w.max(0) * rect.h.max(0)) as usize {
            return Err(Error::InvalidArgument(format!(
                "Upload of {} pixels into a {}x{} rect",
                pixels.len(),
                rect.w,
                rect.h
            )));
        }
        let entry = self.texture_entry(texture)?;
        let gl = &self.gl;
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(entry.texture));
            gl.tex_sub_image_2d(
                glow::TEXTURE_2D,
                0,
                rect.x,
                rect.y,
                rect.w,
                rect.h,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                PixelUnpackData::Slice(Some(as_bytes(pixels))),
            );
        }
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
        self.program.use_program(&self.gl);
        self.apply_projection()?;
        self.state.blend(&self.gl, blend);

        let uvs = match uvs {
            Some(uvs) => uvs,
            None => {
                self.zero_uvs.resize(vertices.len(), VertexUv::default());
                &self.zero_uvs
            },
        };

        let gl = &self.gl;
        unsafe {
            gl.bind_vertex_array(Some(self.vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo_vertex));
            gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, as_bytes(vertices), glow::STREAM_DRAW);
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo_uv));
            gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, as_bytes(uvs), glow::STREAM_DRAW);
            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(self.ebo));
            gl.buffer_data_u8_slice(
                glow::ELEMENT_ARRAY_BUFFER,
                as_bytes(indices),
                glow::STREAM_DRAW,
            );
        }

        match texture {
            Some(id) => {
                let entry = self.texture_entry(id)?;
                unsafe {
                    gl.active_texture(glow::TEXTURE0);
                    gl.bind_texture(glow::TEXTURE_2D, Some(entry.texture));
                    gl.uniform_1_i32(Some(&self.u_sampler), 0);
                    gl.uniform_1_i32(Some(&self.u_textured), 1);
                }
            },
            None => unsafe { gl.uniform_1_i32(Some(&self.u_textured), 0) },
        }

        unsafe {
            gl.draw_elements(glow::TRIANGLES, indices.len() as i32, glow::UNSIGNED_SHORT, 0);
            gl.bind_vertex_array(None);
        }
        Ok(())
    }

    fn copy_texture(&mut self, texture: TextureId, dest: PixelRect) -> Result<(), Error> {
        let (x0, y0) = (dest.x as f32, dest.y as f32);
        let (x1, y1) = ((dest.x + dest.w) as f32, (dest.y + dest.h) as f32);
        let white = Color::WHITE;

        // upper-left, lower-left, upper-right, lower-right
        let vertices = [
            Vertex { x: x0, y: y0, rgba: white },
            Vertex { x: x0, y: y1, rgba: white },
            Vertex { x: x1, y: y0, rgba: white },
            Vertex { x: x1, y: y1, rgba: white },
        ];
        let uvs = [
            VertexUv { u: 0.0, v: 0.0 },
            VertexUv { u: 0.0, v: 1.0 },
            VertexUv { u: 1.0, v: 0.0 },
            VertexUv { u: 1.0, v: 1.0 },
        ];
        let indices = [0, 1, 2, 2, 1, 3];
        self.draw_quads(
            Some(texture),
            BlendMode::Opaque,
            &vertices,
            Some(&uvs),
            &indices,
        )
    }

    fn set_render_target(&mut self, target: Option<TextureId>) -> Result<(), Error> {
        match target {
            Some(id) => {
                let entry = self.texture_entry(id)?;
                let Some(fbo) = entry.framebuffer else {
                    return Err(Error::InvalidArgument(
                        "Texture was not created as a render target".to_string(),
                    ));
                };
                unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo)) };
            },
            None => unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, None) },
        }
        self.target = target;
        Ok(())
    }

    fn render_target(&self) -> Option<TextureId> {
        self.target
    }

    fn clear(&mut self, color: Color) -> Result<(), Error> {
        let size = match self.target {
            Some(id) => self.texture_entry(id)?.size,
            None => self.output_size,
        };
        self.state.viewport(&self.gl, size.0, size.1);
        self.state.clear_color(&self.gl, color);
        unsafe { self.gl.clear(glow::COLOR_BUFFER_BIT) };
        Ok(())
    }

    fn read_pixels(&mut self) -> Result<PixelReadback, Error> {
        let (width, height) = match self.target {
            Some(id) => self.texture_entry(id)?.size,
            None => self.output_size,
        };
        let mut pixels = vec![0u8; (width.max(0) * height.max(0) * 4) as usize];
        unsafe {
            self.gl.read_pixels(
                0,
                0,
                width,
                height,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                PixelPackData::Slice(Some(&mut pixels)),
            );
        }
        if self.target.is_none() {
            // default framebuffer rows come back bottom-up
            flip_rows(&mut pixels, width, height);
        }
        Ok(PixelReadback { pixels, width, height })
    }

    fn present(&mut self) {
        unsafe { self.gl.flush() };
        (self.swap)();
    }

    fn take_target_reset(&mut self) -> bool {
        std::mem::take(&mut self.target_reset)
    }
}

impl std::fmt::Debug for GlBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlBackend")
            .field("output_size", &self.output_size)
            .field("textures", &self.textures.len())
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

/// Column-major orthographic projection mapping pixel coordinates with a
/// top-left origin into clip space.
fn ortho(width: f32, height: f32, flip_y: bool) -> [f32; 16] {
    let sx = 2.0 / width;
    let (sy, ty) = if flip_y {
        (-2.0 / height, 1.0)
    } else {
        (2.0 / height, -1.0)
    };
    #[rustfmt::skip]
    let matrix = [
        sx,   0.0, 0.0, 0.0,
        0.0,  sy,  0.0, 0.0,
        0.0,  0.0, 1.0, 0.0,
        -1.0, ty,  0.0, 1.0,
    ];
    matrix
}

fn flip_rows(pixels: &mut [u8], width: i32, height: i32) {
    let stride = (width.max(0) * 4) as usize;
    if stride == 0 {
        return;
    }
    let (mut top, mut bottom) = (0, height.max(0) as usize);
    let mut scratch = vec![0u8; stride];
    while bottom > top + 1 {
        bottom -= 1;
        let (a, b) = (top * stride, bottom * stride);
        scratch.copy_from_slice(&pixels[a..a + stride]);
        pixels.copy_within(b..b + stride, a);
        pixels[b..b + stride].copy_from_slice(&scratch);
        top += 1;
    }
}

fn as_bytes<T: Copy>(data: &[T]) -> &[u8] {
    // Vertex, VertexUv, Color, and u16 are all repr(C) plain-old-data
    unsafe { std::slice::from_raw_parts(data.as_ptr().cast(), std::mem::size_of_val(data)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ortho_maps_corners() {
        let m = ortho(800.0, 500.0, true);
        // top-left pixel maps to NDC (-1, 1)
        assert_eq!(m[12], -1.0);
        assert_eq!(m[13], 1.0);
        // x = 800 -> m[0] * 800 + m[12] == 1
        assert!((m[0] * 800.0 + m[12] - 1.0).abs() < 1e-6);
        // y = 500 -> m[5] * 500 + m[13] == -1
        assert!((m[5] * 500.0 + m[13] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn flip_rows_reverses_row_order() {
        let mut pixels: Vec<u8> = (0..24).collect(); // 2x3 RGBA
        flip_rows(&mut pixels, 2, 3);
        assert_eq!(&pixels[0..8], &(16..24).collect::<Vec<u8>>()[..]);
        assert_eq!(&pixels[8..16], &(8..16).collect::<Vec<u8>>()[..]);
    }
}

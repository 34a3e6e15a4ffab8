use glow::HasContext;
use glowgrid_data::Color;

use super::BlendMode;

/// Caches the small set of GL state the quad pipeline toggles, so that
/// redundant state changes are skipped between draws.
#[derive(Debug)]
pub(super) struct GlState {
    blend: Option<BlendMode>,
    clear_color: [f32; 4],
    viewport: [i32; 4],
}

impl GlState {
    pub(super) fn new() -> Self {
        Self {
            blend: None,
            clear_color: [0.0; 4],
            viewport: [0; 4],
        }
    }

    pub(super) fn blend(&mut self, gl: &glow::Context, mode: BlendMode) {
        if self.blend == Some(mode) {
            return;
        }
        match mode {
            BlendMode::Opaque => unsafe { gl.disable(glow::BLEND) },
            BlendMode::Alpha => unsafe {
                gl.enable(glow::BLEND);
                gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
            },
        }
        self.blend = Some(mode);
    }

    pub(super) fn clear_color(&mut self, gl: &glow::Context, color: Color) {
        let rgba = [
            f32::from(color.r) / 255.0,
            f32::from(color.g) / 255.0,
            f32::from(color.b) / 255.0,
            f32::from(color.a) / 255.0,
        ];
        if self.clear_color != rgba {
            unsafe { gl.clear_color(rgba[0], rgba[1], rgba[2], rgba[3]) };
            self.clear_color = rgba;
        }
    }

    pub(super) fn viewport(&mut self, gl: &glow::Context, width: i32, height: i32) {
        let viewport = [0, 0, width, height];
        if self.viewport != viewport {
            unsafe { gl.viewport(0, 0, width, height) };
            self.viewport = viewport;
        }
    }
}

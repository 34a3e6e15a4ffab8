use glow::HasContext;

use crate::error::Error;

/// Compiled and linked shader pair for the quad pipeline.
#[derive(Debug)]
pub(super) struct ShaderProgram {
    pub(super) program: glow::Program,
}

impl ShaderProgram {
    pub(super) fn create(
        gl: &glow::Context,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self, Error> {
        let program = unsafe { gl.create_program() }
            .map_err(|e| Error::Backend(format!("Shader program creation failed: {e}")))?;

        let vertex_shader = match compile_shader(gl, glow::VERTEX_SHADER, vertex_source) {
            Ok(shader) => shader,
            Err(err) => {
                unsafe { gl.delete_program(program) };
                return Err(err);
            },
        };
        let fragment_shader = match compile_shader(gl, glow::FRAGMENT_SHADER, fragment_source) {
            Ok(shader) => shader,
            Err(err) => {
                unsafe {
                    gl.delete_shader(vertex_shader);
                    gl.delete_program(program);
                }
                return Err(err);
            },
        };

        unsafe {
            gl.attach_shader(program, vertex_shader);
            gl.attach_shader(program, fragment_shader);
            gl.link_program(program);
        }
        let linked = unsafe { gl.get_program_link_status(program) };

        // shaders are no longer needed once the program is linked
        unsafe {
            gl.delete_shader(vertex_shader);
            gl.delete_shader(fragment_shader);
        }

        if !linked {
            let log = unsafe { gl.get_program_info_log(program) };
            unsafe { gl.delete_program(program) };
            return Err(Error::Backend(format!("Shader linking failed: {log}")));
        }

        Ok(Self { program })
    }

    pub(super) fn use_program(&self, gl: &glow::Context) {
        unsafe { gl.use_program(Some(self.program)) };
    }

    pub(super) fn delete(&self, gl: &glow::Context) {
        unsafe { gl.delete_program(self.program) };
    }
}

fn compile_shader(
    gl: &glow::Context,
    shader_type: u32,
    source: &str,
) -> Result<glow::Shader, Error> {
    let shader = unsafe { gl.create_shader(shader_type) }
        .map_err(|e| Error::Backend(format!("Shader creation failed: {e}")))?;

    unsafe {
        gl.shader_source(shader, source);
        gl.compile_shader(shader);
    }

    let compiled = unsafe { gl.get_shader_compile_status(shader) };
    if !compiled {
        let log = unsafe { gl.get_shader_info_log(shader) };
        unsafe { gl.delete_shader(shader) };
        return Err(Error::Backend(format!("Shader compilation failed: {log}")));
    }

    Ok(shader)
}

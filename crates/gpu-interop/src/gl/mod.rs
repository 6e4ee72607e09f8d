//! OpenGL backend (macOS): a Syphon GL server fed by a framebuffer blit.

pub mod publisher;
pub mod server;
mod state;

use std::sync::Once;

use gl::types::GLenum;
use objc2_open_gl::CGLGetCurrentContext;

use crate::backend::{Backend, OpenGlBackend};
use crate::error::GpuError;

pub use publisher::GlCopyPublisher;
pub use server::GlSyphonServer;

static GL_INIT_ONCE: Once = Once::new();

/// Load GL function pointers. Runs once per process.
pub(crate) fn ensure_loaded() {
    GL_INIT_ONCE.call_once(|| {
        gl_loader::init_gl();
        gl::load_with(|s| gl_loader::get_proc_address(s).cast());
    });
}

/// Whether a CGL context is current on this thread.
pub(crate) fn context_current() -> bool {
    // SAFETY: only reads the calling thread's current context.
    unsafe { !CGLGetCurrentContext().is_null() }
}

pub(crate) fn clear_errors() {
    unsafe { while gl::GetError() != gl::NO_ERROR {} }
}

/// Map the first pending GL error, draining the rest.
pub(crate) fn check_error(during: &str) -> Result<(), GpuError> {
    let first: GLenum = unsafe { gl::GetError() };
    if first == gl::NO_ERROR {
        return Ok(());
    }
    clear_errors();

    Err(match first {
        gl::OUT_OF_MEMORY => GpuError::Allocation(format!("out of memory during {during}")),
        // GL_CONTEXT_LOST
        0x0507 => GpuError::ContextLost,
        other => GpuError::Copy(format!("GL error 0x{other:04X} during {during}")),
    })
}

/// Build an OpenGL backend on the CGL context current on this thread.
pub fn create_backend(name: &str) -> Result<Backend, GpuError> {
    let publisher = GlCopyPublisher::new()?;
    let server = GlSyphonServer::new(name)?;
    Ok(Backend::OpenGl(OpenGlBackend::new(
        Box::new(server),
        Box::new(publisher),
    )))
}

pub fn server_available() -> bool {
    crate::syphon::is_available(crate::syphon::OPENGL_SERVER_CLASS)
}

//! Backend tag, backend variants and the traits at the GPU seam.
//!
//! A [`Backend`] is exactly one of [`OpenGlBackend`] or [`MetalBackend`],
//! each holding only the objects it needs. Switching backend means dropping
//! one value and building the other; a backend is never mutated in place.
//!
//! Backends are built by a [`GraphicsDevice`], which checks what the current
//! graphics context can share.

use crate::error::GpuError;
use crate::frame::{NativeTexture, TextureFrame};
use crate::staging::StagingBuffer;

/// Which GPU API a backend shares textures through.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BackendKind {
    OpenGl,
    Metal,
}

/// What the current graphics context can share.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub metal: bool,
    pub opengl: bool,
}

impl Capabilities {
    /// Metal when available, OpenGL otherwise.
    pub fn preferred(&self) -> Option<BackendKind> {
        if self.metal {
            Some(BackendKind::Metal)
        } else if self.opengl {
            Some(BackendKind::OpenGl)
        } else {
            None
        }
    }
}

/// Server object of the OpenGL backend.
///
/// The shared surface is a separate allocation from any producer texture,
/// so frames reach it through a [`CopyAndNotify`] step.
pub trait GlServer: Send {
    /// Bind the shared surface as the draw framebuffer at the given size.
    fn bind_draw_frame(&mut self, width: u32, height: u32) -> Result<(), GpuError>;

    /// Unbind the shared surface and announce the new frame to consumers.
    fn unbind_and_publish(&mut self);

    fn stop(&mut self);
}

/// Copy-and-notify step of the OpenGL backend.
///
/// Built together with the [`GlServer`] and owned next to it.
pub trait CopyAndNotify: Send {
    /// Copy `source` into the server's shared surface and publish it.
    fn copy_and_notify(
        &mut self,
        server: &mut dyn GlServer,
        source: &TextureFrame,
    ) -> Result<(), GpuError>;

    /// Upload a staged raw frame into a texture owned by this step.
    fn stage(&mut self, staged: &StagingBuffer) -> Result<TextureFrame, GpuError>;
}

/// Producer texture attached for reading during a copy.
pub trait BlitSource {
    /// Attach the texture for reading. Nothing stays attached on error.
    fn attach(&mut self) -> Result<(), GpuError>;

    /// Copy the attached texture into the bound draw surface.
    fn blit(&mut self, width: u32, height: u32);

    fn detach(&mut self);
}

/// Attach `source`, draw it into the server's shared surface and publish.
///
/// `source` is detached on every exit, including a refused surface bind.
pub fn blit_and_publish(
    source: &mut dyn BlitSource,
    server: &mut dyn GlServer,
    width: u32,
    height: u32,
) -> Result<(), GpuError> {
    source.attach()?;
    if let Err(e) = server.bind_draw_frame(width, height) {
        source.detach();
        return Err(e);
    }
    source.blit(width, height);
    source.detach();
    server.unbind_and_publish();
    Ok(())
}

/// Server object of the Metal backend.
pub trait MetalServer: Send {
    /// Publish a producer texture without copying it on the CPU.
    fn publish_texture(&mut self, frame: &TextureFrame) -> Result<(), GpuError>;

    /// Upload a staged raw frame and publish it.
    fn publish_staged(&mut self, staged: &StagingBuffer) -> Result<(), GpuError>;

    fn stop(&mut self);
}

pub struct OpenGlBackend {
    server: Box<dyn GlServer>,
    publisher: Box<dyn CopyAndNotify>,
}

impl OpenGlBackend {
    pub fn new(server: Box<dyn GlServer>, publisher: Box<dyn CopyAndNotify>) -> Self {
        Self { server, publisher }
    }

    fn publish_texture(&mut self, frame: &TextureFrame) -> Result<(), GpuError> {
        match frame.texture {
            NativeTexture::Gl { .. } => self
                .publisher
                .copy_and_notify(self.server.as_mut(), frame),
            NativeTexture::Metal(_) => Err(GpuError::BackendMismatch {
                expected: BackendKind::OpenGl,
            }),
        }
    }

    fn publish_staged(&mut self, staged: &StagingBuffer) -> Result<(), GpuError> {
        let uploaded = self.publisher.stage(staged)?;
        self.publisher
            .copy_and_notify(self.server.as_mut(), &uploaded)
    }
}

pub struct MetalBackend {
    server: Box<dyn MetalServer>,
}

impl MetalBackend {
    pub fn new(server: Box<dyn MetalServer>) -> Self {
        Self { server }
    }

    fn publish_texture(&mut self, frame: &TextureFrame) -> Result<(), GpuError> {
        match frame.texture {
            NativeTexture::Metal(_) => self.server.publish_texture(frame),
            NativeTexture::Gl { .. } => Err(GpuError::BackendMismatch {
                expected: BackendKind::Metal,
            }),
        }
    }
}

/// A live backend server, tagged by GPU API.
pub enum Backend {
    OpenGl(OpenGlBackend),
    Metal(MetalBackend),
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Backend::OpenGl(_) => BackendKind::OpenGl,
            Backend::Metal(_) => BackendKind::Metal,
        }
    }

    /// The copy-and-notify step. Only the OpenGL backend has one.
    pub fn copy_and_notify(&self) -> Option<&dyn CopyAndNotify> {
        match self {
            Backend::OpenGl(gl) => Some(gl.publisher.as_ref()),
            Backend::Metal(_) => None,
        }
    }

    /// Publish a producer texture. The texture must belong to this backend.
    pub fn publish_texture(&mut self, frame: &TextureFrame) -> Result<(), GpuError> {
        match self {
            Backend::OpenGl(gl) => gl.publish_texture(frame),
            Backend::Metal(metal) => metal.publish_texture(frame),
        }
    }

    /// Upload and publish a staged raw frame.
    pub fn publish_staged(&mut self, staged: &StagingBuffer) -> Result<(), GpuError> {
        match self {
            Backend::OpenGl(gl) => gl.publish_staged(staged),
            Backend::Metal(metal) => metal.server.publish_staged(staged),
        }
    }

    /// Stop the server and release every GPU object the backend owns.
    pub fn shutdown(self) {
        match self {
            Backend::OpenGl(mut gl) => {
                gl.server.stop();
                drop(gl.publisher);
            }
            Backend::Metal(mut metal) => metal.server.stop(),
        }
    }
}

/// Factory for backends bound to the host's graphics context.
pub trait GraphicsDevice: Send + Sync {
    /// Probe which backends the current context supports.
    fn capabilities(&self) -> Result<Capabilities, GpuError>;

    /// Create a backend server advertised under `name`.
    fn create_backend(&self, kind: BackendKind, name: &str) -> Result<Backend, GpuError>;

    /// Run `f` with the device's graphics context current.
    fn with_context<R>(&self, f: impl FnOnce() -> R) -> R
    where
        Self: Sized,
    {
        f()
    }
}

//! Copy-and-notify step: blits a producer texture into the server surface.

use gl::types::{GLenum, GLint, GLuint};
use tracing::debug;

use super::state::SavedGlState;
use super::{check_error, clear_errors, context_current, ensure_loaded};
use crate::backend::{blit_and_publish, BackendKind, BlitSource, CopyAndNotify, GlServer};
use crate::error::GpuError;
use crate::frame::{NativeTexture, PixelFormat, TextureFrame};
use crate::staging::StagingBuffer;

fn upload_format(format: PixelFormat) -> GLenum {
    match format {
        PixelFormat::Bgra8 | PixelFormat::Bgrx8 => gl::BGRA,
        PixelFormat::Rgba8 => gl::RGBA,
    }
}

/// A producer texture on the read framebuffer.
struct ReadAttachment {
    fbo: GLuint,
    name: GLuint,
    target: GLenum,
}

impl BlitSource for ReadAttachment {
    fn attach(&mut self) -> Result<(), GpuError> {
        unsafe {
            gl::BindFramebuffer(gl::READ_FRAMEBUFFER, self.fbo);
            gl::FramebufferTexture2D(
                gl::READ_FRAMEBUFFER,
                gl::COLOR_ATTACHMENT0,
                self.target,
                self.name,
                0,
            );
            let status = gl::CheckFramebufferStatus(gl::READ_FRAMEBUFFER);
            if status != gl::FRAMEBUFFER_COMPLETE {
                self.detach();
                return Err(GpuError::Copy(format!(
                    "source texture {} not readable (status 0x{status:04X})",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Flips rows so the consumer sees the frame top-down. The server bind
    /// takes over the read binding, so it is restored first.
    fn blit(&mut self, width: u32, height: u32) {
        let (w, h) = (width as GLint, height as GLint);
        unsafe {
            gl::BindFramebuffer(gl::READ_FRAMEBUFFER, self.fbo);
            gl::ReadBuffer(gl::COLOR_ATTACHMENT0);
            gl::BlitFramebuffer(0, 0, w, h, 0, h, w, 0, gl::COLOR_BUFFER_BIT, gl::NEAREST);
        }
    }

    fn detach(&mut self) {
        unsafe {
            gl::BindFramebuffer(gl::READ_FRAMEBUFFER, self.fbo);
            gl::FramebufferTexture2D(
                gl::READ_FRAMEBUFFER,
                gl::COLOR_ATTACHMENT0,
                self.target,
                0,
                0,
            );
        }
    }
}

struct StagingTexture {
    name: GLuint,
    dimensions: (u32, u32),
    format: PixelFormat,
}

/// Owns the read framebuffer used for blits and the upload texture for
/// raw frames. Both belong to the context current at creation.
pub struct GlCopyPublisher {
    read_fbo: GLuint,
    staging: Option<StagingTexture>,
}

impl GlCopyPublisher {
    pub fn new() -> Result<Self, GpuError> {
        ensure_loaded();
        if !context_current() {
            return Err(GpuError::ContextLost);
        }

        clear_errors();
        let mut read_fbo: GLuint = 0;
        unsafe { gl::GenFramebuffers(1, &mut read_fbo) };
        check_error("framebuffer creation")?;

        Ok(Self {
            read_fbo,
            staging: None,
        })
    }

    unsafe fn ensure_staging(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<GLuint, GpuError> {
        if let Some(staging) = &self.staging {
            if staging.dimensions == (width, height) && staging.format == format {
                return Ok(staging.name);
            }
        }
        if let Some(old) = self.staging.take() {
            gl::DeleteTextures(1, &old.name);
        }

        let mut name: GLuint = 0;
        gl::GenTextures(1, &mut name);
        gl::BindTexture(gl::TEXTURE_2D, name);
        gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as GLint);
        gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as GLint);
        gl::TexImage2D(
            gl::TEXTURE_2D,
            0,
            gl::RGBA8 as GLint,
            width as GLint,
            height as GLint,
            0,
            upload_format(format),
            gl::UNSIGNED_INT_8_8_8_8_REV,
            std::ptr::null(),
        );
        if let Err(e) = check_error("staging texture allocation") {
            gl::DeleteTextures(1, &name);
            return Err(e);
        }

        debug!("Allocated {width}x{height} staging texture");
        self.staging = Some(StagingTexture {
            name,
            dimensions: (width, height),
            format,
        });
        Ok(name)
    }
}

impl CopyAndNotify for GlCopyPublisher {
    fn copy_and_notify(
        &mut self,
        server: &mut dyn GlServer,
        source: &TextureFrame,
    ) -> Result<(), GpuError> {
        let NativeTexture::Gl { name, target } = source.texture else {
            return Err(GpuError::BackendMismatch {
                expected: BackendKind::OpenGl,
            });
        };
        if !context_current() {
            return Err(GpuError::ContextLost);
        }

        clear_errors();
        unsafe {
            let saved = SavedGlState::save();
            let mut attachment = ReadAttachment {
                fbo: self.read_fbo,
                name,
                target,
            };
            let result =
                blit_and_publish(&mut attachment, server, source.width, source.height)
                    .and_then(|()| check_error("frame blit"));
            saved.restore();
            result
        }
    }

    fn stage(&mut self, staged: &StagingBuffer) -> Result<TextureFrame, GpuError> {
        let format = staged
            .format()
            .ok_or_else(|| GpuError::Copy("nothing staged".to_owned()))?;
        if !context_current() {
            return Err(GpuError::ContextLost);
        }
        let (width, height) = staged.dimensions();

        clear_errors();
        let name = unsafe {
            let saved = SavedGlState::save();
            let result = self.ensure_staging(width, height, format).and_then(|name| {
                gl::BindBuffer(gl::PIXEL_UNPACK_BUFFER, 0);
                gl::PixelStorei(gl::UNPACK_ROW_LENGTH, 0);
                gl::PixelStorei(gl::UNPACK_ALIGNMENT, 4);
                gl::BindTexture(gl::TEXTURE_2D, name);
                gl::TexSubImage2D(
                    gl::TEXTURE_2D,
                    0,
                    0,
                    0,
                    width as GLint,
                    height as GLint,
                    upload_format(format),
                    gl::UNSIGNED_INT_8_8_8_8_REV,
                    staged.as_bytes().as_ptr().cast(),
                );
                check_error("staging upload").map(|()| name)
            });
            saved.restore();
            result?
        };

        Ok(TextureFrame::new(
            NativeTexture::Gl {
                name,
                target: gl::TEXTURE_2D,
            },
            width,
            height,
            format,
        ))
    }
}

impl Drop for GlCopyPublisher {
    fn drop(&mut self) {
        // Objects of a lost context are already gone.
        if !context_current() {
            return;
        }
        unsafe {
            if let Some(staging) = self.staging.take() {
                gl::DeleteTextures(1, &staging.name);
            }
            if self.read_fbo != 0 {
                gl::DeleteFramebuffers(1, &self.read_fbo);
            }
        }
    }
}

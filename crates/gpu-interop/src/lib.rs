//! Texture sharing backends for publishing frames to Syphon.
//!
//! A [`Backend`] is either OpenGL or Metal, never both. Platform-neutral
//! pieces (frame descriptors, the stride-respecting [`StagingBuffer`], the
//! [`GraphicsDevice`] seam) build everywhere; the Syphon servers themselves
//! exist only on macOS.

pub mod backend;
pub mod error;
pub mod frame;
pub mod staging;

pub use backend::{
    blit_and_publish, Backend, BackendKind, BlitSource, Capabilities, CopyAndNotify, GlServer,
    GraphicsDevice, MetalBackend, MetalServer, OpenGlBackend,
};
pub use error::{FrameError, GpuError};
pub use frame::{NativeTexture, PixelFormat, RawFrame, TextureFrame, GL_TEXTURE_2D};
pub use staging::StagingBuffer;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Platform-specific implementations.

#[cfg(target_os = "macos")]
pub mod syphon;

#[cfg(target_os = "macos")]
pub mod metal;

#[cfg(target_os = "macos")]
pub mod gl;

//! Error types for texture sharing.

use thiserror::Error;

use crate::backend::BackendKind;

/// Failures raised by a backend server or its copy step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GpuError {
    #[error("graphics device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("texture sharing server could not be created: {0}")]
    ServerCreation(String),
    #[error("GPU allocation failed: {0}")]
    Allocation(String),
    #[error("GPU copy failed: {0}")]
    Copy(String),
    #[error("GPU context lost")]
    ContextLost,
    #[error("frame does not belong to the {expected:?} backend")]
    BackendMismatch { expected: BackendKind },
    #[error("texture sharing is not supported on this platform")]
    UnsupportedPlatform,
}

impl GpuError {
    /// Whether the error leaves the backend unusable until it is recreated.
    pub fn is_context_lost(&self) -> bool {
        matches!(self, GpuError::ContextLost)
    }
}

/// Invalid raw frame geometry or format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame has zero size ({width}x{height})")]
    ZeroDimensions { width: u32, height: u32 },
    #[error("row stride {line_size} is smaller than a row of {row_bytes} bytes")]
    StrideTooSmall { line_size: u32, row_bytes: usize },
    #[error("buffer holds {len} bytes, frame needs {required}")]
    BufferTooSmall { len: usize, required: usize },
    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(String),
}

//! Transient frame descriptors handed to a backend for one publish call.
//!
//! Neither descriptor owns pixels: a [`TextureFrame`] names a texture owned
//! by the producer, and a [`RawFrame`] borrows a CPU buffer. Backends must
//! be done with both by the time the publish call returns.

use std::ffi::c_void;
use std::ptr::NonNull;

use crate::backend::BackendKind;
use crate::error::FrameError;

/// `GL_TEXTURE_2D`.
pub const GL_TEXTURE_2D: u32 = 0x0DE1;

/// 8-bit-per-channel pixel layouts the bridge can hand to a backend.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PixelFormat {
    Bgra8,
    Bgrx8,
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        4
    }
}

/// Backend-native handle of a producer texture.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NativeTexture {
    /// OpenGL texture name and target.
    Gl { name: u32, target: u32 },
    /// `id<MTLTexture>`.
    Metal(NonNull<c_void>),
}

impl NativeTexture {
    pub fn kind(&self) -> BackendKind {
        match self {
            NativeTexture::Gl { .. } => BackendKind::OpenGl,
            NativeTexture::Metal(_) => BackendKind::Metal,
        }
    }
}

/// A GPU-side frame: a producer texture plus its size and format.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TextureFrame {
    pub texture: NativeTexture,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl TextureFrame {
    pub fn new(texture: NativeTexture, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            texture,
            width,
            height,
            format,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A CPU-side frame whose rows are `line_size` bytes apart.
///
/// `line_size` may exceed `width * bytes_per_pixel`; the padding at the end
/// of each row is never part of the visible image.
#[derive(Debug, Copy, Clone)]
pub struct RawFrame<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    line_size: u32,
    format: PixelFormat,
}

impl<'a> RawFrame<'a> {
    /// Validate the geometry of a borrowed buffer.
    ///
    /// The last row only needs its visible bytes, so a buffer of
    /// `line_size * (height - 1) + width * bpp` bytes is enough.
    pub fn new(
        data: &'a [u8],
        width: u32,
        height: u32,
        line_size: u32,
        format: PixelFormat,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::ZeroDimensions { width, height });
        }

        let row_bytes = width as usize * format.bytes_per_pixel();
        if (line_size as usize) < row_bytes {
            return Err(FrameError::StrideTooSmall {
                line_size,
                row_bytes,
            });
        }

        let required = line_size as usize * (height as usize - 1) + row_bytes;
        if data.len() < required {
            return Err(FrameError::BufferTooSmall {
                len: data.len(),
                required,
            });
        }

        Ok(Self {
            data,
            width,
            height,
            line_size,
            format,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn line_size(&self) -> u32 {
        self.line_size
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Bytes of one visible row.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Visible bytes of each row, top to bottom, without stride padding.
    pub fn rows(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        let stride = self.line_size as usize;
        let row_bytes = self.row_bytes();
        let data = self.data;
        (0..self.height as usize).map(move |y| &data[y * stride..y * stride + row_bytes])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_sized_frames() {
        let err = RawFrame::new(&[], 0, 4, 16, PixelFormat::Bgra8).unwrap_err();
        assert_eq!(err, FrameError::ZeroDimensions { width: 0, height: 4 });
    }

    #[test]
    fn rejects_stride_narrower_than_a_row() {
        let data = [0u8; 64];
        let err = RawFrame::new(&data, 4, 2, 12, PixelFormat::Bgra8).unwrap_err();
        assert_eq!(
            err,
            FrameError::StrideTooSmall {
                line_size: 12,
                row_bytes: 16
            }
        );
    }

    #[test]
    fn last_row_may_omit_padding() {
        // 3 rows, stride 24, visible 16: 24 * 2 + 16 = 64.
        let data = [0u8; 64];
        assert!(RawFrame::new(&data, 4, 3, 24, PixelFormat::Rgba8).is_ok());

        let err = RawFrame::new(&data[..63], 4, 3, 24, PixelFormat::Rgba8).unwrap_err();
        assert_eq!(err, FrameError::BufferTooSmall { len: 63, required: 64 });
    }

    #[test]
    fn rows_skip_stride_padding() {
        let mut data = vec![0xAAu8; 2 * 12];
        data[..8].copy_from_slice(&[1; 8]);
        data[12..20].copy_from_slice(&[2; 8]);

        let frame = RawFrame::new(&data, 2, 2, 12, PixelFormat::Bgra8).unwrap();
        let rows: Vec<&[u8]> = frame.rows().collect();
        assert_eq!(rows, vec![&[1u8; 8][..], &[2u8; 8][..]]);
    }

    #[test]
    fn native_texture_reports_its_backend() {
        let gl = NativeTexture::Gl {
            name: 3,
            target: GL_TEXTURE_2D,
        };
        assert_eq!(gl.kind(), BackendKind::OpenGl);
        assert_eq!(NativeTexture::Metal(NonNull::dangling()).kind(), BackendKind::Metal);
    }
}

//! CPU staging copy for raw frames.

use crate::frame::{PixelFormat, RawFrame};

/// Tightly packed copy of the visible region of a [`RawFrame`].
///
/// The allocation is kept between frames and only grows when the frame
/// size does, so steady-state raw publishing does not allocate.
#[derive(Debug, Default)]
pub struct StagingBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: Option<PixelFormat>,
}

impl StagingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `frame` row by row, dropping the stride padding.
    pub fn pack(&mut self, frame: &RawFrame<'_>) {
        let row_bytes = frame.row_bytes();
        let len = row_bytes * frame.height() as usize;
        self.data.resize(len, 0);

        for (dst, src) in self.data.chunks_exact_mut(row_bytes).zip(frame.rows()) {
            dst.copy_from_slice(src);
        }

        self.width = frame.width();
        self.height = frame.height();
        self.format = Some(frame.format());
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> Option<PixelFormat> {
        self.format
    }

    pub fn bytes_per_row(&self) -> usize {
        self.format
            .map_or(0, |f| self.width as usize * f.bytes_per_pixel())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

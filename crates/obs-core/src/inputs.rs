//! Frames the host hands to the plugin.

use std::ffi::c_void;
use std::ptr::NonNull;

use num_traits::FromPrimitive;

use crate::ffi::*;

/// A host GPU texture, described by its backend-native object and metadata.
#[derive(Debug, Copy, Clone)]
pub struct HostTexture {
    /// Backend-native object (`GLuint*` on OpenGL, `id<MTLTexture>` on Metal).
    pub native: NonNull<c_void>,
    pub width: u32,
    pub height: u32,
    pub format: Option<GsColorFormat>,
}

impl HostTexture {
    /// Describe a host texture from its native object and raw metadata.
    ///
    /// Returns `None` when the host has no native object for it.
    pub fn new(native: *mut c_void, width: u32, height: u32, raw_format: u32) -> Option<Self> {
        Some(Self {
            native: NonNull::new(native)?,
            width,
            height,
            format: GsColorFormat::from_u32(raw_format),
        })
    }
}

/// First plane of a raw video frame, borrowed for the duration of a callback.
#[derive(Debug, Copy, Clone)]
pub struct RawVideo<'a> {
    pub data: &'a [u8],
    pub linesize: u32,
    pub width: u32,
    pub height: u32,
}

impl<'a> RawVideo<'a> {
    /// View the first plane of `frame` as a byte slice of `linesize * height`.
    ///
    /// Returns `None` for frames without a first plane or with a zero stride.
    ///
    /// # Safety
    ///
    /// `frame.data[0]` must point to at least `linesize[0] * height` readable
    /// bytes that stay valid for `'a`.
    pub unsafe fn from_video_data(frame: &'a video_data, width: u32, height: u32) -> Option<Self> {
        let plane = frame.data[0];
        let linesize = frame.linesize[0];
        if plane.is_null() || linesize == 0 {
            return None;
        }

        let len = linesize as usize * height as usize;
        Some(Self {
            data: unsafe { std::slice::from_raw_parts(plane as *const u8, len) },
            linesize,
            width,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_texture_requires_native_object() {
        assert!(HostTexture::new(std::ptr::null_mut(), 16, 16, 5).is_none());

        let mut obj = 7u32;
        let tex = HostTexture::new(&mut obj as *mut u32 as *mut c_void, 16, 9, 5).unwrap();
        assert_eq!(tex.format, Some(GsColorFormat::Bgra));
        assert_eq!((tex.width, tex.height), (16, 9));
    }

    #[test]
    fn raw_video_spans_stride_times_height() {
        let mut pixels = vec![0u8; 32 * 4];
        let mut frame = video_data {
            data: [std::ptr::null_mut(); MAX_AV_PLANES],
            linesize: [0; MAX_AV_PLANES],
            timestamp: 0,
        };
        frame.data[0] = pixels.as_mut_ptr();
        frame.linesize[0] = 32;

        let raw = unsafe { RawVideo::from_video_data(&frame, 6, 4) }.unwrap();
        assert_eq!(raw.data.len(), 128);
        assert_eq!(raw.linesize, 32);
    }

    #[test]
    fn raw_video_rejects_missing_plane() {
        let frame = video_data {
            data: [std::ptr::null_mut(); MAX_AV_PLANES],
            linesize: [16; MAX_AV_PLANES],
            timestamp: 0,
        };
        assert!(unsafe { RawVideo::from_video_data(&frame, 4, 4) }.is_none());
    }
}

//! Hardcoded libobs constants, C-repr structs and function declarations.
//!
//! Only the slice of the libobs ABI the bridge touches is declared here.
//! Constants and layouts are sourced from the libobs headers (`obs.h`,
//! `obs-output.h`, `graphics/graphics.h`, `media-io/video-io.h`).

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(dead_code)]

use std::ffi::{c_char, c_int, c_void};

use num_derive::{FromPrimitive, ToPrimitive};

// =====================================================================
// Logging
// =====================================================================
pub const LOG_ERROR: c_int = 100;
pub const LOG_WARNING: c_int = 200;
pub const LOG_INFO: c_int = 300;
pub const LOG_DEBUG: c_int = 400;

// =====================================================================
// Module / API versions
// =====================================================================
pub const LIBOBS_API_MAJOR_VER: u32 = 30;
pub const LIBOBS_API_MINOR_VER: u32 = 0;
pub const LIBOBS_API_PATCH_VER: u32 = 0;

/// Packed API version, as produced by `MAKE_SEMANTIC_VERSION`.
pub const fn make_semantic_version(major: u32, minor: u32, patch: u32) -> u32 {
    (major << 24) | (minor << 16) | patch
}

pub const LIBOBS_API_VER: u32 = make_semantic_version(
    LIBOBS_API_MAJOR_VER,
    LIBOBS_API_MINOR_VER,
    LIBOBS_API_PATCH_VER,
);

// =====================================================================
// Outputs
// =====================================================================
pub const MAX_AV_PLANES: usize = 8;

pub const OBS_OUTPUT_VIDEO: u32 = 1 << 0;
pub const OBS_OUTPUT_AUDIO: u32 = 1 << 1;
pub const OBS_OUTPUT_AV: u32 = OBS_OUTPUT_VIDEO | OBS_OUTPUT_AUDIO;
pub const OBS_OUTPUT_ENCODED: u32 = 1 << 2;

// =====================================================================
// Enums
// =====================================================================

/// `enum gs_color_format`.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum GsColorFormat {
    Unknown = 0,
    A8 = 1,
    R8 = 2,
    Rgba = 3,
    Bgrx = 4,
    Bgra = 5,
    R10G10B10A2 = 6,
    Rgba16 = 7,
    R16 = 8,
    Rgba16F = 9,
    Rgba32F = 10,
    Rg16F = 11,
    Rg32F = 12,
    R16F = 13,
    R32F = 14,
    Dxt1 = 15,
    Dxt3 = 16,
    Dxt5 = 17,
    R8G8 = 18,
    RgbaUnorm = 19,
    BgrxUnorm = 20,
    BgraUnorm = 21,
    Rg16 = 22,
}

/// `enum video_format`.
#[repr(u32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum VideoFormat {
    None = 0,
    I420 = 1,
    Nv12 = 2,
    Yvyu = 3,
    Yuy2 = 4,
    Uyvy = 5,
    Rgba = 6,
    Bgra = 7,
    Bgrx = 8,
    Y800 = 9,
    I444 = 10,
    Bgr3 = 11,
    I422 = 12,
    I40A = 13,
    I42A = 14,
    Yuva = 15,
    Ayuv = 16,
}

/// Graphics device types returned by `gs_get_device_type`.
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum GsDeviceType {
    OpenGl = 1,
    Direct3D11 = 2,
    Metal = 3,
}

// =====================================================================
// Opaque host types
// =====================================================================

#[repr(C)]
pub struct obs_module_t {
    _private: [u8; 0],
}

#[repr(C)]
pub struct obs_output_t {
    _private: [u8; 0],
}

#[repr(C)]
pub struct obs_data_t {
    _private: [u8; 0],
}

#[repr(C)]
pub struct obs_properties_t {
    _private: [u8; 0],
}

#[repr(C)]
pub struct gs_texture_t {
    _private: [u8; 0],
}

#[repr(C)]
pub struct audio_data {
    _private: [u8; 0],
}

#[repr(C)]
pub struct encoder_packet {
    _private: [u8; 0],
}

// =====================================================================
// C-repr structs matching libobs
// =====================================================================

/// Raw video frame handed to an output's `raw_video` callback.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct video_data {
    pub data: [*mut u8; MAX_AV_PLANES],
    pub linesize: [u32; MAX_AV_PLANES],
    pub timestamp: u64,
}

/// Conversion request passed to `obs_output_set_video_conversion`.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct video_scale_info {
    pub format: u32,
    pub width: u32,
    pub height: u32,
    pub range: u32,
    pub colorspace: u32,
}

/// `struct obs_output_info`.
#[repr(C)]
pub struct obs_output_info {
    pub id: *const c_char,
    pub flags: u32,
    pub get_name: Option<unsafe extern "C" fn(type_data: *mut c_void) -> *const c_char>,
    pub create: Option<
        unsafe extern "C" fn(settings: *mut obs_data_t, output: *mut obs_output_t) -> *mut c_void,
    >,
    pub destroy: Option<unsafe extern "C" fn(data: *mut c_void)>,
    pub start: Option<unsafe extern "C" fn(data: *mut c_void) -> bool>,
    pub stop: Option<unsafe extern "C" fn(data: *mut c_void, ts: u64)>,
    pub raw_video: Option<unsafe extern "C" fn(data: *mut c_void, frame: *mut video_data)>,
    pub raw_audio: Option<unsafe extern "C" fn(data: *mut c_void, frames: *mut audio_data)>,
    pub encoded_packet:
        Option<unsafe extern "C" fn(data: *mut c_void, packet: *mut encoder_packet)>,
    pub update: Option<unsafe extern "C" fn(data: *mut c_void, settings: *mut obs_data_t)>,
    pub get_defaults: Option<unsafe extern "C" fn(settings: *mut obs_data_t)>,
    pub get_properties: Option<unsafe extern "C" fn(data: *mut c_void) -> *mut obs_properties_t>,
    pub unused1: Option<unsafe extern "C" fn(data: *mut c_void)>,
    pub get_total_bytes: Option<unsafe extern "C" fn(data: *mut c_void) -> u64>,
    pub get_dropped_frames: Option<unsafe extern "C" fn(data: *mut c_void) -> c_int>,
    pub type_data: *mut c_void,
    pub free_type_data: Option<unsafe extern "C" fn(type_data: *mut c_void)>,
    pub get_congestion: Option<unsafe extern "C" fn(data: *mut c_void) -> f32>,
    pub get_connect_time_ms: Option<unsafe extern "C" fn(data: *mut c_void) -> c_int>,
    pub encoded_video_codecs: *const c_char,
    pub encoded_audio_codecs: *const c_char,
    pub raw_audio2:
        Option<unsafe extern "C" fn(data: *mut c_void, idx: usize, frames: *mut audio_data)>,
    pub protocols: *const c_char,
}

// SAFETY: the struct only holds pointers to 'static strings and function
// pointers; libobs copies it on registration.
unsafe impl Sync for obs_output_info {}

/// Runs on the graphics thread once the main view has been drawn.
pub type obs_main_rendered_callback = unsafe extern "C" fn(param: *mut c_void);

// =====================================================================
// libobs functions
// =====================================================================

#[cfg(target_os = "macos")]
extern "C" {
    pub fn blog(log_level: c_int, format: *const c_char, ...);

    pub fn obs_register_output_s(info: *const obs_output_info, size: usize);
    pub fn obs_add_main_rendered_callback(
        rendered: obs_main_rendered_callback,
        param: *mut c_void,
    );
    pub fn obs_remove_main_rendered_callback(
        rendered: obs_main_rendered_callback,
        param: *mut c_void,
    );
    pub fn obs_get_main_texture() -> *mut gs_texture_t;

    pub fn obs_enter_graphics();
    pub fn obs_leave_graphics();

    pub fn gs_get_device_type() -> c_int;
    pub fn gs_get_device_obj() -> *mut c_void;
    pub fn gs_texture_get_obj(tex: *mut gs_texture_t) -> *mut c_void;
    pub fn gs_texture_get_width(tex: *const gs_texture_t) -> u32;
    pub fn gs_texture_get_height(tex: *const gs_texture_t) -> u32;
    pub fn gs_texture_get_color_format(tex: *const gs_texture_t) -> u32;

    pub fn obs_output_get_width(output: *const obs_output_t) -> u32;
    pub fn obs_output_get_height(output: *const obs_output_t) -> u32;
    pub fn obs_output_set_video_conversion(
        output: *mut obs_output_t,
        conversion: *const video_scale_info,
    );
    pub fn obs_output_can_begin_data_capture(output: *const obs_output_t, flags: u32) -> bool;
    pub fn obs_output_begin_data_capture(output: *mut obs_output_t, flags: u32) -> bool;
    pub fn obs_output_end_data_capture(output: *mut obs_output_t);
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn api_version_packs_major_minor_patch() {
        assert_eq!(make_semantic_version(30, 1, 2), 0x1E01_0002);
        assert_eq!(LIBOBS_API_VER >> 24, LIBOBS_API_MAJOR_VER);
    }

    #[test]
    fn host_enums_decode_from_raw_values() {
        assert_eq!(GsColorFormat::from_u32(5), Some(GsColorFormat::Bgra));
        assert_eq!(VideoFormat::from_u32(2), Some(VideoFormat::Nv12));
        assert_eq!(GsDeviceType::from_i32(3), Some(GsDeviceType::Metal));
        assert_eq!(GsDeviceType::from_i32(7), None);
    }
}

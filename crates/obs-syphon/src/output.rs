//! Host integration points feeding the capture driver.
//!
//! Two hooks are registered: a raw-video output type (`syphon_output`) whose
//! frames take the CPU path, and a main rendered callback that hands the
//! composited texture to the GPU path once the scene has been drawn.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

static REGISTERED: AtomicBool = AtomicBool::new(false);

/// Identifier of the registered output type.
pub const OUTPUT_ID: &std::ffi::CStr = c"syphon_output";

/// Register the output type and the rendered hook. Idempotent.
///
/// Returns whether the hooks are in place; always `false` off macOS.
pub fn register_syphon_output() -> bool {
    if REGISTERED.swap(true, Ordering::AcqRel) {
        debug!("Syphon output already registered");
        return true;
    }

    if !imp::register() {
        REGISTERED.store(false, Ordering::Release);
        return false;
    }
    info!("Registered Syphon output");
    true
}

/// Remove the rendered hook. The output type stays registered with the host,
/// which has no call to unregister it.
pub fn unregister_syphon_output() {
    if REGISTERED.swap(false, Ordering::AcqRel) {
        imp::unregister();
        debug!("Removed Syphon rendered hook");
    }
}

#[cfg(target_os = "macos")]
mod imp {
    use std::ffi::{c_char, c_void};
    use std::sync::atomic::{AtomicBool, Ordering};

    use obs_core::ffi::*;
    use obs_core::{HostTexture, RawVideo};
    use tracing::warn;

    use super::OUTPUT_ID;
    use crate::capture::{driver, CapturedFrame};
    use crate::device::GraphicsGuard;
    use crate::main_server;
    use crate::module::ffi_guard;

    /// `obs_register_output_s` is only called once per process.
    static OUTPUT_TYPE_REGISTERED: AtomicBool = AtomicBool::new(false);

    struct SyphonOutput {
        output: *mut obs_output_t,
    }

    unsafe extern "C" fn get_name(_type_data: *mut c_void) -> *const c_char {
        c"Syphon Output".as_ptr()
    }

    unsafe extern "C" fn create(
        _settings: *mut obs_data_t,
        output: *mut obs_output_t,
    ) -> *mut c_void {
        Box::into_raw(Box::new(SyphonOutput { output })).cast()
    }

    unsafe extern "C" fn destroy(data: *mut c_void) {
        if !data.is_null() {
            drop(unsafe { Box::from_raw(data.cast::<SyphonOutput>()) });
        }
    }

    unsafe extern "C" fn start(data: *mut c_void) -> bool {
        let Some(out) = (unsafe { data.cast::<SyphonOutput>().as_ref() }) else {
            return false;
        };
        let output = out.output;
        ffi_guard(false, move || unsafe {
            if !obs_output_can_begin_data_capture(output, 0) {
                warn!("Syphon output cannot begin capture");
                return false;
            }
            let conversion = video_scale_info {
                format: VideoFormat::Bgra as u32,
                width: obs_output_get_width(output),
                height: obs_output_get_height(output),
                range: 0,
                colorspace: 0,
            };
            obs_output_set_video_conversion(output, &conversion);
            obs_output_begin_data_capture(output, 0)
        })
    }

    unsafe extern "C" fn stop(data: *mut c_void, _ts: u64) {
        if let Some(out) = unsafe { data.cast::<SyphonOutput>().as_ref() } {
            unsafe { obs_output_end_data_capture(out.output) };
        }
    }

    unsafe extern "C" fn raw_video(data: *mut c_void, frame: *mut video_data) {
        let out = unsafe { data.cast::<SyphonOutput>().as_ref() };
        let frame = unsafe { frame.as_ref() };
        let (Some(out), Some(frame)) = (out, frame) else {
            return;
        };
        let output = out.output;

        ffi_guard((), move || {
            let width = unsafe { obs_output_get_width(output) };
            let height = unsafe { obs_output_get_height(output) };
            // SAFETY: the first plane holds `linesize * height` bytes for the
            // duration of the callback.
            if let Some(video) = unsafe { RawVideo::from_video_data(frame, width, height) } {
                let frame = CapturedFrame::raw(video, Some(VideoFormat::Bgra));
                driver().tick(main_server::global(), frame);
            }
        });
    }

    /// Runs after the main view is drawn, so the main texture holds the
    /// composited program frame. Graphics is entered here since the host
    /// has left its context by then.
    unsafe extern "C" fn main_rendered(_param: *mut c_void) {
        ffi_guard((), || {
            let _graphics = GraphicsGuard::enter();
            let texture = unsafe {
                let tex = obs_get_main_texture();
                if tex.is_null() {
                    None
                } else {
                    HostTexture::new(
                        gs_texture_get_obj(tex),
                        gs_texture_get_width(tex),
                        gs_texture_get_height(tex),
                        gs_texture_get_color_format(tex),
                    )
                }
            };
            driver().main_rendered(main_server::global(), texture);
        });
    }

    static OUTPUT_INFO: obs_output_info = obs_output_info {
        id: OUTPUT_ID.as_ptr(),
        flags: OBS_OUTPUT_VIDEO,
        get_name: Some(get_name),
        create: Some(create),
        destroy: Some(destroy),
        start: Some(start),
        stop: Some(stop),
        raw_video: Some(raw_video),
        raw_audio: None,
        encoded_packet: None,
        update: None,
        get_defaults: None,
        get_properties: None,
        unused1: None,
        get_total_bytes: None,
        get_dropped_frames: None,
        type_data: std::ptr::null_mut(),
        free_type_data: None,
        get_congestion: None,
        get_connect_time_ms: None,
        encoded_video_codecs: std::ptr::null(),
        encoded_audio_codecs: std::ptr::null(),
        raw_audio2: None,
        protocols: std::ptr::null(),
    };

    pub(super) fn register() -> bool {
        if !OUTPUT_TYPE_REGISTERED.swap(true, Ordering::AcqRel) {
            unsafe {
                obs_register_output_s(&OUTPUT_INFO, std::mem::size_of::<obs_output_info>());
            }
        }
        unsafe { obs_add_main_rendered_callback(main_rendered, std::ptr::null_mut()) };
        true
    }

    pub(super) fn unregister() {
        unsafe { obs_remove_main_rendered_callback(main_rendered, std::ptr::null_mut()) };
    }
}

#[cfg(not(target_os = "macos"))]
mod imp {
    use tracing::error;

    pub(super) fn register() -> bool {
        error!("Syphon output is only available on macOS");
        false
    }

    pub(super) fn unregister() {}
}

#[cfg(all(test, not(target_os = "macos")))]
mod tests {
    use super::*;

    #[test]
    fn registration_fails_off_macos() {
        assert!(!register_syphon_output());
        assert!(!REGISTERED.load(Ordering::Acquire));
        unregister_syphon_output();
    }
}

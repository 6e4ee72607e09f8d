//! Entry points libobs resolves when it loads the plugin.

use std::ffi::c_char;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

use anyhow::bail;
use obs_core::config::DEFAULT_SERVER_NAME;
use obs_core::ffi::{obs_module_t, LIBOBS_API_VER};
use obs_core::logging;
use tracing::{error, info, warn};

use crate::output::{register_syphon_output, unregister_syphon_output};
use crate::{start_main_server, stop_main_server};

static MODULE: AtomicPtr<obs_module_t> = AtomicPtr::new(ptr::null_mut());

/// Run `f`, turning a panic into `fallback` so it never unwinds into the host.
pub(crate) fn ffi_guard<R>(fallback: R, f: impl FnOnce() -> R) -> R {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(_) => {
            error!("Panic caught at the plugin boundary");
            fallback
        }
    }
}

/// Register the capture hooks and auto-start the main server.
///
/// A server that fails to start is logged but does not fail the load.
pub fn load() -> anyhow::Result<()> {
    logging::init();

    if !cfg!(target_os = "macos") {
        bail!("Plugin is only supported on macOS");
    }
    if !register_syphon_output() {
        bail!("Syphon output could not be registered");
    }

    if start_main_server(DEFAULT_SERVER_NAME) {
        info!("Auto-started main server");
    } else {
        warn!("Main server '{DEFAULT_SERVER_NAME}' did not start");
    }

    info!(
        "Plugin loaded successfully (version {})",
        env!("CARGO_PKG_VERSION")
    );
    Ok(())
}

pub fn unload() {
    unregister_syphon_output();
    stop_main_server();
    info!("Plugin unloaded");
}

#[no_mangle]
pub extern "C" fn obs_module_set_pointer(module: *mut obs_module_t) {
    MODULE.store(module, Ordering::Release);
}

#[no_mangle]
pub extern "C" fn obs_current_module() -> *mut obs_module_t {
    MODULE.load(Ordering::Acquire)
}

#[no_mangle]
pub extern "C" fn obs_module_ver() -> u32 {
    LIBOBS_API_VER
}

#[no_mangle]
pub extern "C" fn obs_module_name() -> *const c_char {
    c"OBS Syphon".as_ptr()
}

#[no_mangle]
pub extern "C" fn obs_module_description() -> *const c_char {
    c"Publishes the OBS program output to Syphon clients".as_ptr()
}

#[no_mangle]
pub extern "C" fn obs_module_load() -> bool {
    ffi_guard(false, || match load() {
        Ok(()) => true,
        Err(e) => {
            error!("{e:#}");
            false
        }
    })
}

#[no_mangle]
pub extern "C" fn obs_module_unload() {
    ffi_guard((), unload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_pointer_round_trips() {
        let mut fake = 0u8;
        let module = &mut fake as *mut u8 as *mut obs_module_t;
        obs_module_set_pointer(module);
        assert_eq!(obs_current_module(), module);
        obs_module_set_pointer(ptr::null_mut());
    }

    #[test]
    fn panics_do_not_cross_the_boundary() {
        let value = ffi_guard(7, || -> i32 { panic!("boom") });
        assert_eq!(value, 7);
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn load_fails_off_macos() {
        assert!(!obs_module_load());
        obs_module_unload();
        assert!(!crate::is_main_server_running());
    }
}

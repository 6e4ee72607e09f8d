//! Runtime lookup of the Syphon server classes.
//!
//! The framework is not linked at build time: the host may already carry
//! its own copy, and linking a second one produces duplicate class symbols.
//! Classes are looked up in the running process first, and the framework is
//! loaded with `libloading` only when they are missing.

use std::ffi::CStr;

use libloading::Library;
use objc2::runtime::AnyClass;
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

pub const METAL_SERVER_CLASS: &CStr = c"SyphonMetalServer";
pub const OPENGL_SERVER_CLASS: &CStr = c"SyphonOpenGLServer";

/// Environment variable naming the framework binary to load.
pub const FRAMEWORK_PATH_ENV: &str = "SYPHON_FRAMEWORK_PATH";

const FRAMEWORK_CANDIDATES: &[&str] = &[
    "@loader_path/../Frameworks/Syphon.framework/Syphon",
    "/Library/Frameworks/Syphon.framework/Syphon",
    "/Applications/OBS.app/Contents/Frameworks/Syphon.framework/Syphon",
];

/// Kept for the process lifetime; unloading would invalidate the classes.
static FRAMEWORK: OnceCell<Option<Library>> = OnceCell::new();

fn load_framework() -> Option<&'static Library> {
    FRAMEWORK
        .get_or_init(|| {
            let from_env = std::env::var(FRAMEWORK_PATH_ENV).ok();
            let candidates = from_env
                .iter()
                .map(String::as_str)
                .chain(FRAMEWORK_CANDIDATES.iter().copied());

            for path in candidates {
                // SAFETY: loading the framework only runs its Objective-C
                // class registration.
                match unsafe { Library::new(path) } {
                    Ok(library) => {
                        debug!("Loaded Syphon framework from {path}");
                        return Some(library);
                    }
                    Err(e) => debug!("Syphon framework not loadable from {path}: {e}"),
                }
            }

            warn!("Syphon framework could not be loaded from any known location");
            None
        })
        .as_ref()
}

/// Look up a Syphon class, loading the framework on first miss.
pub fn server_class(name: &CStr) -> Option<&'static AnyClass> {
    AnyClass::get(name).or_else(|| {
        load_framework()?;
        AnyClass::get(name)
    })
}

pub fn is_available(name: &CStr) -> bool {
    server_class(name).is_some()
}

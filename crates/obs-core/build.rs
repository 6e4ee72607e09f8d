//! Link against libobs and the system frameworks on macOS.
//!
//! Every crate using the host declarations depends on this one, so the
//! link directives propagate. Syphon is absent: it is loaded at runtime so
//! the plugin does not clash with a copy the host already carries.

use std::env;

const DEFAULT_OBS_FRAMEWORK_DIR: &str = "/Applications/OBS.app/Contents/Frameworks";

fn main() {
    println!("cargo:rerun-if-env-changed=OBS_FRAMEWORK_DIR");

    if env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("macos") {
        return;
    }

    let obs_dir =
        env::var("OBS_FRAMEWORK_DIR").unwrap_or_else(|_| DEFAULT_OBS_FRAMEWORK_DIR.to_owned());
    println!("cargo:rustc-link-search=framework={obs_dir}");
    println!("cargo:rustc-link-lib=framework=libobs");

    for framework in ["OpenGL", "Metal", "Foundation"] {
        println!("cargo:rustc-link-lib=framework={framework}");
    }
}

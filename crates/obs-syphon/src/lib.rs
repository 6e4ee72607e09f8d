//! OBS plugin publishing the program output to Syphon.
//!
//! - [`server`] owns one texture sharing server and its publish paths.
//! - [`main_server`] is the process-wide server driven by load and unload.
//! - [`capture`] decides, per host tick, which publish path to take.
//! - [`output`] registers the host hooks that feed the capture driver.
//! - [`module`] holds the entry points libobs calls.

pub mod capture;
pub mod device;
pub mod main_server;
pub mod module;
pub mod output;
pub mod server;

pub use capture::{CaptureDriver, CaptureStats, CapturedFrame};
pub use device::ObsGraphicsDevice;
pub use main_server::MainServer;
pub use output::{register_syphon_output, unregister_syphon_output};
pub use server::{PublishOutcome, ServerInstance};

/// Start the main server. A running server is left as is.
pub fn start_main_server(name: &str) -> bool {
    main_server::global().start(name)
}

pub fn stop_main_server() {
    main_server::global().stop()
}

pub fn is_main_server_running() -> bool {
    main_server::global().is_running()
}

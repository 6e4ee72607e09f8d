//! Host-side surface of the plugin.
//!
//! - [`ffi`] declares the slice of the libobs ABI the plugin uses.
//! - [`inputs`] wraps host frames in borrowed, checked views.
//! - [`logging`] routes `tracing` output into the host log.
//! - [`config`] holds the fixed plugin configuration.

pub mod config;
pub mod ffi;
pub mod inputs;
pub mod logging;

pub use inputs::{HostTexture, RawVideo};
pub use logging::{HostLog, HostLogLayer, LogLevel, LogSink};

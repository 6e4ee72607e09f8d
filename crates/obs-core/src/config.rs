//! Fixed plugin configuration.
//!
//! Nothing here is user-facing: the main server always auto-starts under
//! [`DEFAULT_SERVER_NAME`]. Only the log filter can be tuned, through the
//! [`LOG_FILTER_ENV`] environment variable.

pub const PLUGIN_NAME: &str = "obs-syphon";

/// Name the main server advertises to consumers.
pub const DEFAULT_SERVER_NAME: &str = "OBS Syphon";

/// Prefix prepended to every line written to the host log.
pub const LOG_PREFIX: &str = "[syphon]";

/// Environment variable holding an `EnvFilter` directive, e.g. `debug`.
pub const LOG_FILTER_ENV: &str = "OBS_SYPHON_LOG";

pub const DEFAULT_LOG_FILTER: &str = "info";

/// Install locations of the host application, used by packaging only.
pub mod paths {
    pub const OBS_DATA_PATH: &str = "/Applications/OBS.app/Contents/Resources/data";
    pub const OBS_PLUGIN_PATH: &str = "/Applications/OBS.app/Contents/PlugIns";
    pub const OBS_PLUGIN_DESTINATION: &str = "/Applications/OBS.app/Contents/PlugIns";
}

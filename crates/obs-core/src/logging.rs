//! Routing of `tracing` events into the host's leveled log.
//!
//! [`HostLogLayer`] is a `tracing_subscriber` layer that flattens each event
//! into one line and hands it to a [`LogSink`]. [`init`] installs it as the
//! global subscriber, writing through the host's `blog` on macOS.

use std::fmt::{self, Write as _};
use std::sync::Once;

use num_derive::{FromPrimitive, ToPrimitive};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::{DEFAULT_LOG_FILTER, LOG_FILTER_ENV, LOG_PREFIX};

static LOG_INIT_ONCE: Once = Once::new();

/// Host log levels, with the host's numeric values.
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive, ToPrimitive)]
pub enum LogLevel {
    Error = 100,
    Warning = 200,
    Info = 300,
    Debug = 400,
}

impl From<&Level> for LogLevel {
    fn from(level: &Level) -> Self {
        match *level {
            Level::ERROR => LogLevel::Error,
            Level::WARN => LogLevel::Warning,
            Level::INFO => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }
}

/// Destination for formatted log lines.
pub trait LogSink: Send + Sync + 'static {
    fn write(&self, level: LogLevel, message: &str);
}

/// The host application's log.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostLog;

impl LogSink for HostLog {
    #[cfg(target_os = "macos")]
    fn write(&self, level: LogLevel, message: &str) {
        let Ok(line) = std::ffi::CString::new(message.replace('\0', "")) else {
            return;
        };
        // SAFETY: "%s" consumes exactly the one NUL-terminated argument.
        unsafe { crate::ffi::blog(level as i32, c"%s".as_ptr(), line.as_ptr()) };
    }

    #[cfg(not(target_os = "macos"))]
    fn write(&self, level: LogLevel, message: &str) {
        eprintln!("{level:?}: {message}");
    }
}

/// Layer forwarding every event to a [`LogSink`] as a single prefixed line.
pub struct HostLogLayer<S> {
    sink: S,
    prefix: &'static str,
}

impl<S: LogSink> HostLogLayer<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            prefix: LOG_PREFIX,
        }
    }

    pub fn with_prefix(mut self, prefix: &'static str) -> Self {
        self.prefix = prefix;
        self
    }
}

impl<S: LogSink, Sub: Subscriber> Layer<Sub> for HostLogLayer<S> {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, Sub>) {
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        let line = format!("{} {}{}", self.prefix, visitor.message, visitor.fields);
        self.sink
            .write(LogLevel::from(event.metadata().level()), &line);
    }
}

#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// Install the host log as the global `tracing` subscriber.
///
/// Runs once per process. If another global subscriber already exists it is
/// left in place.
pub fn init() {
    LOG_INIT_ONCE.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(HostLogLayer::new(HostLog))
            .try_init();
    });
}

/// Sink that keeps every line in memory, for assertions in tests.
#[derive(Debug, Default, Clone)]
pub struct CaptureSink {
    lines: std::sync::Arc<std::sync::Mutex<Vec<(LogLevel, String)>>>,
}

impl CaptureSink {
    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.lines().iter().filter(|(l, _)| *l == level).count()
    }
}

impl LogSink for CaptureSink {
    fn write(&self, level: LogLevel, message: &str) {
        self.lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((level, message.to_owned()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::{FromPrimitive, ToPrimitive};

    #[test]
    fn levels_map_to_host_values() {
        assert_eq!(LogLevel::from(&Level::ERROR).to_i32(), Some(100));
        assert_eq!(LogLevel::from(&Level::WARN), LogLevel::Warning);
        assert_eq!(LogLevel::from(&Level::TRACE), LogLevel::Debug);
        assert_eq!(LogLevel::from_i32(300), Some(LogLevel::Info));
    }

    #[test]
    fn events_are_prefixed_and_flattened() {
        let sink = CaptureSink::default();
        let subscriber = tracing_subscriber::registry().with(HostLogLayer::new(sink.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(width = 1920, "server started");
            tracing::error!("copy failed");
        });

        let lines = sink.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], (LogLevel::Info, "[syphon] server started width=1920".to_owned()));
        assert_eq!(lines[1], (LogLevel::Error, "[syphon] copy failed".to_owned()));
    }

    #[test]
    fn custom_prefix_is_used() {
        let sink = CaptureSink::default();
        let layer = HostLogLayer::new(sink.clone()).with_prefix("[test]");
        let subscriber = tracing_subscriber::registry().with(layer);

        tracing::subscriber::with_default(subscriber, || tracing::warn!("hello"));

        assert_eq!(sink.lines()[0].1, "[test] hello");
        assert_eq!(sink.count(LogLevel::Warning), 1);
    }
}

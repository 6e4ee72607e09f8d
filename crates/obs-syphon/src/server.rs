//! One texture sharing server and its two publish paths.
//!
//! A [`ServerInstance`] owns at most one [`Backend`]. While it has none it is
//! "not initialized": both publish paths return [`PublishOutcome::Skipped`]
//! without touching the GPU or the log.

use std::fmt;

use gpu_interop::{
    Backend, BackendKind, GpuError, GraphicsDevice, PixelFormat, RawFrame, StagingBuffer,
    TextureFrame,
};
use tracing::{debug, error, info};

/// Result of a single publish call, as seen by the render thread.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    /// Nothing to do: no live backend or an empty frame.
    Skipped,
    Failed,
}

/// Logs the first failure of a streak and the recovery that ends it.
#[derive(Debug, Default)]
struct FailureLog {
    streak: u64,
}

impl FailureLog {
    fn failed(&mut self, server: &str, what: &str, err: &dyn fmt::Display) {
        if self.streak == 0 {
            error!("{what} on server '{server}' failed: {err}");
        }
        self.streak += 1;
    }

    fn succeeded(&mut self, server: &str) {
        if self.streak > 0 {
            info!(
                failed_frames = self.streak,
                "Publishing on server '{server}' recovered"
            );
            self.streak = 0;
        }
    }
}

pub struct ServerInstance {
    name: String,
    backend: Option<Backend>,
    staging: StagingBuffer,
    failures: FailureLog,
}

impl fmt::Debug for ServerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerInstance")
            .field("name", &self.name)
            .field("backend", &self.backend_kind())
            .finish()
    }
}

impl ServerInstance {
    /// Create a server on `device`, preferring Metal over OpenGL.
    pub fn try_init<D: GraphicsDevice>(device: &D, name: &str) -> Result<Self, GpuError> {
        let kind = device.capabilities()?.preferred().ok_or_else(|| {
            GpuError::DeviceUnavailable("graphics context supports no sharing backend".to_owned())
        })?;
        let backend = device.create_backend(kind, name)?;

        info!(backend = ?kind, "Server '{name}' created");
        Ok(Self {
            name: name.to_owned(),
            backend: Some(backend),
            staging: StagingBuffer::new(),
            failures: FailureLog::default(),
        })
    }

    /// Like [`try_init`](Self::try_init), but logs a failure and returns an
    /// uninitialized instance instead.
    pub fn init<D: GraphicsDevice>(device: &D, name: &str) -> Self {
        match Self::try_init(device, name) {
            Ok(instance) => instance,
            Err(e) => {
                error!("Failed to create server '{name}': {e}");
                Self::uninitialized(name)
            }
        }
    }

    pub fn uninitialized(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            backend: None,
            staging: StagingBuffer::new(),
            failures: FailureLog::default(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.backend.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend_kind(&self) -> Option<BackendKind> {
        self.backend.as_ref().map(Backend::kind)
    }

    pub fn backend(&self) -> Option<&Backend> {
        self.backend.as_ref()
    }

    /// Release the backend. Safe to call any number of times.
    ///
    /// The handle is taken out before it is shut down, so nothing can reach
    /// a half-released backend through this instance.
    pub fn destroy(&mut self) {
        if let Some(backend) = self.backend.take() {
            backend.shutdown();
            debug!("Server '{}' destroyed", self.name);
        }
        self.staging = StagingBuffer::new();
        self.failures = FailureLog::default();
    }

    /// Publish a producer texture, zero-copy on Metal.
    pub fn publish_frame(&mut self, frame: &TextureFrame) -> PublishOutcome {
        let Some(backend) = self.backend.as_mut() else {
            return PublishOutcome::Skipped;
        };
        if frame.is_empty() {
            return PublishOutcome::Skipped;
        }

        let result = backend.publish_texture(frame);
        self.settle(result, "Frame publish")
    }

    /// Copy a CPU frame into staging, then publish it.
    ///
    /// `data` is only read during the call. Rows are `line_size` bytes apart.
    pub fn publish_raw_frame(
        &mut self,
        data: &[u8],
        width: u32,
        height: u32,
        line_size: u32,
        format: PixelFormat,
    ) -> PublishOutcome {
        if self.backend.is_none() {
            return PublishOutcome::Skipped;
        }

        match RawFrame::new(data, width, height, line_size, format) {
            Ok(frame) => self.publish_raw(&frame),
            Err(e) => {
                self.failures.failed(&self.name, "Raw frame publish", &e);
                PublishOutcome::Failed
            }
        }
    }

    pub fn publish_raw(&mut self, frame: &RawFrame<'_>) -> PublishOutcome {
        let Some(backend) = self.backend.as_mut() else {
            return PublishOutcome::Skipped;
        };

        self.staging.pack(frame);
        let result = backend.publish_staged(&self.staging);
        self.settle(result, "Raw frame publish")
    }

    fn settle(&mut self, result: Result<(), GpuError>, what: &str) -> PublishOutcome {
        match result {
            Ok(()) => {
                self.failures.succeeded(&self.name);
                PublishOutcome::Published
            }
            Err(e) if e.is_context_lost() => {
                error!(
                    "{what} on server '{}' lost the graphics context; server needs a restart",
                    self.name
                );
                self.destroy();
                PublishOutcome::Failed
            }
            Err(e) => {
                self.failures.failed(&self.name, what, &e);
                PublishOutcome::Failed
            }
        }
    }
}

impl Drop for ServerInstance {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpu_interop::mock::{MockDevice, MockEvent};
    use gpu_interop::{Capabilities, NativeTexture, GL_TEXTURE_2D};
    use obs_core::logging::CaptureSink;
    use obs_core::{HostLogLayer, LogLevel};
    use std::ptr::NonNull;
    use tracing_subscriber::layer::SubscriberExt;

    fn metal_frame(width: u32, height: u32) -> TextureFrame {
        TextureFrame::new(
            NativeTexture::Metal(NonNull::dangling()),
            width,
            height,
            PixelFormat::Bgra8,
        )
    }

    fn with_log<R>(f: impl FnOnce() -> R) -> (R, CaptureSink) {
        let sink = CaptureSink::default();
        let subscriber = tracing_subscriber::registry().with(HostLogLayer::new(sink.clone()));
        let result = tracing::subscriber::with_default(subscriber, f);
        (result, sink)
    }

    #[test]
    fn init_prefers_metal() {
        let device = MockDevice::metal();
        let instance = ServerInstance::init(&device, "OBS Syphon");
        assert!(instance.is_initialized());
        assert_eq!(instance.backend_kind(), Some(BackendKind::Metal));
        assert!(instance.backend().unwrap().copy_and_notify().is_none());
    }

    #[test]
    fn init_falls_back_to_opengl() {
        let device = MockDevice::opengl();
        let instance = ServerInstance::init(&device, "OBS Syphon");
        assert_eq!(instance.backend_kind(), Some(BackendKind::OpenGl));
        assert!(instance.backend().unwrap().copy_and_notify().is_some());
    }

    #[test]
    fn failed_init_returns_uninitialized_instance() {
        let device = MockDevice::metal();
        device.set_fail_init(true);

        let (instance, log) = with_log(|| ServerInstance::init(&device, "taken"));
        assert!(!instance.is_initialized());
        assert_eq!(instance.name(), "taken");
        assert_eq!(log.count(LogLevel::Error), 1);

        let no_backend = MockDevice::with_capabilities(Capabilities::default());
        assert!(ServerInstance::try_init(&no_backend, "x").is_err());
    }

    #[test]
    fn destroy_is_idempotent() {
        let device = MockDevice::metal();
        let recorder = device.recorder();
        let mut instance = ServerInstance::init(&device, "a");

        instance.destroy();
        instance.destroy();
        assert!(!instance.is_initialized());
        assert_eq!(recorder.live_servers(), 0);

        let stops = recorder
            .events()
            .iter()
            .filter(|e| matches!(e, MockEvent::Stopped { .. }))
            .count();
        assert_eq!(stops, 1);

        let mut never = ServerInstance::uninitialized("b");
        never.destroy();
        assert!(!never.is_initialized());
    }

    #[test]
    fn uninitialized_publish_is_silent_noop() {
        let device = MockDevice::metal();
        let recorder = device.recorder();
        let mut instance = ServerInstance::init(&device, "a");
        instance.destroy();
        recorder.clear_events();

        let data = [0u8; 64];
        let ((frame, raw), log) = with_log(|| {
            (
                instance.publish_frame(&metal_frame(4, 4)),
                instance.publish_raw_frame(&data, 4, 4, 16, PixelFormat::Bgra8),
            )
        });
        assert_eq!(frame, PublishOutcome::Skipped);
        assert_eq!(raw, PublishOutcome::Skipped);
        assert!(recorder.events().is_empty());
        assert!(log.lines().is_empty());
    }

    #[test]
    fn raw_publish_stages_visible_region_only() {
        let device = MockDevice::metal();
        let recorder = device.recorder();
        let mut instance = ServerInstance::init(&device, "a");

        // 2x2 BGRA with 4 bytes of padding per row.
        let data = [
            1, 1, 1, 1, 2, 2, 2, 2, 0xEE, 0xEE, 0xEE, 0xEE, //
            3, 3, 3, 3, 4, 4, 4, 4, 0xEE, 0xEE, 0xEE, 0xEE,
        ];
        let outcome = instance.publish_raw_frame(&data, 2, 2, 12, PixelFormat::Bgra8);
        assert_eq!(outcome, PublishOutcome::Published);

        let staged = recorder.events().into_iter().find_map(|e| match e {
            MockEvent::Staged { bytes, width, height, .. } => Some((bytes, width, height)),
            _ => None,
        });
        let (bytes, width, height) = staged.unwrap();
        assert_eq!((width, height), (2, 2));
        assert_eq!(bytes, [1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4]);
    }

    #[test]
    fn opengl_raw_publish_copies_staged_texture() {
        let device = MockDevice::opengl();
        let recorder = device.recorder();
        let mut instance = ServerInstance::init(&device, "gl");

        let data = [7u8; 3 * 2 * 4];
        let outcome = instance.publish_raw_frame(&data, 3, 2, 12, PixelFormat::Rgba8);
        assert_eq!(outcome, PublishOutcome::Published);

        let events = recorder.events();
        assert!(events.iter().any(|e| matches!(e, MockEvent::Staged { .. })));
        assert!(events.contains(&MockEvent::Copied {
            server: 0,
            width: 3,
            height: 2
        }));
    }

    #[test]
    fn gpu_errors_are_logged_once_per_streak() {
        let device = MockDevice::metal();
        let recorder = device.recorder();
        let mut instance = ServerInstance::init(&device, "a");
        for _ in 0..3 {
            recorder.fail_next(GpuError::Allocation("out of VRAM".to_owned()));
        }

        let (outcomes, log) = with_log(|| {
            (0..4)
                .map(|_| instance.publish_frame(&metal_frame(8, 8)))
                .collect::<Vec<_>>()
        });

        assert_eq!(
            outcomes,
            [
                PublishOutcome::Failed,
                PublishOutcome::Failed,
                PublishOutcome::Failed,
                PublishOutcome::Published
            ]
        );
        assert!(instance.is_initialized());
        assert_eq!(log.count(LogLevel::Error), 1);
        assert_eq!(log.count(LogLevel::Info), 1);
        assert!(log.lines()[1].1.contains("failed_frames=3"));
    }

    #[test]
    fn context_loss_uninitializes_instance() {
        let device = MockDevice::metal();
        let recorder = device.recorder();
        let mut instance = ServerInstance::init(&device, "a");
        recorder.fail_next(GpuError::ContextLost);

        assert_eq!(
            instance.publish_frame(&metal_frame(8, 8)),
            PublishOutcome::Failed
        );
        assert!(!instance.is_initialized());
        assert_eq!(recorder.live_servers(), 0);
        assert_eq!(
            instance.publish_frame(&metal_frame(8, 8)),
            PublishOutcome::Skipped
        );
    }

    #[test]
    fn empty_and_malformed_frames_are_not_published() {
        let device = MockDevice::metal();
        let recorder = device.recorder();
        let mut instance = ServerInstance::init(&device, "a");

        assert_eq!(
            instance.publish_frame(&metal_frame(0, 1080)),
            PublishOutcome::Skipped
        );
        assert_eq!(
            instance.publish_raw_frame(&[0u8; 8], 4, 4, 16, PixelFormat::Bgra8),
            PublishOutcome::Failed
        );
        assert_eq!(recorder.published(), 0);
    }

    #[test]
    fn backend_exclusivity_holds_per_instance() {
        let device = MockDevice::opengl();
        let gl = ServerInstance::init(&device, "gl");
        let gl_frame = TextureFrame::new(
            NativeTexture::Gl {
                name: 1,
                target: GL_TEXTURE_2D,
            },
            2,
            2,
            PixelFormat::Bgra8,
        );
        assert!(matches!(gl.backend(), Some(Backend::OpenGl(_))));

        device.set_capabilities(Capabilities {
            metal: true,
            opengl: false,
        });
        let mut metal = ServerInstance::init(&device, "metal");
        assert!(matches!(metal.backend(), Some(Backend::Metal(_))));
        assert_eq!(metal.publish_frame(&gl_frame), PublishOutcome::Failed);
        assert!(metal.is_initialized());
    }
}

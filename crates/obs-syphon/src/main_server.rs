//! The process-wide main server.
//!
//! Start and stop come from the module lifecycle; publishes come from the
//! host's render and video threads. One mutex guards the instance. The
//! `running` flag mirrors it so [`MainServer::is_running`] never waits on a
//! publish.
//!
//! Lock order is host graphics context, then the instance mutex. Lifecycle
//! calls take the mutex first and then enter the context, so publishes only
//! ever `try_lock` and treat contention as a skipped frame.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use gpu_interop::{BackendKind, GraphicsDevice, RawFrame, TextureFrame};
use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

use crate::device::ObsGraphicsDevice;
use crate::server::{PublishOutcome, ServerInstance};

const NO_BACKEND: u8 = 0;
const OPENGL: u8 = 1;
const METAL: u8 = 2;

static MAIN_SERVER: Lazy<MainServer<ObsGraphicsDevice>> =
    Lazy::new(|| MainServer::new(ObsGraphicsDevice));

/// The main server bound to the host's graphics device.
pub fn global() -> &'static MainServer<ObsGraphicsDevice> {
    &MAIN_SERVER
}

pub struct MainServer<D: GraphicsDevice> {
    device: D,
    instance: Mutex<Option<ServerInstance>>,
    running: AtomicBool,
    backend: AtomicU8,
}

impl<D: GraphicsDevice> MainServer<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            instance: Mutex::new(None),
            running: AtomicBool::new(false),
            backend: AtomicU8::new(NO_BACKEND),
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Start the server under `name`. Returns whether it is running.
    ///
    /// A running server is left alone, even if `name` differs.
    pub fn start(&self, name: &str) -> bool {
        let mut slot = self.lock();
        if let Some(current) = slot.as_ref() {
            debug!("Main server already running as '{}'", current.name());
            return true;
        }

        let instance = self
            .device
            .with_context(|| ServerInstance::init(&self.device, name));
        if !instance.is_initialized() {
            return false;
        }

        self.mark(instance.backend_kind());
        *slot = Some(instance);
        info!("Main server '{name}' started");
        true
    }

    /// Stop the server. Returns once no publish can reach it anymore.
    pub fn stop(&self) {
        let mut slot = self.lock();
        self.mark(None);

        if let Some(mut instance) = slot.take() {
            self.device.with_context(|| instance.destroy());
            info!("Main server '{}' stopped", instance.name());
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn active_backend(&self) -> Option<BackendKind> {
        match self.backend.load(Ordering::Acquire) {
            OPENGL => Some(BackendKind::OpenGl),
            METAL => Some(BackendKind::Metal),
            _ => None,
        }
    }

    /// Publish a texture. Called with the graphics context already entered.
    pub fn publish_frame(&self, frame: &TextureFrame) -> PublishOutcome {
        if !self.is_running() {
            return PublishOutcome::Skipped;
        }
        match self.try_lock() {
            Some(mut slot) => self.publish_with(&mut slot, |i| i.publish_frame(frame)),
            None => PublishOutcome::Skipped,
        }
    }

    /// Publish a CPU frame, entering the graphics context for the upload.
    pub fn publish_raw_frame(&self, frame: &RawFrame<'_>) -> PublishOutcome {
        if !self.is_running() {
            return PublishOutcome::Skipped;
        }
        self.device.with_context(|| match self.try_lock() {
            Some(mut slot) => self.publish_with(&mut slot, |i| i.publish_raw(frame)),
            None => PublishOutcome::Skipped,
        })
    }

    fn publish_with(
        &self,
        slot: &mut Option<ServerInstance>,
        publish: impl FnOnce(&mut ServerInstance) -> PublishOutcome,
    ) -> PublishOutcome {
        let Some(instance) = slot.as_mut() else {
            return PublishOutcome::Skipped;
        };

        let outcome = publish(instance);
        if !instance.is_initialized() {
            warn!(
                "Main server '{}' stopped after losing its graphics context",
                instance.name()
            );
            *slot = None;
            self.mark(None);
        }
        outcome
    }

    fn mark(&self, backend: Option<BackendKind>) {
        let tag = match backend {
            None => NO_BACKEND,
            Some(BackendKind::OpenGl) => OPENGL,
            Some(BackendKind::Metal) => METAL,
        };
        self.backend.store(tag, Ordering::Release);
        self.running.store(backend.is_some(), Ordering::Release);
    }

    fn lock(&self) -> MutexGuard<'_, Option<ServerInstance>> {
        self.instance.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_lock(&self) -> Option<MutexGuard<'_, Option<ServerInstance>>> {
        match self.instance.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpu_interop::mock::MockDevice;
    use gpu_interop::{GpuError, NativeTexture, PixelFormat};
    use std::ptr::NonNull;

    fn frame() -> TextureFrame {
        TextureFrame::new(
            NativeTexture::Metal(NonNull::dangling()),
            1920,
            1080,
            PixelFormat::Bgra8,
        )
    }

    #[test]
    fn starts_stopped() {
        let server = MainServer::new(MockDevice::metal());
        assert!(!server.is_running());
        assert_eq!(server.active_backend(), None);
        assert_eq!(server.publish_frame(&frame()), PublishOutcome::Skipped);
    }

    #[test]
    fn double_start_keeps_one_server() {
        let server = MainServer::new(MockDevice::metal());
        let recorder = server.device().recorder();

        assert!(server.start("OBS Syphon"));
        assert!(server.start("Other name"));
        assert_eq!(recorder.created(), 1);
        assert_eq!(recorder.live_servers(), 1);
        assert_eq!(server.active_backend(), Some(BackendKind::Metal));
    }

    #[test]
    fn double_stop_is_harmless() {
        let server = MainServer::new(MockDevice::metal());
        let recorder = server.device().recorder();

        server.start("OBS Syphon");
        server.stop();
        server.stop();
        assert!(!server.is_running());
        assert_eq!(recorder.live_servers(), 0);
    }

    #[test]
    fn restart_yields_fresh_working_server() {
        let server = MainServer::new(MockDevice::metal());
        let recorder = server.device().recorder();

        server.start("OBS Syphon");
        server.stop();
        assert!(server.start("OBS Syphon"));
        assert!(server.is_running());
        assert_eq!(recorder.created(), 2);
        assert_eq!(recorder.live_servers(), 1);
        assert_eq!(server.publish_frame(&frame()), PublishOutcome::Published);
    }

    #[test]
    fn failed_start_stays_stopped() {
        let server = MainServer::new(MockDevice::metal());
        server.device().set_fail_init(true);

        assert!(!server.start("OBS Syphon"));
        assert!(!server.is_running());

        server.device().set_fail_init(false);
        assert!(server.start("OBS Syphon"));
    }

    #[test]
    fn publish_after_stop_is_skipped() {
        let server = MainServer::new(MockDevice::metal());
        let recorder = server.device().recorder();

        server.start("OBS Syphon");
        server.stop();
        assert_eq!(server.publish_frame(&frame()), PublishOutcome::Skipped);

        let data = [0u8; 16];
        let raw = RawFrame::new(&data, 2, 2, 8, PixelFormat::Bgra8).unwrap();
        assert_eq!(server.publish_raw_frame(&raw), PublishOutcome::Skipped);
        assert_eq!(recorder.published(), 0);
        assert_eq!(recorder.violations(), 0);
    }

    #[test]
    fn context_loss_stops_main_server() {
        let server = MainServer::new(MockDevice::metal());
        let recorder = server.device().recorder();

        server.start("OBS Syphon");
        recorder.fail_next(GpuError::ContextLost);
        assert_eq!(server.publish_frame(&frame()), PublishOutcome::Failed);
        assert!(!server.is_running());
        assert_eq!(server.active_backend(), None);
        assert_eq!(recorder.live_servers(), 0);

        assert!(server.start("OBS Syphon"));
        assert_eq!(server.publish_frame(&frame()), PublishOutcome::Published);
    }

    #[test]
    fn contended_publish_is_skipped() {
        let server = MainServer::new(MockDevice::metal());
        server.start("OBS Syphon");

        let _held = server.lock();
        assert_eq!(server.publish_frame(&frame()), PublishOutcome::Skipped);
    }
}

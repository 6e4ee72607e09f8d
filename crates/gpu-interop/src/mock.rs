//! Recording stand-ins for the GPU seam, for tests on any platform.
//!
//! [`MockDevice`] builds real [`Backend`] variants around mock servers that
//! write every call into a shared [`MockRecorder`].

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::backend::{
    Backend, BackendKind, Capabilities, CopyAndNotify, GlServer, GraphicsDevice, MetalBackend,
    MetalServer, OpenGlBackend,
};
use crate::error::GpuError;
use crate::frame::{NativeTexture, PixelFormat, TextureFrame, GL_TEXTURE_2D};
use crate::staging::StagingBuffer;

/// Texture name the mock copy step hands out for staged uploads.
pub const MOCK_STAGING_TEXTURE: u32 = 0xBEEF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Created {
        server: usize,
        kind: BackendKind,
        name: String,
    },
    Copied {
        server: usize,
        width: u32,
        height: u32,
    },
    Staged {
        server: usize,
        width: u32,
        height: u32,
        bytes: Vec<u8>,
    },
    Published {
        server: usize,
        width: u32,
        height: u32,
    },
    Stopped {
        server: usize,
    },
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared log of everything the mock servers were asked to do.
#[derive(Debug, Default)]
pub struct MockRecorder {
    events: Mutex<Vec<MockEvent>>,
    live: Mutex<HashSet<usize>>,
    next_id: AtomicUsize,
    violations: AtomicUsize,
    failures: Mutex<VecDeque<GpuError>>,
    publish_delay: Mutex<Option<Duration>>,
}

impl MockRecorder {
    pub fn events(&self) -> Vec<MockEvent> {
        lock(&self.events).clone()
    }

    pub fn clear_events(&self) {
        lock(&self.events).clear();
    }

    /// Servers created and not yet stopped.
    pub fn live_servers(&self) -> usize {
        lock(&self.live).len()
    }

    /// Number of servers ever created.
    pub fn created(&self) -> usize {
        self.next_id.load(Ordering::SeqCst)
    }

    /// Calls made on a server after it was stopped.
    pub fn violations(&self) -> usize {
        self.violations.load(Ordering::SeqCst)
    }

    pub fn published(&self) -> usize {
        lock(&self.events)
            .iter()
            .filter(|e| matches!(e, MockEvent::Published { .. }))
            .count()
    }

    /// Make the next publish or upload fail with `error`.
    pub fn fail_next(&self, error: GpuError) {
        lock(&self.failures).push_back(error);
    }

    /// Hold every publish for `delay`, to widen race windows.
    pub fn set_publish_delay(&self, delay: Option<Duration>) {
        *lock(&self.publish_delay) = delay;
    }

    fn register(&self, kind: BackendKind, name: &str) -> usize {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.live).insert(id);
        self.record(MockEvent::Created {
            server: id,
            kind,
            name: name.to_owned(),
        });
        id
    }

    fn record(&self, event: MockEvent) {
        lock(&self.events).push(event);
    }

    fn check_live(&self, id: usize) {
        if !lock(&self.live).contains(&id) {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn take_failure(&self) -> Result<(), GpuError> {
        match lock(&self.failures).pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn delay(&self) {
        let delay = *lock(&self.publish_delay);
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
    }

    fn stop(&self, id: usize) {
        if lock(&self.live).remove(&id) {
            self.record(MockEvent::Stopped { server: id });
        }
    }
}

/// [`GraphicsDevice`] producing backends around recording mock servers.
#[derive(Debug)]
pub struct MockDevice {
    recorder: Arc<MockRecorder>,
    capabilities: Mutex<Capabilities>,
    fail_init: AtomicBool,
}

impl MockDevice {
    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            recorder: Arc::default(),
            capabilities: Mutex::new(capabilities),
            fail_init: AtomicBool::new(false),
        }
    }

    /// A device whose context supports both APIs, so Metal gets picked.
    pub fn metal() -> Self {
        Self::with_capabilities(Capabilities {
            metal: true,
            opengl: true,
        })
    }

    pub fn opengl() -> Self {
        Self::with_capabilities(Capabilities {
            metal: false,
            opengl: true,
        })
    }

    pub fn recorder(&self) -> Arc<MockRecorder> {
        self.recorder.clone()
    }

    pub fn set_capabilities(&self, capabilities: Capabilities) {
        *lock(&self.capabilities) = capabilities;
    }

    /// Make server creation fail, as when the name is taken.
    pub fn set_fail_init(&self, fail: bool) {
        self.fail_init.store(fail, Ordering::SeqCst);
    }
}

impl GraphicsDevice for MockDevice {
    fn capabilities(&self) -> Result<Capabilities, GpuError> {
        Ok(*lock(&self.capabilities))
    }

    fn create_backend(&self, kind: BackendKind, name: &str) -> Result<Backend, GpuError> {
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(GpuError::ServerCreation(format!(
                "server name '{name}' already in use"
            )));
        }

        let id = self.recorder.register(kind, name);
        let backend = match kind {
            BackendKind::Metal => Backend::Metal(MetalBackend::new(Box::new(MockMetalServer {
                id,
                recorder: self.recorder.clone(),
            }))),
            BackendKind::OpenGl => Backend::OpenGl(OpenGlBackend::new(
                Box::new(MockGlServer {
                    id,
                    recorder: self.recorder.clone(),
                    bound: None,
                }),
                Box::new(MockCopy {
                    id,
                    recorder: self.recorder.clone(),
                }),
            )),
        };
        Ok(backend)
    }
}

struct MockMetalServer {
    id: usize,
    recorder: Arc<MockRecorder>,
}

impl MetalServer for MockMetalServer {
    fn publish_texture(&mut self, frame: &TextureFrame) -> Result<(), GpuError> {
        self.recorder.check_live(self.id);
        self.recorder.take_failure()?;
        self.recorder.delay();
        self.recorder.record(MockEvent::Published {
            server: self.id,
            width: frame.width,
            height: frame.height,
        });
        Ok(())
    }

    fn publish_staged(&mut self, staged: &StagingBuffer) -> Result<(), GpuError> {
        self.recorder.check_live(self.id);
        self.recorder.take_failure()?;
        self.recorder.record(MockEvent::Staged {
            server: self.id,
            width: staged.width(),
            height: staged.height(),
            bytes: staged.as_bytes().to_vec(),
        });
        self.recorder.record(MockEvent::Published {
            server: self.id,
            width: staged.width(),
            height: staged.height(),
        });
        Ok(())
    }

    fn stop(&mut self) {
        self.recorder.stop(self.id);
    }
}

impl Drop for MockMetalServer {
    fn drop(&mut self) {
        self.recorder.stop(self.id);
    }
}

struct MockGlServer {
    id: usize,
    recorder: Arc<MockRecorder>,
    bound: Option<(u32, u32)>,
}

impl GlServer for MockGlServer {
    fn bind_draw_frame(&mut self, width: u32, height: u32) -> Result<(), GpuError> {
        self.recorder.check_live(self.id);
        self.bound = Some((width, height));
        Ok(())
    }

    fn unbind_and_publish(&mut self) {
        if let Some((width, height)) = self.bound.take() {
            self.recorder.delay();
            self.recorder.record(MockEvent::Published {
                server: self.id,
                width,
                height,
            });
        }
    }

    fn stop(&mut self) {
        self.recorder.stop(self.id);
    }
}

impl Drop for MockGlServer {
    fn drop(&mut self) {
        self.recorder.stop(self.id);
    }
}

struct MockCopy {
    id: usize,
    recorder: Arc<MockRecorder>,
}

impl CopyAndNotify for MockCopy {
    fn copy_and_notify(
        &mut self,
        server: &mut dyn GlServer,
        source: &TextureFrame,
    ) -> Result<(), GpuError> {
        self.recorder.take_failure()?;
        server.bind_draw_frame(source.width, source.height)?;
        self.recorder.record(MockEvent::Copied {
            server: self.id,
            width: source.width,
            height: source.height,
        });
        server.unbind_and_publish();
        Ok(())
    }

    fn stage(&mut self, staged: &StagingBuffer) -> Result<TextureFrame, GpuError> {
        self.recorder.record(MockEvent::Staged {
            server: self.id,
            width: staged.width(),
            height: staged.height(),
            bytes: staged.as_bytes().to_vec(),
        });
        Ok(TextureFrame::new(
            NativeTexture::Gl {
                name: MOCK_STAGING_TEXTURE,
                target: GL_TEXTURE_2D,
            },
            staged.width(),
            staged.height(),
            staged.format().unwrap_or(PixelFormat::Bgra8),
        ))
    }
}

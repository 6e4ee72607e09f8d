//! Per-tick choice between the GPU and raw publish paths.
//!
//! The host feeds the driver from two places: the main rendered callback
//! hands over the composited texture once the scene is drawn, and the output's raw video callback
//! hands over a CPU copy of the same frame. Publishing is best effort and
//! latest-frame-wins; a tick with nothing usable is simply skipped.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use gpu_interop::{
    BackendKind, GraphicsDevice, NativeTexture, PixelFormat, RawFrame, TextureFrame, GL_TEXTURE_2D,
};
use obs_core::ffi::{GsColorFormat, VideoFormat};
use obs_core::{HostTexture, RawVideo};
use once_cell::sync::Lazy;
use tracing::warn;

use crate::main_server::MainServer;
use crate::server::PublishOutcome;

/// Raw frames are dropped for this long after a GPU publish.
pub const RAW_SUPPRESS_WINDOW: Duration = Duration::from_millis(100);

static DRIVER: Lazy<CaptureDriver> = Lazy::new(CaptureDriver::new);

/// The driver shared by the host callbacks.
pub fn driver() -> &'static CaptureDriver {
    &DRIVER
}

/// A CPU frame plus the format the host says it is in.
#[derive(Debug, Copy, Clone)]
pub struct RawCapture<'a> {
    pub video: RawVideo<'a>,
    pub format: Option<VideoFormat>,
}

/// Whatever the host has to offer on one tick.
#[derive(Debug, Default, Copy, Clone)]
pub struct CapturedFrame<'a> {
    pub texture: Option<HostTexture>,
    pub raw: Option<RawCapture<'a>>,
}

impl<'a> CapturedFrame<'a> {
    pub fn texture(texture: HostTexture) -> Self {
        Self {
            texture: Some(texture),
            raw: None,
        }
    }

    pub fn raw(video: RawVideo<'a>, format: Option<VideoFormat>) -> Self {
        Self {
            texture: None,
            raw: Some(RawCapture { video, format }),
        }
    }
}

/// Counter snapshot.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct CaptureStats {
    pub gpu_published: u64,
    pub raw_published: u64,
    pub skipped: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    gpu_published: AtomicU64,
    raw_published: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Copy, Clone)]
enum Path {
    Gpu,
    Raw,
}

pub fn texture_pixel_format(format: GsColorFormat) -> Option<PixelFormat> {
    match format {
        GsColorFormat::Bgra | GsColorFormat::BgraUnorm => Some(PixelFormat::Bgra8),
        GsColorFormat::Bgrx | GsColorFormat::BgrxUnorm => Some(PixelFormat::Bgrx8),
        GsColorFormat::Rgba | GsColorFormat::RgbaUnorm => Some(PixelFormat::Rgba8),
        _ => None,
    }
}

pub fn video_pixel_format(format: VideoFormat) -> Option<PixelFormat> {
    match format {
        VideoFormat::Bgra => Some(PixelFormat::Bgra8),
        VideoFormat::Bgrx => Some(PixelFormat::Bgrx8),
        VideoFormat::Rgba => Some(PixelFormat::Rgba8),
        _ => None,
    }
}

#[derive(Debug, Default)]
pub struct CaptureDriver {
    last_gpu_publish: Mutex<Option<Instant>>,
    warned: Mutex<HashSet<String>>,
    counters: Counters,
}

impl CaptureDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            gpu_published: self.counters.gpu_published.load(Ordering::Relaxed),
            raw_published: self.counters.raw_published.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Publish whatever `frame` offers through `server`.
    pub fn tick<D: GraphicsDevice>(
        &self,
        server: &MainServer<D>,
        frame: CapturedFrame<'_>,
    ) -> PublishOutcome {
        self.tick_at(server, frame, Instant::now())
    }

    /// Feed from the host's post-render hook. By then the main texture holds
    /// the drawn program frame; `None` means the host rendered nothing.
    pub fn main_rendered<D: GraphicsDevice>(
        &self,
        server: &MainServer<D>,
        texture: Option<HostTexture>,
    ) -> PublishOutcome {
        let frame = CapturedFrame {
            texture,
            raw: None,
        };
        self.tick(server, frame)
    }

    fn tick_at<D: GraphicsDevice>(
        &self,
        server: &MainServer<D>,
        frame: CapturedFrame<'_>,
        now: Instant,
    ) -> PublishOutcome {
        let Some(backend) = server.active_backend() else {
            return self.count(PublishOutcome::Skipped, Path::Gpu);
        };

        if let Some(texture) = frame.texture.and_then(|t| self.texture_frame(&t, backend)) {
            let outcome = server.publish_frame(&texture);
            if outcome == PublishOutcome::Published {
                *self.lock_last_gpu() = Some(now);
            }
            return self.count(outcome, Path::Gpu);
        }

        if let Some(raw) = frame.raw {
            if self.gpu_publish_recent(now) {
                return self.count(PublishOutcome::Skipped, Path::Raw);
            }
            if let Some(raw) = self.raw_frame(&raw) {
                let outcome = server.publish_raw_frame(&raw);
                return self.count(outcome, Path::Raw);
            }
        }

        self.count(PublishOutcome::Skipped, Path::Raw)
    }

    /// Describe a host texture for the active backend.
    ///
    /// On OpenGL the host's native object is a pointer to the texture name;
    /// on Metal it is the `MTLTexture` itself.
    fn texture_frame(&self, texture: &HostTexture, backend: BackendKind) -> Option<TextureFrame> {
        if texture.width == 0 || texture.height == 0 {
            return None;
        }
        let format = match texture.format.and_then(texture_pixel_format) {
            Some(format) => format,
            None => {
                self.warn_once(format!("texture format {:?}", texture.format));
                return None;
            }
        };

        let native = match backend {
            BackendKind::Metal => NativeTexture::Metal(texture.native),
            BackendKind::OpenGl => NativeTexture::Gl {
                // SAFETY: on an OpenGL host the native object points to the
                // texture's `GLuint` name.
                name: unsafe { *texture.native.cast::<u32>().as_ptr() },
                target: GL_TEXTURE_2D,
            },
        };
        Some(TextureFrame::new(native, texture.width, texture.height, format))
    }

    fn raw_frame<'a>(&self, raw: &RawCapture<'a>) -> Option<RawFrame<'a>> {
        let Some(format) = raw.format.and_then(video_pixel_format) else {
            self.warn_once(format!("video format {:?}", raw.format));
            return None;
        };

        let video = raw.video;
        match RawFrame::new(video.data, video.width, video.height, video.linesize, format) {
            Ok(frame) => Some(frame),
            Err(e) => {
                self.warn_once(format!("raw frame: {e}"));
                None
            }
        }
    }

    fn gpu_publish_recent(&self, now: Instant) -> bool {
        self.lock_last_gpu()
            .is_some_and(|last| now.saturating_duration_since(last) < RAW_SUPPRESS_WINDOW)
    }

    fn lock_last_gpu(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.last_gpu_publish
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn warn_once(&self, what: String) {
        let first = self
            .warned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(what.clone());
        if first {
            warn!("Unsupported {what}, frames are skipped");
        }
    }

    fn count(&self, outcome: PublishOutcome, path: Path) -> PublishOutcome {
        let counter = match (outcome, path) {
            (PublishOutcome::Published, Path::Gpu) => &self.counters.gpu_published,
            (PublishOutcome::Published, Path::Raw) => &self.counters.raw_published,
            (PublishOutcome::Skipped, _) => &self.counters.skipped,
            (PublishOutcome::Failed, _) => &self.counters.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        outcome
    }
}

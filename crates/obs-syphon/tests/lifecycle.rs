use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use gpu_interop::mock::MockDevice;
use gpu_interop::{NativeTexture, PixelFormat, RawFrame, TextureFrame};
use obs_core::ffi::GsColorFormat;
use obs_core::logging::CaptureSink;
use obs_core::{HostLogLayer, HostTexture, LogLevel};
use obs_syphon::{CaptureDriver, CapturedFrame, MainServer, PublishOutcome};
use tracing_subscriber::layer::SubscriberExt;

fn with_log<R>(f: impl FnOnce() -> R) -> (R, CaptureSink) {
    let sink = CaptureSink::default();
    let subscriber = tracing_subscriber::registry().with(HostLogLayer::new(sink.clone()));
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, sink)
}

fn hd_texture(native: &mut u32) -> HostTexture {
    HostTexture::new(
        native as *mut u32 as *mut c_void,
        1920,
        1080,
        GsColorFormat::Bgra as u32,
    )
    .unwrap()
}

#[test]
fn start_publish_stop() {
    let server = MainServer::new(MockDevice::metal());
    let driver = CaptureDriver::new();
    let recorder = server.device().recorder();
    let mut native = 0u32;

    let ((started, running, outcome), log) = with_log(|| {
        let started = server.start("OBS Syphon");
        let running = server.is_running();
        let outcome = driver.tick(&server, CapturedFrame::texture(hd_texture(&mut native)));
        server.stop();
        (started, running, outcome)
    });

    assert!(started);
    assert!(running);
    assert_eq!(outcome, PublishOutcome::Published);
    assert!(!server.is_running());
    assert_eq!(log.count(LogLevel::Error), 0);
    assert_eq!(recorder.published(), 1);
    assert_eq!(recorder.live_servers(), 0);
}

#[test]
fn publish_before_start_is_noop() {
    let server = MainServer::new(MockDevice::metal());
    let driver = CaptureDriver::new();
    let recorder = server.device().recorder();
    let mut native = 0u32;

    let (outcome, log) =
        with_log(|| driver.tick(&server, CapturedFrame::texture(hd_texture(&mut native))));

    assert_eq!(outcome, PublishOutcome::Skipped);
    assert!(!server.is_running());
    assert!(log.lines().is_empty());
    assert_eq!(recorder.created(), 0);
    assert!(recorder.events().is_empty());
}

#[test]
fn opengl_host_publishes_through_copy_step() {
    let server = MainServer::new(MockDevice::opengl());
    let driver = CaptureDriver::new();
    let mut name = 17u32;

    assert!(server.start("OBS Syphon"));
    let outcome = driver.tick(&server, CapturedFrame::texture(hd_texture(&mut name)));
    assert_eq!(outcome, PublishOutcome::Published);
    assert_eq!(driver.stats().gpu_published, 1);
    server.stop();
}

#[test]
fn stop_racing_publish_never_touches_stopped_server() {
    let server = Arc::new(MainServer::new(MockDevice::metal()));
    let recorder = server.device().recorder();
    recorder.set_publish_delay(Some(Duration::from_micros(50)));
    let done = Arc::new(AtomicBool::new(false));

    let publisher = {
        let server = Arc::clone(&server);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let pixels = vec![0u8; 16 * 16 * 4];
            let raw = RawFrame::new(&pixels, 16, 16, 64, PixelFormat::Bgra8).unwrap();
            let frame = TextureFrame::new(
                NativeTexture::Metal(NonNull::dangling()),
                16,
                16,
                PixelFormat::Bgra8,
            );
            while !done.load(Ordering::Acquire) {
                server.publish_frame(&frame);
                server.publish_raw_frame(&raw);
            }
        })
    };

    // Make sure the publisher is live before racing it.
    server.start("OBS Syphon");
    let deadline = Instant::now() + Duration::from_secs(5);
    while recorder.published() == 0 && Instant::now() < deadline {
        thread::yield_now();
    }
    server.stop();
    assert!(recorder.published() > 0);

    for _ in 0..200 {
        server.start("OBS Syphon");
        thread::yield_now();
        server.stop();
    }
    done.store(true, Ordering::Release);
    publisher.join().unwrap();

    assert!(!server.is_running());
    assert_eq!(recorder.violations(), 0);
    assert_eq!(recorder.live_servers(), 0);
    assert_eq!(recorder.created(), 201);
}

//! Metal server object: publishes producer textures as-is.

use std::ffi::c_void;
use std::ptr::NonNull;

use objc2::rc::{autoreleasepool, Retained};
use objc2::runtime::{AnyObject, Bool, ProtocolObject};
use objc2::msg_send;
use objc2_foundation::{NSPoint, NSRect, NSSize, NSString};
use objc2_metal::{
    MTLCommandBuffer, MTLCommandQueue, MTLDevice, MTLOrigin, MTLPixelFormat, MTLRegion, MTLSize,
    MTLStorageMode, MTLTexture, MTLTextureDescriptor, MTLTextureType, MTLTextureUsage,
};
use tracing::debug;

use super::MetalDevice;
use crate::backend::{BackendKind, MetalServer};
use crate::error::GpuError;
use crate::frame::{NativeTexture, PixelFormat, TextureFrame};
use crate::staging::StagingBuffer;
use crate::syphon;

fn metal_pixel_format(format: PixelFormat) -> MTLPixelFormat {
    match format {
        PixelFormat::Bgra8 | PixelFormat::Bgrx8 => MTLPixelFormat::BGRA8Unorm,
        PixelFormat::Rgba8 => MTLPixelFormat::RGBA8Unorm,
    }
}

/// Whether a publish returns before the GPU has read its texture.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Completion {
    /// The producer owns the texture and keeps it alive.
    Async,
    /// The texture is rewritten by the next raw frame.
    Wait,
}

fn submit(command_buffer: &ProtocolObject<dyn MTLCommandBuffer>, completion: Completion) {
    command_buffer.commit();
    if completion == Completion::Wait {
        command_buffer.waitUntilCompleted();
    }
}

/// Upload target for raw frames, recreated when size or format changes.
struct StagingTexture {
    texture: Retained<ProtocolObject<dyn MTLTexture>>,
    dimensions: (u32, u32),
    format: PixelFormat,
}

/// `SyphonMetalServer` plus the device its frames are encoded on.
pub struct MetalSyphonServer {
    server: Retained<AnyObject>,
    device: MetalDevice,
    staging: Option<StagingTexture>,
    stopped: bool,
}

// SAFETY: the server object is only messaged while the owning instance's
// guard is held, so calls never overlap.
unsafe impl Send for MetalSyphonServer {}

impl MetalSyphonServer {
    /// Create a server advertised under `name`.
    pub fn new(name: &str, device: MetalDevice) -> Result<Self, GpuError> {
        let class = syphon::server_class(syphon::METAL_SERVER_CLASS).ok_or_else(|| {
            GpuError::ServerCreation("SyphonMetalServer class not found".to_owned())
        })?;

        let ns_name = NSString::from_str(name);
        let server = unsafe {
            let alloc: *mut AnyObject = msg_send![class, alloc];
            let server: *mut AnyObject = msg_send![
                alloc,
                initWithName: &*ns_name,
                device: device.device(),
                options: std::ptr::null::<AnyObject>()
            ];
            Retained::from_raw(server)
        }
        .ok_or_else(|| GpuError::ServerCreation(format!("SyphonMetalServer '{name}' refused")))?;

        debug!("Created Metal server '{name}'");
        Ok(Self {
            server,
            device,
            staging: None,
            stopped: false,
        })
    }

    fn publish(
        &self,
        texture: &ProtocolObject<dyn MTLTexture>,
        width: u32,
        height: u32,
        completion: Completion,
    ) -> Result<(), GpuError> {
        let command_buffer = self
            .device
            .command_queue()
            .commandBuffer()
            .ok_or_else(|| GpuError::Allocation("Metal command buffer".to_owned()))?;

        let region = NSRect::new(
            NSPoint::new(0.0, 0.0),
            NSSize::new(width as f64, height as f64),
        );
        unsafe {
            let _: () = msg_send![
                &*self.server,
                publishFrameTexture: texture,
                onCommandBuffer: &*command_buffer,
                imageRegion: region,
                flipped: Bool::NO
            ];
        }
        submit(&command_buffer, completion);
        Ok(())
    }

    fn ensure_staging(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<Retained<ProtocolObject<dyn MTLTexture>>, GpuError> {
        if let Some(staging) = &self.staging {
            if staging.dimensions == (width, height) && staging.format == format {
                return Ok(staging.texture.clone());
            }
        }

        let desc = MTLTextureDescriptor::new();
        desc.setTextureType(MTLTextureType::Type2D);
        desc.setPixelFormat(metal_pixel_format(format));
        unsafe {
            desc.setWidth(width as usize);
            desc.setHeight(height as usize);
        }
        desc.setStorageMode(MTLStorageMode::Managed);
        desc.setUsage(MTLTextureUsage::ShaderRead);

        let texture = self
            .device
            .device()
            .newTextureWithDescriptor(&desc)
            .ok_or_else(|| GpuError::Allocation(format!("staging texture {width}x{height}")))?;

        self.staging = Some(StagingTexture {
            texture: texture.clone(),
            dimensions: (width, height),
            format,
        });
        Ok(texture)
    }
}

impl MetalServer for MetalSyphonServer {
    fn publish_texture(&mut self, frame: &TextureFrame) -> Result<(), GpuError> {
        let NativeTexture::Metal(texture) = frame.texture else {
            return Err(GpuError::BackendMismatch {
                expected: BackendKind::Metal,
            });
        };

        // SAFETY: the producer keeps its texture alive for the duration of
        // the publish call.
        let texture = unsafe { texture.cast::<ProtocolObject<dyn MTLTexture>>().as_ref() };
        autoreleasepool(|_| {
            self.publish(texture, frame.width, frame.height, Completion::Async)
        })
    }

    fn publish_staged(&mut self, staged: &StagingBuffer) -> Result<(), GpuError> {
        let format = staged
            .format()
            .ok_or_else(|| GpuError::Copy("nothing staged".to_owned()))?;
        let (width, height) = staged.dimensions();
        let texture = self.ensure_staging(width, height, format)?;

        let region = MTLRegion {
            origin: MTLOrigin { x: 0, y: 0, z: 0 },
            size: MTLSize {
                width: width as usize,
                height: height as usize,
                depth: 1,
            },
        };
        let bytes = NonNull::new(staged.as_bytes().as_ptr() as *mut c_void)
            .ok_or_else(|| GpuError::Copy("empty staging buffer".to_owned()))?;

        // SAFETY: `bytes` covers `bytes_per_row * height` bytes, matching
        // the region.
        unsafe {
            texture.replaceRegion_mipmapLevel_withBytes_bytesPerRow(
                region,
                0,
                bytes,
                staged.bytes_per_row(),
            );
        }

        // The staging texture is only rewritten once Syphon's copy of it
        // has finished.
        autoreleasepool(|_| self.publish(&texture, width, height, Completion::Wait))
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        unsafe {
            let _: () = msg_send![&*self.server, stop];
        }
        self.staging = None;
        self.stopped = true;
    }
}

impl Drop for MetalSyphonServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use objc2_metal::MTLCommandBufferStatus;

    #[test]
    fn waited_submit_leaves_nothing_pending() {
        let Some(device) = MetalDevice::system_default() else {
            return;
        };
        let command_buffer = device.command_queue().commandBuffer().unwrap();

        submit(&command_buffer, Completion::Wait);
        assert_eq!(command_buffer.status(), MTLCommandBufferStatus::Completed);
    }
}

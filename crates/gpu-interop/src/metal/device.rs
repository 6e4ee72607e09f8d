//! Metal device plus the command queue publishes are encoded on.

use std::ffi::c_void;

use objc2::rc::Retained;
use objc2::runtime::ProtocolObject;
use objc2_metal::{MTLCommandQueue, MTLCreateSystemDefaultDevice, MTLDevice};
use tracing::{debug, error};

/// A Metal device with a single command queue.
///
/// Every publish of one server goes through the same queue, so consumers
/// observe frames in submission order.
pub struct MetalDevice {
    device: Retained<ProtocolObject<dyn MTLDevice>>,
    command_queue: Retained<ProtocolObject<dyn MTLCommandQueue>>,
}

impl MetalDevice {
    /// Use the system default GPU.
    ///
    /// Returns `None` if Metal is unavailable.
    pub fn system_default() -> Option<Self> {
        Self::with_device(MTLCreateSystemDefaultDevice()?)
    }

    /// Wrap a device owned by the host, retaining it.
    ///
    /// # Safety
    ///
    /// `device` must be null or point to a live `id<MTLDevice>`.
    pub unsafe fn from_raw(device: *mut c_void) -> Option<Self> {
        let device = device as *mut ProtocolObject<dyn MTLDevice>;
        // SAFETY: the caller guarantees a live object; retain bumps its
        // refcount so the host keeps its own reference.
        let device = unsafe { Retained::retain(device) }?;
        Self::with_device(device)
    }

    fn with_device(device: Retained<ProtocolObject<dyn MTLDevice>>) -> Option<Self> {
        debug!("Metal device: {}", device.name());

        let command_queue = match device.newCommandQueue() {
            Some(q) => q,
            None => {
                error!("Failed to create Metal command queue");
                return None;
            }
        };

        Some(Self {
            device,
            command_queue,
        })
    }

    pub fn device(&self) -> &ProtocolObject<dyn MTLDevice> {
        &self.device
    }

    pub fn command_queue(&self) -> &ProtocolObject<dyn MTLCommandQueue> {
        &self.command_queue
    }
}

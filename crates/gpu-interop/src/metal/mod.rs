//! Metal backend (macOS).

pub mod device;
pub mod server;

pub use device::MetalDevice;
pub use server::MetalSyphonServer;

use crate::backend::{Backend, MetalBackend};
use crate::error::GpuError;

/// Build a Metal backend whose server encodes on `device`.
pub fn create_backend(name: &str, device: MetalDevice) -> Result<Backend, GpuError> {
    let server = MetalSyphonServer::new(name, device)?;
    Ok(Backend::Metal(MetalBackend::new(Box::new(server))))
}

pub fn server_available() -> bool {
    crate::syphon::is_available(crate::syphon::METAL_SERVER_CLASS)
}

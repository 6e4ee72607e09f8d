//! The host's graphics device as a [`GraphicsDevice`].

use gpu_interop::{Backend, BackendKind, Capabilities, GpuError, GraphicsDevice};

/// Builds backends on the device libobs renders with.
///
/// Metal is only offered when the host renders with Metal, since the host's
/// textures are then `MTLTexture`s. An OpenGL host gets the OpenGL backend.
#[derive(Debug, Default, Copy, Clone)]
pub struct ObsGraphicsDevice;

#[cfg(target_os = "macos")]
mod imp {
    use super::*;
    use gpu_interop::metal::MetalDevice;
    use num_traits::FromPrimitive;
    use obs_core::ffi::{
        gs_get_device_obj, gs_get_device_type, obs_enter_graphics, obs_leave_graphics,
        GsDeviceType,
    };

    /// Leaves the graphics context on drop, including on unwind.
    pub(crate) struct GraphicsGuard;

    impl GraphicsGuard {
        pub(crate) fn enter() -> Self {
            unsafe { obs_enter_graphics() };
            GraphicsGuard
        }
    }

    impl Drop for GraphicsGuard {
        fn drop(&mut self) {
            unsafe { obs_leave_graphics() };
        }
    }

    impl GraphicsDevice for ObsGraphicsDevice {
        fn capabilities(&self) -> Result<Capabilities, GpuError> {
            let raw = unsafe { gs_get_device_type() };
            match GsDeviceType::from_i32(raw) {
                Some(GsDeviceType::Metal) => Ok(Capabilities {
                    metal: gpu_interop::metal::server_available(),
                    opengl: false,
                }),
                Some(GsDeviceType::OpenGl) => Ok(Capabilities {
                    metal: false,
                    opengl: gpu_interop::gl::server_available(),
                }),
                _ => Err(GpuError::DeviceUnavailable(format!(
                    "unsupported host graphics device type {raw}"
                ))),
            }
        }

        fn create_backend(&self, kind: BackendKind, name: &str) -> Result<Backend, GpuError> {
            match kind {
                BackendKind::Metal => {
                    // SAFETY: on a Metal host the device object is an
                    // `id<MTLDevice>`.
                    let device = unsafe { MetalDevice::from_raw(gs_get_device_obj()) }
                        .or_else(MetalDevice::system_default)
                        .ok_or_else(|| {
                            GpuError::DeviceUnavailable("no Metal device".to_owned())
                        })?;
                    gpu_interop::metal::create_backend(name, device)
                }
                BackendKind::OpenGl => gpu_interop::gl::create_backend(name),
            }
        }

        fn with_context<R>(&self, f: impl FnOnce() -> R) -> R {
            let _guard = GraphicsGuard::enter();
            f()
        }
    }
}

#[cfg(target_os = "macos")]
pub(crate) use imp::GraphicsGuard;

#[cfg(not(target_os = "macos"))]
impl GraphicsDevice for ObsGraphicsDevice {
    fn capabilities(&self) -> Result<Capabilities, GpuError> {
        Err(GpuError::UnsupportedPlatform)
    }

    fn create_backend(&self, _kind: BackendKind, _name: &str) -> Result<Backend, GpuError> {
        Err(GpuError::UnsupportedPlatform)
    }
}

#[cfg(all(test, not(target_os = "macos")))]
mod tests {
    use super::*;
    use crate::main_server::MainServer;

    #[test]
    fn host_device_is_inert_off_macos() {
        assert_eq!(
            ObsGraphicsDevice.capabilities(),
            Err(GpuError::UnsupportedPlatform)
        );

        let server = MainServer::new(ObsGraphicsDevice);
        assert!(!server.start("OBS Syphon"));
        assert!(!server.is_running());
    }
}

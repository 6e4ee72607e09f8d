use objc2::msg_send;
use objc2::rc::Retained;
use objc2::runtime::{AnyObject, Bool};
use objc2_foundation::{NSSize, NSString};
use objc2_open_gl::CGLGetCurrentContext;
use tracing::debug;

use crate::backend::GlServer;
use crate::error::GpuError;
use crate::syphon;

/// `SyphonOpenGLServer` bound to the CGL context current at creation.
pub struct GlSyphonServer {
    server: Retained<AnyObject>,
    stopped: bool,
}

// SAFETY: the server is only messaged under the owning instance's guard,
// with its context current.
unsafe impl Send for GlSyphonServer {}

impl GlSyphonServer {
    /// Create a server advertised under `name` on the current context.
    pub fn new(name: &str) -> Result<Self, GpuError> {
        let context = unsafe { CGLGetCurrentContext() };
        if context.is_null() {
            return Err(GpuError::DeviceUnavailable(
                "no current CGL context".to_owned(),
            ));
        }

        let class = syphon::server_class(syphon::OPENGL_SERVER_CLASS).ok_or_else(|| {
            GpuError::ServerCreation("SyphonOpenGLServer class not found".to_owned())
        })?;

        let ns_name = NSString::from_str(name);
        let server = unsafe {
            let alloc: *mut AnyObject = msg_send![class, alloc];
            let server: *mut AnyObject = msg_send![
                alloc,
                initWithName: &*ns_name,
                context: context,
                options: std::ptr::null::<AnyObject>()
            ];
            Retained::from_raw(server)
        }
        .ok_or_else(|| GpuError::ServerCreation(format!("SyphonOpenGLServer '{name}' refused")))?;

        debug!("Created OpenGL server '{name}'");
        Ok(Self {
            server,
            stopped: false,
        })
    }
}

impl GlServer for GlSyphonServer {
    fn bind_draw_frame(&mut self, width: u32, height: u32) -> Result<(), GpuError> {
        let size = NSSize::new(width as f64, height as f64);
        let bound: Bool = unsafe { msg_send![&*self.server, bindToDrawFrameOfSize: size] };
        if bound.as_bool() {
            Ok(())
        } else {
            Err(GpuError::Allocation(format!(
                "shared surface of {width}x{height}"
            )))
        }
    }

    fn unbind_and_publish(&mut self) {
        unsafe {
            let _: () = msg_send![&*self.server, unbindAndPublish];
        }
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        unsafe {
            let _: () = msg_send![&*self.server, stop];
        }
        self.stopped = true;
    }
}

impl Drop for GlSyphonServer {
    fn drop(&mut self) {
        self.stop();
    }
}

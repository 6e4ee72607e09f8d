use gl::types::{GLenum, GLint, GLuint};

/// Host GL state touched by the copy and upload paths.
pub(super) struct SavedGlState {
    unpack_buffer: GLint,
    unpack_row_length: GLint,
    unpack_alignment: GLint,
    draw_framebuffer: GLint,
    read_framebuffer: GLint,
    texture_2d: GLint,
    active_texture: GLint,
}

impl SavedGlState {
    pub(super) unsafe fn save() -> Self {
        let mut s = Self {
            unpack_buffer: 0,
            unpack_row_length: 0,
            unpack_alignment: 4,
            draw_framebuffer: 0,
            read_framebuffer: 0,
            texture_2d: 0,
            active_texture: gl::TEXTURE0 as GLint,
        };
        gl::GetIntegerv(gl::PIXEL_UNPACK_BUFFER_BINDING, &mut s.unpack_buffer);
        gl::GetIntegerv(gl::UNPACK_ROW_LENGTH, &mut s.unpack_row_length);
        gl::GetIntegerv(gl::UNPACK_ALIGNMENT, &mut s.unpack_alignment);
        gl::GetIntegerv(gl::DRAW_FRAMEBUFFER_BINDING, &mut s.draw_framebuffer);
        gl::GetIntegerv(gl::READ_FRAMEBUFFER_BINDING, &mut s.read_framebuffer);
        gl::GetIntegerv(gl::ACTIVE_TEXTURE, &mut s.active_texture);
        gl::GetIntegerv(gl::TEXTURE_BINDING_2D, &mut s.texture_2d);
        s
    }

    pub(super) unsafe fn restore(&self) {
        gl::BindBuffer(gl::PIXEL_UNPACK_BUFFER, self.unpack_buffer as GLuint);
        gl::PixelStorei(gl::UNPACK_ROW_LENGTH, self.unpack_row_length);
        gl::PixelStorei(gl::UNPACK_ALIGNMENT, self.unpack_alignment);
        gl::BindFramebuffer(gl::DRAW_FRAMEBUFFER, self.draw_framebuffer as GLuint);
        gl::BindFramebuffer(gl::READ_FRAMEBUFFER, self.read_framebuffer as GLuint);
        gl::ActiveTexture(self.active_texture as GLenum);
        gl::BindTexture(gl::TEXTURE_2D, self.texture_2d as GLuint);
    }
}

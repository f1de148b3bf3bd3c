//! The graphics-context capability the core renders through.

use motif_core::{FrameBuffer, IRect, Result};

use crate::blend::BlendCoefficients;
use crate::draw::Mesh;
use crate::program::{ProgramId, ProgramSource};
use crate::texture::{BackendTexture, TextureDesc};
use crate::uniform::{UniformLocation, UniformUploader};

/// What a backend can do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCaps {
    pub name: String,
    pub max_texture_size: u32,
    /// Render targets can be copied into another texture directly.
    pub can_copy_framebuffer: bool,
}

/// One draw call against the bound program.
#[derive(Debug, Clone, Copy)]
pub struct DrawCommand<'a> {
    pub program: ProgramId,
    pub target: &'a BackendTexture,
    pub mesh: &'a Mesh,
    pub src_texture: Option<&'a BackendTexture>,
    pub dst_texture: Option<&'a BackendTexture>,
    /// `None` replaces target pixels with the fragment output.
    pub blend: Option<BlendCoefficients>,
}

/// A graphics context: textures, programs, uniform uploads and draws.
///
/// Pixel rectangles are in memory space: row 0 is row 0 of the texture's
/// memory, whatever its origin.
pub trait GpuBackend: UniformUploader + Send {
    fn caps(&self) -> &BackendCaps;

    /// The same object, as its upload capability.
    fn uploader(&mut self) -> &mut dyn UniformUploader;

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<BackendTexture>;

    fn delete_texture(&mut self, texture: &BackendTexture);

    /// Replace the whole texture; `pixels` is in memory order.
    fn write_pixels(&mut self, texture: &BackendTexture, pixels: &FrameBuffer) -> Result<()>;

    /// Whole texture in memory order.
    fn read_pixels(&mut self, texture: &BackendTexture) -> Result<FrameBuffer>;

    /// Copy `src_rect` of `src` to (`dst_x`, `dst_y`) of `dst`.
    fn copy_to_texture(
        &mut self,
        src: &BackendTexture,
        src_rect: IRect,
        dst: &BackendTexture,
        dst_x: u32,
        dst_y: u32,
    ) -> Result<()>;

    fn create_program(&mut self, source: &ProgramSource) -> Result<ProgramId>;

    fn delete_program(&mut self, program: ProgramId);

    /// Slot of the named uniform, `None` when the program does not use it.
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    /// Bind `program`; uniform uploads target it from now on.
    fn use_program(&mut self, program: ProgramId) -> Result<()>;

    fn draw(&mut self, command: &DrawCommand<'_>) -> Result<()>;

    /// Drop everything after the underlying context was lost.
    fn on_context_lost(&mut self) {}
}

//! CPU implementation of [`GpuBackend`].
//!
//! Programs are not compiled. Each one carries a [`ProgramKernel`] that is
//! evaluated per vertex and per fragment over RGBA8 frames, so the whole
//! pipeline runs headless and deterministically. Uniform elimination is
//! modelled on a real compiler: a declared uniform the WGSL never reads has
//! no location.

mod kernel;
mod raster;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use glam::Mat3;
use motif_core::{FrameBuffer, IRect, MotifError, Result};
use tracing::{debug, trace};

use crate::backend::{BackendCaps, DrawCommand, GpuBackend};
use crate::program::{ProgramId, ProgramKernel, ProgramSource};
use crate::texture::{BackendTexture, TextureDesc, TextureId};
use crate::uniform::{UniformLayout, UniformLocation, UniformUploader, UniformValue, UniformValues};

/// Largest texture edge the software backend accepts.
pub const MAX_TEXTURE_SIZE: u32 = 16384;

/// Shared counters of a [`SoftwareBackend`], readable after the backend has
/// been moved into a device.
#[derive(Debug, Default)]
pub struct SoftwareMonitor {
    uniform_uploads: AtomicU64,
    draws: AtomicU64,
    copies: AtomicU64,
    textures_created: AtomicU64,
    programs_created: AtomicU64,
    fail_allocations: AtomicBool,
}

impl SoftwareMonitor {
    pub fn uniform_uploads(&self) -> u64 {
        self.uniform_uploads.load(Ordering::Relaxed)
    }

    pub fn draws(&self) -> u64 {
        self.draws.load(Ordering::Relaxed)
    }

    pub fn copies(&self) -> u64 {
        self.copies.load(Ordering::Relaxed)
    }

    pub fn textures_created(&self) -> u64 {
        self.textures_created.load(Ordering::Relaxed)
    }

    pub fn programs_created(&self) -> u64 {
        self.programs_created.load(Ordering::Relaxed)
    }

    /// Make every following texture allocation fail.
    pub fn set_fail_allocations(&self, fail: bool) {
        self.fail_allocations.store(fail, Ordering::Relaxed);
    }
}

struct SoftTexture {
    desc: TextureDesc,
    pixels: FrameBuffer,
}

struct SoftProgram {
    source: ProgramSource,
    layout: UniformLayout,
    values: Vec<Option<UniformValue>>,
}

impl SoftProgram {
    fn store(&mut self, location: UniformLocation, value: UniformValue) {
        if let Some(slot) = self.values.get_mut(location as usize) {
            *slot = Some(value);
        }
    }
}

/// Headless backend rendering into CPU frames.
pub struct SoftwareBackend {
    caps: BackendCaps,
    textures: HashMap<TextureId, SoftTexture>,
    programs: HashMap<ProgramId, SoftProgram>,
    bound: Option<ProgramId>,
    next_texture: u32,
    next_program: u32,
    monitor: Arc<SoftwareMonitor>,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self {
            caps: BackendCaps {
                name: "software".to_string(),
                max_texture_size: MAX_TEXTURE_SIZE,
                can_copy_framebuffer: true,
            },
            textures: HashMap::new(),
            programs: HashMap::new(),
            bound: None,
            next_texture: 1,
            next_program: 1,
            monitor: Arc::new(SoftwareMonitor::default()),
        }
    }

    /// A backend whose render targets cannot be copied directly, forcing
    /// destination snapshots through a draw.
    pub fn without_framebuffer_copy() -> Self {
        let mut backend = Self::new();
        backend.caps.can_copy_framebuffer = false;
        backend
    }

    pub fn monitor(&self) -> Arc<SoftwareMonitor> {
        Arc::clone(&self.monitor)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    fn texture(&self, id: TextureId) -> Result<&SoftTexture> {
        self.textures
            .get(&id)
            .ok_or_else(|| MotifError::NotFound(format!("texture {}", id.0)))
    }

    fn bound_program(&mut self) -> Option<&mut SoftProgram> {
        let id = self.bound?;
        self.programs.get_mut(&id)
    }

    fn upload(&mut self, location: UniformLocation, value: UniformValue) {
        self.monitor.uniform_uploads.fetch_add(1, Ordering::Relaxed);
        match self.bound_program() {
            Some(program) => program.store(location, value),
            None => trace!(location, "Upload with no bound program"),
        }
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl UniformUploader for SoftwareBackend {
    fn set_1f(&mut self, location: UniformLocation, v: f32) {
        self.upload(location, UniformValue::Float(v));
    }

    fn set_2f(&mut self, location: UniformLocation, x: f32, y: f32) {
        self.upload(location, UniformValue::Float2([x, y]));
    }

    fn set_4f(&mut self, location: UniformLocation, v: [f32; 4]) {
        self.upload(location, UniformValue::Float4(v));
    }

    fn set_matrix3f(&mut self, location: UniformLocation, m: &Mat3) {
        self.upload(location, UniformValue::Mat3(*m));
    }
}

impl GpuBackend for SoftwareBackend {
    fn caps(&self) -> &BackendCaps {
        &self.caps
    }

    fn uploader(&mut self) -> &mut dyn UniformUploader {
        self
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<BackendTexture> {
        if self.monitor.fail_allocations.load(Ordering::Relaxed) {
            return Err(MotifError::OutOfMemory(format!(
                "{}x{} texture",
                desc.width, desc.height
            )));
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(MotifError::InvalidParameter(format!(
                "empty texture {}x{}",
                desc.width, desc.height
            )));
        }
        if desc.width > self.caps.max_texture_size || desc.height > self.caps.max_texture_size {
            return Err(MotifError::InvalidParameter(format!(
                "texture {}x{} exceeds {}",
                desc.width, desc.height, self.caps.max_texture_size
            )));
        }
        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(
            id,
            SoftTexture {
                desc: *desc,
                pixels: FrameBuffer::new(desc.width, desc.height),
            },
        );
        self.monitor.textures_created.fetch_add(1, Ordering::Relaxed);
        trace!(id = id.0, width = desc.width, height = desc.height, "Created texture");
        Ok(BackendTexture::new(id, desc))
    }

    fn delete_texture(&mut self, texture: &BackendTexture) {
        self.textures.remove(&texture.id);
    }

    fn write_pixels(&mut self, texture: &BackendTexture, pixels: &FrameBuffer) -> Result<()> {
        let tex = self
            .textures
            .get_mut(&texture.id)
            .ok_or_else(|| MotifError::NotFound(format!("texture {}", texture.id.0)))?;
        if (pixels.width, pixels.height) != (tex.desc.width, tex.desc.height) {
            return Err(MotifError::InvalidParameter(format!(
                "{}x{} pixels for a {}x{} texture",
                pixels.width, pixels.height, tex.desc.width, tex.desc.height
            )));
        }
        tex.pixels = pixels.clone();
        Ok(())
    }

    fn read_pixels(&mut self, texture: &BackendTexture) -> Result<FrameBuffer> {
        Ok(self.texture(texture.id)?.pixels.clone())
    }

    fn copy_to_texture(
        &mut self,
        src: &BackendTexture,
        src_rect: IRect,
        dst: &BackendTexture,
        dst_x: u32,
        dst_y: u32,
    ) -> Result<()> {
        if !self.caps.can_copy_framebuffer {
            return Err(MotifError::Gpu(
                "framebuffer copies are not supported".to_string(),
            ));
        }
        let (w, h) = (src_rect.width(), src_rect.height());
        if src_rect.left < 0 || src_rect.top < 0 {
            return Err(MotifError::InvalidParameter(format!(
                "copy source {src_rect:?} starts outside the texture"
            )));
        }
        let block = self.texture(src.id)?.pixels.sub_frame(
            src_rect.left as u32,
            src_rect.top as u32,
            w,
            h,
        )?;
        let dst_tex = self
            .textures
            .get_mut(&dst.id)
            .ok_or_else(|| MotifError::NotFound(format!("texture {}", dst.id.0)))?;
        if dst_x + w > dst_tex.desc.width || dst_y + h > dst_tex.desc.height {
            return Err(MotifError::InvalidParameter(format!(
                "copy of {w}x{h} to ({dst_x}, {dst_y}) overflows the destination"
            )));
        }
        for row in 0..h {
            let out = &mut dst_tex.pixels.row_mut(dst_y + row)
                [dst_x as usize * 4..(dst_x + w) as usize * 4];
            out.copy_from_slice(block.row(row));
        }
        self.monitor.copies.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn create_program(&mut self, source: &ProgramSource) -> Result<ProgramId> {
        if !source.wgsl.contains("fn fs_main") {
            return Err(MotifError::Shader(format!(
                "{}: missing fragment entry point",
                source.label
            )));
        }
        let id = ProgramId(self.next_program);
        self.next_program += 1;
        let layout = source.uniform_layout();
        let values = vec![None; layout.slots().len()];
        self.programs.insert(
            id,
            SoftProgram {
                source: source.clone(),
                layout,
                values,
            },
        );
        self.monitor.programs_created.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
        if self.bound == Some(program) {
            self.bound = None;
        }
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let program = self.programs.get(&program)?;
        if !program.source.reads_uniform(name) {
            return None;
        }
        program.layout.find(name)
    }

    fn use_program(&mut self, program: ProgramId) -> Result<()> {
        if !self.programs.contains_key(&program) {
            return Err(MotifError::NotFound(format!("program {}", program.0)));
        }
        self.bound = Some(program);
        Ok(())
    }

    fn draw(&mut self, command: &DrawCommand<'_>) -> Result<()> {
        if self.bound != Some(command.program) {
            return Err(MotifError::Gpu(format!(
                "draw with program {} while {:?} is bound",
                command.program.0, self.bound
            )));
        }
        let target_id = command.target.id;
        for sampled in [command.src_texture, command.dst_texture].into_iter().flatten() {
            if sampled.id == target_id {
                return Err(MotifError::InvalidParameter(
                    "a draw cannot sample its own render target".to_string(),
                ));
            }
        }
        let mut target = self
            .textures
            .remove(&target_id)
            .ok_or_else(|| MotifError::NotFound(format!("texture {}", target_id.0)))?;
        let result = render(&self.programs, &self.textures, &mut target, command);
        self.textures.insert(target_id, target);
        result?;
        self.monitor.draws.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn on_context_lost(&mut self) {
        debug!(programs = self.programs.len(), "Software context lost");
        self.programs.clear();
        self.bound = None;
    }
}

fn sampled<'a>(
    textures: &'a HashMap<TextureId, SoftTexture>,
    texture: Option<&BackendTexture>,
) -> Result<Option<&'a FrameBuffer>> {
    texture
        .map(|t| {
            textures
                .get(&t.id)
                .map(|s| &s.pixels)
                .ok_or_else(|| MotifError::NotFound(format!("texture {}", t.id.0)))
        })
        .transpose()
}

fn render(
    programs: &HashMap<ProgramId, SoftProgram>,
    textures: &HashMap<TextureId, SoftTexture>,
    target: &mut SoftTexture,
    command: &DrawCommand<'_>,
) -> Result<()> {
    let program = programs
        .get(&command.program)
        .ok_or_else(|| MotifError::NotFound(format!("program {}", command.program.0)))?;
    let src = sampled(textures, command.src_texture)?;
    let dst = sampled(textures, command.dst_texture)?;

    if command.mesh.stride != program.source.vertex_stride() {
        return Err(MotifError::InvalidParameter(format!(
            "mesh stride {} does not match {} ({})",
            command.mesh.stride,
            program.source.label,
            program.source.vertex_stride()
        )));
    }

    let uniforms = UniformValues::new(&program.layout, &program.values);
    let mut out = kernel::Target {
        frame: &mut target.pixels,
        origin: command.target.origin,
    };
    match &program.source.kernel {
        ProgramKernel::Geometry(geometry) => kernel::draw_geometry(
            geometry,
            &program.source.attributes,
            &uniforms,
            command.mesh,
            &mut out,
            src,
            dst,
            command.blend,
        ),
        ProgramKernel::Filter(filter) => {
            let input = src.ok_or_else(|| {
                MotifError::InvalidParameter("filter draw without an input texture".to_string())
            })?;
            kernel::draw_filter(
                filter.as_ref(),
                &program.source.attributes,
                &uniforms,
                command.mesh,
                &mut out,
                input,
                command.blend,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use motif_core::ImageOrigin;

    #[test]
    fn test_copy_to_texture() {
        let mut backend = SoftwareBackend::new();
        let src = backend
            .create_texture(&TextureDesc::rgba(4, 4, ImageOrigin::TopLeft))
            .unwrap();
        let dst = backend
            .create_texture(&TextureDesc::rgba(2, 2, ImageOrigin::TopLeft))
            .unwrap();
        let pattern = FrameBuffer::test_pattern(4, 4);
        backend.write_pixels(&src, &pattern).unwrap();
        backend
            .copy_to_texture(&src, IRect::new(1, 2, 3, 4), &dst, 0, 0)
            .unwrap();
        let out = backend.read_pixels(&dst).unwrap();
        assert_eq!(out, pattern.sub_frame(1, 2, 2, 2).unwrap());
        assert_eq!(backend.monitor().copies(), 1);
    }

    #[test]
    fn test_copy_unsupported() {
        let mut backend = SoftwareBackend::without_framebuffer_copy();
        let a = backend
            .create_texture(&TextureDesc::rgba(2, 2, ImageOrigin::TopLeft))
            .unwrap();
        let b = backend
            .create_texture(&TextureDesc::rgba(2, 2, ImageOrigin::TopLeft))
            .unwrap();
        assert!(backend
            .copy_to_texture(&a, IRect::from_size(2, 2), &b, 0, 0)
            .is_err());
    }

    #[test]
    fn test_failed_allocation() {
        let mut backend = SoftwareBackend::new();
        backend.monitor().set_fail_allocations(true);
        let err = backend
            .create_texture(&TextureDesc::rgba(2, 2, ImageOrigin::TopLeft))
            .unwrap_err();
        assert!(matches!(err, MotifError::OutOfMemory(_)));
    }

    #[test]
    fn test_context_loss_keeps_textures() {
        let mut backend = SoftwareBackend::new();
        backend
            .create_texture(&TextureDesc::rgba(2, 2, ImageOrigin::TopLeft))
            .unwrap();
        backend.on_context_lost();
        assert_eq!(backend.live_textures(), 1);
        assert_eq!(backend.live_programs(), 0);
    }
}

//! wgpu implementation of [`GpuBackend`].
//!
//! Each program owns a WGSL module, one uniform buffer filled from a CPU
//! staging block, and its render pipelines keyed by target format and
//! fixed-function blend. Every draw is recorded and submitted on its own
//! encoder so a following snapshot copy observes it.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use glam::Mat3;
use motif_core::{FrameBuffer, IRect, MotifError, PixelFormat, Result};
use tracing::{debug, info, trace};
use wgpu::util::DeviceExt;

use crate::backend::{BackendCaps, DrawCommand, GpuBackend};
use crate::blend::{BlendCoefficients, BlendFactor};
use crate::program::{AttributeFormat, ProgramId, ProgramSource, SamplerBindings};
use crate::texture::{BackendTexture, TextureDesc, TextureId};
use crate::uniform::{UniformLayout, UniformLocation, UniformUploader, UniformValue};

fn texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::Bgra8 => wgpu::TextureFormat::Bgra8Unorm,
        PixelFormat::Alpha8 => wgpu::TextureFormat::R8Unorm,
    }
}

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
    }
}

fn blend_state(coefficients: Option<BlendCoefficients>) -> Option<wgpu::BlendState> {
    coefficients.map(|c| {
        let component = wgpu::BlendComponent {
            src_factor: blend_factor(c.src),
            dst_factor: blend_factor(c.dst),
            operation: wgpu::BlendOperation::Add,
        };
        wgpu::BlendState {
            color: component,
            alpha: component,
        }
    })
}

fn vertex_format(format: AttributeFormat) -> wgpu::VertexFormat {
    match format {
        AttributeFormat::Float => wgpu::VertexFormat::Float32,
        AttributeFormat::Float2 => wgpu::VertexFormat::Float32x2,
        AttributeFormat::Float4 => wgpu::VertexFormat::Float32x4,
    }
}

/// Swap red and blue of packed 4-byte pixels, in place.
fn swizzle_bgra(bytes: &mut [u8]) {
    for px in bytes.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    (value + alignment - 1) / alignment * alignment
}

/// A texture plus its default view.
struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    desc: TextureDesc,
}

impl GpuTexture {
    fn new(device: &wgpu::Device, desc: &TextureDesc, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(desc.width, desc.height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(desc.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            desc: *desc,
        }
    }

    fn copy_view(&self, x: u32, y: u32) -> wgpu::ImageCopyTexture<'_> {
        wgpu::ImageCopyTexture {
            texture: &self.texture,
            mip_level: 0,
            origin: wgpu::Origin3d { x, y, z: 0 },
            aspect: wgpu::TextureAspect::All,
        }
    }
}

fn texture_view<'a>(
    textures: &'a HashMap<TextureId, GpuTexture>,
    placeholder: &'a GpuTexture,
    texture: Option<&BackendTexture>,
) -> Result<&'a wgpu::TextureView> {
    match texture {
        Some(t) => textures
            .get(&t.id)
            .map(|g| &g.view)
            .ok_or_else(|| MotifError::NotFound(format!("texture {}", t.id.0))),
        None => Ok(&placeholder.view),
    }
}

type PipelineKey = (wgpu::TextureFormat, Option<BlendCoefficients>);

struct GpuProgram {
    label: String,
    source: ProgramSource,
    module: wgpu::ShaderModule,
    layout: UniformLayout,
    staging: Vec<u8>,
    dirty: bool,
    uniform_buffer: wgpu::Buffer,
    uniform_group: wgpu::BindGroup,
    texture_layout: Option<wgpu::BindGroupLayout>,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl GpuProgram {
    fn ensure_pipeline(&mut self, device: &wgpu::Device, key: PipelineKey) -> Result<()> {
        if !self.pipelines.contains_key(&key) {
            let mut offset = 0u64;
            let attributes: Vec<wgpu::VertexAttribute> = self
                .source
                .attributes
                .iter()
                .enumerate()
                .map(|(i, attr)| {
                    let out = wgpu::VertexAttribute {
                        format: vertex_format(attr.format),
                        offset,
                        shader_location: i as u32,
                    };
                    offset += (attr.format.components() * 4) as u64;
                    out
                })
                .collect();
            let buffers = [wgpu::VertexBufferLayout {
                array_stride: (self.source.vertex_stride() * 4) as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &attributes,
            }];

            device.push_error_scope(wgpu::ErrorFilter::Validation);
            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&self.label),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &self.module,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &buffers,
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &self.module,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: key.0,
                        blend: blend_state(key.1),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            });
            if let Some(err) = pollster::block_on(device.pop_error_scope()) {
                return Err(MotifError::Shader(format!("{}: {err}", self.label)));
            }
            debug!(label = %self.label, ?key, "Created pipeline");
            self.pipelines.insert(key, pipeline);
        }
        Ok(())
    }
}

/// Backend over a wgpu device and queue.
pub struct WgpuBackend {
    adapter_info: wgpu::AdapterInfo,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    caps: BackendCaps,
    sampler: wgpu::Sampler,
    uniform_layout: wgpu::BindGroupLayout,
    /// Bound in place of texture inputs a draw does not provide.
    placeholder: GpuTexture,
    textures: HashMap<TextureId, GpuTexture>,
    programs: HashMap<ProgramId, GpuProgram>,
    bound: Option<ProgramId>,
    next_texture: u32,
    next_program: u32,
}

impl WgpuBackend {
    /// Create a headless backend on the preferred adapter.
    pub async fn new() -> Result<Self> {
        #[cfg(target_os = "macos")]
        let backends = wgpu::Backends::METAL;
        #[cfg(not(target_os = "macos"))]
        let backends = wgpu::Backends::VULKAN | wgpu::Backends::DX12 | wgpu::Backends::GL;

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| MotifError::Gpu("No suitable GPU adapter found".to_string()))?;

        let adapter_info = adapter.get_info();
        info!(adapter = ?adapter_info, "Using GPU adapter");

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Motif Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| MotifError::Gpu(format!("Failed to create device: {e}")))?;

        Ok(Self::from_device(Arc::new(device), Arc::new(queue), adapter_info))
    }

    /// Create a backend (blocking version).
    pub fn new_blocking() -> Result<Self> {
        pollster::block_on(Self::new())
    }

    /// Wrap an existing device, e.g. one shared with a presentation layer.
    pub fn from_device(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        adapter_info: wgpu::AdapterInfo,
    ) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Motif Nearest Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Motif Uniforms"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let placeholder = GpuTexture::new(
            &device,
            &TextureDesc::rgba(1, 1, Default::default()),
            "Motif Placeholder",
        );
        let caps = BackendCaps {
            name: format!("wgpu ({:?})", adapter_info.backend),
            max_texture_size: device.limits().max_texture_dimension_2d,
            can_copy_framebuffer: true,
        };
        info!(caps = ?caps, "Created wgpu backend");
        Self {
            adapter_info,
            device,
            queue,
            caps,
            sampler,
            uniform_layout,
            placeholder,
            textures: HashMap::new(),
            programs: HashMap::new(),
            bound: None,
            next_texture: 1,
            next_program: 1,
        }
    }

    /// Get adapter info.
    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    fn texture(&self, id: TextureId) -> Result<&GpuTexture> {
        self.textures
            .get(&id)
            .ok_or_else(|| MotifError::NotFound(format!("texture {}", id.0)))
    }

    fn upload(&mut self, location: UniformLocation, value: UniformValue) {
        let Some(program) = self.bound.and_then(|id| self.programs.get_mut(&id)) else {
            trace!(location, "Upload with no bound program");
            return;
        };
        program.layout.write(&mut program.staging, location, &value);
        program.dirty = true;
    }

    fn texture_layout(&self, samplers: SamplerBindings) -> Option<wgpu::BindGroupLayout> {
        if !samplers.src && !samplers.dst {
            return None;
        }
        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        }];
        if samplers.src {
            entries.push(texture_entry(1));
        }
        if samplers.dst {
            entries.push(texture_entry(2));
        }
        Some(
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Motif Textures"),
                    entries: &entries,
                }),
        )
    }
}

impl UniformUploader for WgpuBackend {
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

impl GpuBackend for WgpuBackend {
    fn caps(&self) -> &BackendCaps {
        &self.caps
    }

    fn uploader(&mut self) -> &mut dyn UniformUploader {
        self
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Result<BackendTexture> {
        if desc.width == 0
            || desc.height == 0
            || desc.width > self.caps.max_texture_size
            || desc.height > self.caps.max_texture_size
        {
            return Err(MotifError::InvalidParameter(format!(
                "texture {}x{} outside 1..={}",
                desc.width, desc.height, self.caps.max_texture_size
            )));
        }
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = GpuTexture::new(&self.device, desc, "Motif Texture");
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(MotifError::OutOfMemory(err.to_string()));
        }
        let id = TextureId(self.next_texture);
        self.next_texture += 1;
        self.textures.insert(id, texture);
        Ok(BackendTexture::new(id, desc))
    }

    fn delete_texture(&mut self, texture: &BackendTexture) {
        if let Some(tex) = self.textures.remove(&texture.id) {
            tex.texture.destroy();
        }
    }

    fn write_pixels(&mut self, texture: &BackendTexture, pixels: &FrameBuffer) -> Result<()> {
        let tex = self.texture(texture.id)?;
        if tex.desc.format == PixelFormat::Alpha8 {
            return Err(MotifError::UnsupportedFormat(
                "RGBA8 pixels for an alpha-only texture".to_string(),
            ));
        }
        if (pixels.width, pixels.height) != (tex.desc.width, tex.desc.height) {
            return Err(MotifError::InvalidParameter(format!(
                "Frame size {}x{} doesn't match texture size {}x{}",
                pixels.width, pixels.height, tex.desc.width, tex.desc.height
            )));
        }
        let mut packed = pixels.to_packed();
        if tex.desc.format == PixelFormat::Bgra8 {
            swizzle_bgra(&mut packed);
        }
        self.queue.write_texture(
            tex.copy_view(0, 0),
            &packed,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(pixels.width * 4),
                rows_per_image: Some(pixels.height),
            },
            extent(pixels.width, pixels.height),
        );
        Ok(())
    }

    fn read_pixels(&mut self, texture: &BackendTexture) -> Result<FrameBuffer> {
        let tex = self.texture(texture.id)?;
        if tex.desc.format == PixelFormat::Alpha8 {
            return Err(MotifError::UnsupportedFormat(
                "reading back an alpha-only texture".to_string(),
            ));
        }
        let (width, height, format) = (tex.desc.width, tex.desc.height, tex.desc.format);
        let row_bytes = width * 4;
        let padded = align_to(row_bytes, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Motif Readback"),
            size: padded as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Motif Readback"),
            });
        encoder.copy_texture_to_buffer(
            tex.copy_view(0, 0),
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            extent(width, height),
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| MotifError::Gpu("readback channel closed".to_string()))?
            .map_err(|e| MotifError::Gpu(format!("readback map failed: {e}")))?;

        let mapped = slice.get_mapped_range();
        let mut packed = Vec::with_capacity((row_bytes * height) as usize);
        for row in 0..height as usize {
            let start = row * padded as usize;
            packed.extend_from_slice(&mapped[start..start + row_bytes as usize]);
        }
        drop(mapped);
        buffer.unmap();
        if format == PixelFormat::Bgra8 {
            swizzle_bgra(&mut packed);
        }
        FrameBuffer::from_pixels(width, height, &packed)
    }

    fn copy_to_texture(
        &mut self,
        src: &BackendTexture,
        src_rect: IRect,
        dst: &BackendTexture,
        dst_x: u32,
        dst_y: u32,
    ) -> Result<()> {
        if src_rect.is_empty() || src_rect.left < 0 || src_rect.top < 0 {
            return Err(MotifError::InvalidParameter(format!(
                "copy source {src_rect:?}"
            )));
        }
        let src_tex = self.texture(src.id)?;
        let dst_tex = self.texture(dst.id)?;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Motif Copy"),
            });
        encoder.copy_texture_to_texture(
            src_tex.copy_view(src_rect.left as u32, src_rect.top as u32),
            dst_tex.copy_view(dst_x, dst_y),
            extent(src_rect.width(), src_rect.height()),
        );
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn create_program(&mut self, source: &ProgramSource) -> Result<ProgramId> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&source.label),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source.wgsl.as_str())),
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(MotifError::Shader(format!("{}: {err}", source.label)));
        }

        let layout = source.uniform_layout();
        let uniform_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&source.label),
            size: layout.size() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&source.label),
            layout: &self.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        let texture_layout = self.texture_layout(source.samplers);
        let mut group_layouts = vec![&self.uniform_layout];
        group_layouts.extend(texture_layout.as_ref());
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&source.label),
                bind_group_layouts: &group_layouts,
                push_constant_ranges: &[],
            });

        let id = ProgramId(self.next_program);
        self.next_program += 1;
        debug!(label = %source.label, ?id, "Compiled WGSL program");
        self.programs.insert(
            id,
            GpuProgram {
                label: source.label.clone(),
                source: source.clone(),
                module,
                staging: vec![0; layout.size() as usize],
                layout,
                dirty: true,
                uniform_buffer,
                uniform_group,
                texture_layout,
                pipeline_layout,
                pipelines: HashMap::new(),
            },
        );
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
        for sampled in [command.src_texture, command.dst_texture].into_iter().flatten() {
            if sampled.id == command.target.id {
                return Err(MotifError::InvalidParameter(
                    "a draw cannot sample its own render target".to_string(),
                ));
            }
        }
        let vertex_count = command.mesh.vertex_count() as u32;
        if vertex_count == 0 {
            return Ok(());
        }

        let target = self
            .textures
            .get(&command.target.id)
            .ok_or_else(|| MotifError::NotFound(format!("texture {}", command.target.id.0)))?;
        let src_view = texture_view(&self.textures, &self.placeholder, command.src_texture)?;
        let dst_view = texture_view(&self.textures, &self.placeholder, command.dst_texture)?;

        let program = self
            .programs
            .get_mut(&command.program)
            .ok_or_else(|| MotifError::NotFound(format!("program {}", command.program.0)))?;
        if program.dirty {
            self.queue
                .write_buffer(&program.uniform_buffer, 0, &program.staging);
            program.dirty = false;
        }

        let texture_group = program.texture_layout.as_ref().map(|layout| {
            let mut entries = vec![wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            }];
            if program.source.samplers.src {
                entries.push(wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(src_view),
                });
            }
            if program.source.samplers.dst {
                entries.push(wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(dst_view),
                });
            }
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Motif Textures"),
                layout,
                entries: &entries,
            })
        });

        let vertices = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Motif Vertices"),
                contents: bytemuck::cast_slice(&command.mesh.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let key = (texture_format(target.desc.format), command.blend);
        program.ensure_pipeline(&self.device, key)?;
        let pipeline = program
            .pipelines
            .get(&key)
            .ok_or_else(|| MotifError::Internal("pipeline missing after creation".to_string()))?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Motif Draw"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Motif Draw"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &program.uniform_group, &[]);
            if let Some(group) = &texture_group {
                pass.set_bind_group(1, group, &[]);
            }
            pass.set_vertex_buffer(0, vertices.slice(..));
            pass.draw(0..vertex_count, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn on_context_lost(&mut self) {
        info!(programs = self.programs.len(), "wgpu context lost");
        self.programs.clear();
        self.bound = None;
    }
}

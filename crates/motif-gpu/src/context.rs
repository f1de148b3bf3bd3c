//! Device and rendering context.
//!
//! A [`Device`] owns exactly one [`Context`] behind a mutex. Every
//! rendering operation runs through the guard returned by
//! [`Device::lock_context`], so program caches, the texture pool and the
//! backend are only ever touched by one thread at a time.

use motif_core::{FrameBuffer, ImageOrigin, Rect, Result, Vec2};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::backend::{BackendCaps, DrawCommand, GpuBackend};
use crate::blend::BlendDescriptor;
use crate::builder::{build_geometry_program, geometry_recipe};
use crate::compositor::{BlendCompositor, DstReadOutcome, DstSnapshot};
use crate::config::RenderConfig;
use crate::draw::{CancelFlag, DrawOp, DrawReport, FrameReport};
use crate::filter::{
    build_filter_program, filter_mesh, filter_recipe, texture_matrix, vertex_matrix, FilterContext,
    FilterRunner, LayerFilter,
};
use crate::processor::{GeometryProgram, TargetInfo};
use crate::program::ProgramCache;
use crate::software::SoftwareBackend;
use crate::texture::{BackendTexture, TextureDesc};
use crate::texture_pool::TexturePool;
use crate::uniform::ProgramDataManager;
use crate::xfer::{XferProcessor, XferProgram};

/// Exclusive access to a device's context.
pub type ContextGuard<'a> = MutexGuard<'a, Context>;

/// Owner of one rendering context.
pub struct Device {
    context: Mutex<Context>,
}

impl Device {
    pub fn new(backend: Box<dyn GpuBackend>, config: RenderConfig) -> Self {
        info!(backend = %backend.caps().name, ?config, "Created device");
        Self {
            context: Mutex::new(Context::new(backend, config)),
        }
    }

    /// A device over a fresh [`SoftwareBackend`].
    pub fn software(config: RenderConfig) -> Self {
        Self::new(Box::new(SoftwareBackend::new()), config)
    }

    /// Block until the context is free. The lock is released when the
    /// guard drops.
    pub fn lock_context(&self) -> ContextGuard<'_> {
        self.context.lock()
    }

    /// The context, unless another thread holds it.
    pub fn try_lock_context(&self) -> Option<ContextGuard<'_>> {
        self.context.try_lock()
    }
}

/// Per-program state of geometry draws.
#[derive(Debug)]
pub struct GeometryState {
    pub geometry: GeometryProgram,
    pub xfer: XferProgram,
}

/// Where and how a filter pass draws.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterDraw {
    /// Content area the input texture holds, in content pixels.
    pub content_bounds: Rect,
    /// Scale from authored effect coordinates to content pixels.
    pub filter_scale: Vec2,
    /// Destination rectangle in target device pixels.
    pub dst_rect: Rect,
}

impl FilterDraw {
    /// Run over the whole target, with the input holding `content_bounds`.
    pub fn covering(target: &BackendTexture, content_bounds: Rect) -> Self {
        Self {
            content_bounds,
            filter_scale: Vec2::ONE,
            dst_rect: target.bounds().to_rect(),
        }
    }
}

/// Counters of a context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextStats {
    pub geometry_programs: usize,
    pub filter_programs: usize,
    pub programs_built: u64,
    pub snapshots: u64,
    pub pool_hits: u64,
    pub pool_misses: u64,
    pub epoch: u64,
}

/// The backend plus everything cached against it.
pub struct Context {
    backend: Box<dyn GpuBackend>,
    config: RenderConfig,
    geometry_programs: ProgramCache<GeometryState>,
    filter_programs: ProgramCache<FilterRunner>,
    pool: TexturePool,
    compositor: BlendCompositor,
    epoch: u64,
}

impl Context {
    pub fn new(backend: Box<dyn GpuBackend>, config: RenderConfig) -> Self {
        Self {
            backend,
            geometry_programs: ProgramCache::new("geometry", config.max_cached_programs),
            filter_programs: ProgramCache::new("filter", config.max_cached_programs),
            pool: TexturePool::new(config.texture_pool_budget),
            compositor: BlendCompositor::new(&config),
            config,
            epoch: 0,
        }
    }

    pub fn caps(&self) -> &BackendCaps {
        self.backend.caps()
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Context-loss counter.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn texture_pool(&self) -> &TexturePool {
        &self.pool
    }

    pub fn compositor(&self) -> &BlendCompositor {
        &self.compositor
    }

    pub fn stats(&self) -> ContextStats {
        let (pool_hits, pool_misses) = self.pool.hit_stats();
        ContextStats {
            geometry_programs: self.geometry_programs.len(),
            filter_programs: self.filter_programs.len(),
            programs_built: self.geometry_programs.programs_built()
                + self.filter_programs.programs_built(),
            snapshots: self.compositor.snapshots_taken(),
            pool_hits,
            pool_misses,
            epoch: self.epoch,
        }
    }

    pub fn make_texture(&mut self, desc: &TextureDesc) -> Result<BackendTexture> {
        self.backend.create_texture(desc)
    }

    pub fn delete_texture(&mut self, texture: &BackendTexture) {
        self.backend.delete_texture(texture);
    }

    /// Upload `pixels` in memory order.
    pub fn write_pixels(&mut self, texture: &BackendTexture, pixels: &FrameBuffer) -> Result<()> {
        self.backend.write_pixels(texture, pixels)
    }

    /// Upload a top-down image, flipping it for bottom-left textures.
    pub fn write_pixels_top_down(
        &mut self,
        texture: &BackendTexture,
        pixels: &FrameBuffer,
    ) -> Result<()> {
        match texture.origin {
            ImageOrigin::TopLeft => self.backend.write_pixels(texture, pixels),
            ImageOrigin::BottomLeft => self.backend.write_pixels(texture, &pixels.flip_vertical()),
        }
    }

    /// Texture contents in memory order.
    pub fn read_pixels(&mut self, texture: &BackendTexture) -> Result<FrameBuffer> {
        self.backend.read_pixels(texture)
    }

    /// Texture contents with row 0 at the top edge, whatever the origin.
    pub fn read_pixels_top_down(&mut self, texture: &BackendTexture) -> Result<FrameBuffer> {
        let pixels = self.backend.read_pixels(texture)?;
        Ok(match texture.origin {
            ImageOrigin::TopLeft => pixels,
            ImageOrigin::BottomLeft => pixels.flip_vertical(),
        })
    }

    /// Issue one draw into `target`.
    ///
    /// Destination-read blends snapshot the pixels under the draw first. If
    /// the snapshot cannot be produced the draw still happens, with
    /// source-over, and the report says why.
    pub fn draw(&mut self, target: &BackendTexture, op: &DrawOp) -> Result<DrawReport> {
        let Self {
            backend,
            geometry_programs,
            pool,
            compositor,
            ..
        } = self;
        let backend = backend.as_mut();

        let fractional = op.geometry.shape().has_fractional_coverage();
        let mut xfer = compositor.begin(BlendDescriptor::with_coverage(op.blend, fractional));
        let mut snapshot = None;
        let mut dst_read = DstReadOutcome::NotNeeded;
        if xfer.reads_dst() {
            let taken = compositor.snapshot(
                backend,
                pool,
                target,
                op.geometry.device_bounds(),
                |backend, copy, dst| {
                    let copy_xfer = XferProcessor::for_blend(BlendDescriptor::new(copy.blend));
                    issue_geometry(backend, geometry_programs, copy, copy_xfer, dst, None)
                        .map(|_| ())
                },
            );
            match taken {
                Ok(s) => {
                    dst_read = DstReadOutcome::Used {
                        region: s.region,
                        method: s.method,
                    };
                    snapshot = Some(s);
                }
                Err(reason) => {
                    xfer = compositor.fall_back(op.blend, &reason);
                    dst_read = DstReadOutcome::Skipped(reason);
                }
            }
        }

        let issued = issue_geometry(
            backend,
            geometry_programs,
            op,
            xfer,
            target,
            snapshot.as_ref(),
        );
        if let Some(s) = snapshot {
            compositor.release(backend, pool, s);
        }
        let (program_built, uniform_uploads) = issued?;
        Ok(DrawReport {
            program_built,
            uniform_uploads,
            dst_read,
        })
    }

    /// Issue `ops` in order, stopping before the next draw once `cancel` is
    /// raised.
    pub fn draw_all(
        &mut self,
        target: &BackendTexture,
        ops: &[DrawOp],
        cancel: &CancelFlag,
    ) -> Result<FrameReport> {
        let mut report = FrameReport::default();
        for op in ops {
            if cancel.is_cancelled() {
                debug!(issued = report.draws.len(), "Frame cancelled");
                report.cancelled = true;
                break;
            }
            report.draws.push(self.draw(target, op)?);
        }
        Ok(report)
    }

    /// Run `filter` over `input` into `target`. The filter output replaces
    /// the pixels under `params.dst_rect`.
    pub fn apply_filter(
        &mut self,
        filter: &mut dyn LayerFilter,
        input: &BackendTexture,
        target: &BackendTexture,
        params: FilterDraw,
    ) -> Result<DrawReport> {
        let backend = self.backend.as_mut();
        let recipe = filter_recipe(filter);
        let (entry, built) = self.filter_programs.find_or_link(
            backend,
            &recipe,
            || build_filter_program(&*filter),
            FilterRunner::prepare,
        )?;
        let program = entry.program.id();
        let generation = entry.program.generation();
        if filter.prepared_generation() != Some(generation) {
            filter.on_prepare_program(&entry.program);
        }

        backend.use_program(program)?;
        let uniform_uploads = {
            let mut pdm = ProgramDataManager::new(backend.uploader(), generation);
            entry.state.set_data(
                &mut pdm,
                vertex_matrix(params.dst_rect, TargetInfo::of(target)),
                texture_matrix(input),
            );
            let mut ctx = FilterContext::new(&mut pdm, *input);
            filter.on_update_params(&mut ctx, params.content_bounds, params.filter_scale);
            pdm.uploads()
        };

        let mesh = filter_mesh();
        backend.draw(&DrawCommand {
            program,
            target,
            mesh: &mesh,
            src_texture: Some(input),
            dst_texture: None,
            blend: None,
        })?;
        Ok(DrawReport {
            program_built: built,
            uniform_uploads,
            dst_read: DstReadOutcome::NotNeeded,
        })
    }

    /// Delete every compiled program. The next draw of each recipe links a
    /// fresh program and pushes all of its uniforms.
    pub fn purge_programs(&mut self) {
        self.geometry_programs.purge(self.backend.as_mut());
        self.filter_programs.purge(self.backend.as_mut());
    }

    /// The underlying graphics context was lost. Cached programs and pooled
    /// textures are forgotten without backend calls.
    pub fn on_context_lost(&mut self) {
        self.epoch += 1;
        info!(epoch = self.epoch, "Context lost, abandoning cached programs");
        self.backend.on_context_lost();
        self.geometry_programs.abandon();
        self.filter_programs.abandon();
        self.pool.abandon();
    }

    /// Free pooled snapshot textures.
    pub fn purge_texture_pool(&mut self) {
        self.pool.purge(self.backend.as_mut());
    }
}

/// Link or reuse the program for `op`, push its uniforms and draw it.
/// Returns whether the program was linked and how many values were pushed.
fn issue_geometry(
    backend: &mut dyn GpuBackend,
    cache: &mut ProgramCache<GeometryState>,
    op: &DrawOp,
    xfer: XferProcessor,
    target: &BackendTexture,
    snapshot: Option<&DstSnapshot>,
) -> Result<(bool, usize)> {
    let recipe = geometry_recipe(&op.geometry, &op.fragment, xfer);
    let shading = op.fragment.shape();
    let transforms = op.fragment.coord_transforms();
    let (entry, built) = cache.find_or_link(
        backend,
        &recipe,
        || build_geometry_program(&op.geometry, shading, xfer),
        |program| GeometryState {
            geometry: GeometryProgram::prepare(program, transforms.len()),
            xfer: XferProgram::prepare(program),
        },
    )?;
    let program = entry.program.id();

    backend.use_program(program)?;
    let mut pdm = ProgramDataManager::new(backend.uploader(), entry.program.generation());
    op.geometry.set_data(
        &mut pdm,
        &mut entry.state.geometry,
        TargetInfo::of(target),
        transforms,
    );
    entry.state.xfer.set_data(&mut pdm, snapshot);
    let uploads = pdm.uploads();

    let mesh = op.geometry.build_mesh();
    backend.draw(&DrawCommand {
        program,
        target,
        mesh: &mesh,
        src_texture: op.fragment.texture(),
        dst_texture: snapshot.map(|s| &s.texture),
        blend: xfer.blend_coefficients(),
    })?;
    Ok((built, uploads))
}

//! Destination snapshots for blend modes evaluated in the shader.
//!
//! A destination-read draw needs the pixels already under it. Before the
//! draw, the region of the render target under the draw's device bounds is
//! copied into a pooled texture. That texture is sampled by the blend stage
//! through a mapping from the fragment's framebuffer position to snapshot
//! coordinates, which accounts for the origin of the target and of the
//! snapshot. The snapshot goes back to the pool once the draw is issued.

use motif_core::{Color, IRect, ImageOrigin, Matrix, PixelFormat, Rect, Result};
use thiserror::Error;
use tracing::{debug, warn};

use crate::backend::{BackendCaps, GpuBackend};
use crate::blend::{BlendDescriptor, BlendMode};
use crate::config::{DstCopyStrategy, RenderConfig};
use crate::draw::DrawOp;
use crate::fragment::{FragmentStage, TextureSampler};
use crate::processor::{GeometryProcessor, RectGeometry};
use crate::texture::{BackendTexture, TextureDesc};
use crate::texture_pool::TexturePool;
use crate::xfer::XferProcessor;

/// Progress of the destination read of the current draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DstReadState {
    #[default]
    NotNeeded,
    Snapshotting,
    Ready,
    Consumed,
}

/// Why a destination read was abandoned in favour of source-over.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("draw bounds do not intersect the render target")]
    EmptyRegion,
    #[error("snapshot allocation failed: {0}")]
    AllocationFailed(String),
    #[error("snapshot of {width}x{height} exceeds the {limit} pixel limit")]
    TooLarge { width: u32, height: u32, limit: u32 },
    #[error("render target format {0:?} cannot be blended in the shader")]
    UnsupportedFormat(PixelFormat),
    #[error("copying the destination failed: {0}")]
    CopyFailed(String),
}

/// How a snapshot was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMethod {
    /// Framebuffer region copy; keeps the target's origin.
    Direct,
    /// Textured draw into a top-left snapshot.
    Draw,
}

/// What the compositor did for one draw.
#[derive(Debug, Clone, PartialEq)]
pub enum DstReadOutcome {
    NotNeeded,
    Used { region: IRect, method: CopyMethod },
    Skipped(SkipReason),
}

/// A destination copy valid for a single draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DstSnapshot {
    pub texture: BackendTexture,
    /// Copied region, in the target's device pixels.
    pub region: IRect,
    /// `uv = frag_position * coord_scale + coord_offset`, with the fragment
    /// position in target memory pixels.
    pub coord_scale: [f32; 2],
    pub coord_offset: [f32; 2],
    pub method: CopyMethod,
}

/// Device bounds clamped to the target and rounded out, or `None` when the
/// draw covers nothing of the target.
pub fn snapshot_region(device_bounds: Rect, target: &BackendTexture) -> Option<IRect> {
    if !(device_bounds.width > 0.0 && device_bounds.height > 0.0) {
        return None;
    }
    device_bounds.round_out().intersect(target.bounds())
}

/// Mapping from a fragment's memory position in the target to normalized
/// memory coordinates of a snapshot of `region`.
pub fn dst_coord_transform(
    region: IRect,
    target_height: u32,
    target_origin: ImageOrigin,
    snapshot_origin: ImageOrigin,
) -> ([f32; 2], [f32; 2]) {
    let (sw, sh) = (region.width() as f32, region.height() as f32);
    let (l, t) = (region.left as f32, region.top as f32);
    // Device y = a * memory y + c.
    let (a, c) = match target_origin {
        ImageOrigin::TopLeft => (1.0, 0.0),
        ImageOrigin::BottomLeft => (-1.0, target_height as f32),
    };
    let (mut sy, mut oy) = (a / sh, (c - t) / sh);
    if snapshot_origin == ImageOrigin::BottomLeft {
        sy = -sy;
        oy = 1.0 - oy;
    }
    ([1.0 / sw, sy], [-l / sw, oy])
}

/// Draw that renders `region` of `target` into a top-left snapshot of the
/// region's size.
pub fn copy_draw(target: &BackendTexture, region: IRect) -> DrawOp {
    let size = Rect::from_size(region.width() as f32, region.height() as f32);
    let sampler = TextureSampler::with_matrix(
        *target,
        Matrix::translate(region.left as f32, region.top as f32),
    );
    DrawOp::new(
        GeometryProcessor::Rect(RectGeometry::new(size, Color::WHITE)),
        FragmentStage::Texture(sampler),
    )
    .with_blend(BlendMode::Src)
}

/// Runs the destination-read state machine of each draw.
#[derive(Debug)]
pub struct BlendCompositor {
    state: DstReadState,
    strategy: DstCopyStrategy,
    max_dimension: u32,
    snapshots: u64,
}

impl BlendCompositor {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            state: DstReadState::NotNeeded,
            strategy: config.dst_copy,
            max_dimension: config.max_snapshot_dimension,
            snapshots: 0,
        }
    }

    pub fn state(&self) -> DstReadState {
        self.state
    }

    /// Snapshots produced since creation.
    pub fn snapshots_taken(&self) -> u64 {
        self.snapshots
    }

    /// Classify the draw's blend and pick its transfer stage.
    pub fn begin(&mut self, blend: BlendDescriptor) -> XferProcessor {
        self.state = if blend.requires_dst_read {
            DstReadState::Snapshotting
        } else {
            DstReadState::NotNeeded
        };
        XferProcessor::for_blend(blend)
    }

    pub fn copy_method(&self, caps: &BackendCaps) -> CopyMethod {
        match self.strategy {
            DstCopyStrategy::Auto if caps.can_copy_framebuffer => CopyMethod::Direct,
            _ => CopyMethod::Draw,
        }
    }

    /// Copy the target pixels under `device_bounds` into a pooled texture.
    ///
    /// `draw_copy` issues the textured draw of [`copy_draw`] into the
    /// snapshot when the framebuffer cannot be copied directly.
    pub fn snapshot<F>(
        &mut self,
        backend: &mut dyn GpuBackend,
        pool: &mut TexturePool,
        target: &BackendTexture,
        device_bounds: Rect,
        draw_copy: F,
    ) -> std::result::Result<DstSnapshot, SkipReason>
    where
        F: FnOnce(&mut dyn GpuBackend, &DrawOp, &BackendTexture) -> Result<()>,
    {
        if !target.format.is_color() {
            return Err(SkipReason::UnsupportedFormat(target.format));
        }
        let region = snapshot_region(device_bounds, target).ok_or(SkipReason::EmptyRegion)?;
        if region.width() > self.max_dimension || region.height() > self.max_dimension {
            return Err(SkipReason::TooLarge {
                width: region.width(),
                height: region.height(),
                limit: self.max_dimension,
            });
        }

        let method = self.copy_method(backend.caps());
        let origin = match method {
            CopyMethod::Direct => target.origin,
            CopyMethod::Draw => ImageOrigin::TopLeft,
        };
        let desc = TextureDesc {
            width: region.width(),
            height: region.height(),
            format: target.format,
            origin,
        };
        let texture = pool
            .acquire(backend, &desc)
            .map_err(|e| SkipReason::AllocationFailed(e.to_string()))?;

        let copied = match method {
            CopyMethod::Direct => backend.copy_to_texture(
                target,
                target.origin.memory_rect(region, target.height),
                &texture,
                0,
                0,
            ),
            CopyMethod::Draw => draw_copy(backend, &copy_draw(target, region), &texture),
        };
        if let Err(e) = copied {
            pool.release(backend, texture);
            return Err(SkipReason::CopyFailed(e.to_string()));
        }

        let (coord_scale, coord_offset) =
            dst_coord_transform(region, target.height, target.origin, origin);
        self.state = DstReadState::Ready;
        self.snapshots += 1;
        debug!(?region, ?method, ?origin, "Took destination snapshot");
        Ok(DstSnapshot {
            texture,
            region,
            coord_scale,
            coord_offset,
            method,
        })
    }

    /// Source-over replacement for a draw whose snapshot failed.
    pub fn fall_back(&mut self, mode: BlendMode, reason: &SkipReason) -> XferProcessor {
        warn!(mode = mode.name(), %reason, "Falling back to source-over");
        self.state = DstReadState::NotNeeded;
        XferProcessor::Coefficients(BlendMode::SrcOver)
    }

    /// Return the snapshot once its draw was issued.
    pub fn release(
        &mut self,
        backend: &mut dyn GpuBackend,
        pool: &mut TexturePool,
        snapshot: DstSnapshot,
    ) {
        pool.release(backend, snapshot.texture);
        self.state = DstReadState::Consumed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::software::SoftwareBackend;
    use crate::texture::TextureId;
    use motif_core::{FrameBuffer, Vec2};
    use proptest::prelude::*;

    fn target(origin: ImageOrigin) -> BackendTexture {
        BackendTexture {
            id: TextureId(1),
            width: 100,
            height: 100,
            format: PixelFormat::Rgba8,
            origin,
        }
    }

    fn assert_maps(transform: ([f32; 2], [f32; 2]), frag: Vec2, expected: Vec2) {
        let ([sx, sy], [ox, oy]) = transform;
        let uv = frag * Vec2::new(sx, sy) + Vec2::new(ox, oy);
        assert!((uv - expected).length() < 1e-5, "{frag:?} -> {uv:?}");
    }

    #[test]
    fn test_region_is_clamped_and_rounded_out() {
        let t = target(ImageOrigin::TopLeft);
        assert_eq!(
            snapshot_region(Rect::new(-5.5, 10.2, 20.0, 200.0), &t),
            Some(IRect::new(0, 10, 15, 100))
        );
        assert_eq!(snapshot_region(Rect::new(150.0, 0.0, 10.0, 10.0), &t), None);
        assert_eq!(snapshot_region(Rect::new(10.0, 10.0, 0.0, 10.0), &t), None);
    }

    #[test]
    fn test_coord_transform_top_left() {
        let region = IRect::new(10, 20, 30, 60);
        let m = dst_coord_transform(region, 100, ImageOrigin::TopLeft, ImageOrigin::TopLeft);
        assert_maps(m, Vec2::new(10.0, 20.0), Vec2::new(0.0, 0.0));
        assert_maps(m, Vec2::new(30.0, 60.0), Vec2::new(1.0, 1.0));
    }

    #[test]
    fn test_coord_transform_bottom_left_direct_copy() {
        // Device rows [20, 60) live in memory rows [40, 80).
        let region = IRect::new(10, 20, 30, 60);
        let m = dst_coord_transform(
            region,
            100,
            ImageOrigin::BottomLeft,
            ImageOrigin::BottomLeft,
        );
        assert_maps(m, Vec2::new(10.0, 40.0), Vec2::new(0.0, 0.0));
        assert_maps(m, Vec2::new(30.0, 80.0), Vec2::new(1.0, 1.0));
    }

    #[test]
    fn test_coord_transform_bottom_left_draw_copy() {
        // The top-left snapshot holds device row 20 in its row 0, which is
        // memory row 79 of the target.
        let region = IRect::new(10, 20, 30, 60);
        let m = dst_coord_transform(region, 100, ImageOrigin::BottomLeft, ImageOrigin::TopLeft);
        assert_maps(m, Vec2::new(10.0, 80.0), Vec2::new(0.0, 0.0));
        assert_maps(m, Vec2::new(30.0, 40.0), Vec2::new(1.0, 1.0));
    }

    #[test]
    fn test_direct_snapshot_copies_memory_rows() {
        let mut backend = SoftwareBackend::new();
        let mut pool = TexturePool::new(1 << 20);
        let mut compositor = BlendCompositor::new(&RenderConfig::default());
        let target = backend
            .create_texture(&TextureDesc::rgba(8, 8, ImageOrigin::BottomLeft))
            .unwrap();
        let pattern = FrameBuffer::test_pattern(8, 8);
        backend.write_pixels(&target, &pattern).unwrap();

        assert_eq!(
            compositor.begin(BlendDescriptor::new(BlendMode::Multiply)),
            XferProcessor::DstRead(BlendMode::Multiply)
        );
        assert_eq!(compositor.state(), DstReadState::Snapshotting);
        let snapshot = compositor
            .snapshot(
                &mut backend,
                &mut pool,
                &target,
                Rect::new(2.0, 1.0, 4.0, 3.0),
                |_, _, _| unreachable!(),
            )
            .unwrap();
        assert_eq!(compositor.state(), DstReadState::Ready);
        assert_eq!(snapshot.method, CopyMethod::Direct);
        assert_eq!(snapshot.texture.origin, ImageOrigin::BottomLeft);
        // Device rows [1, 4) are memory rows [4, 7).
        let copied = backend.read_pixels(&snapshot.texture).unwrap();
        assert_eq!(copied, pattern.sub_frame(2, 4, 4, 3).unwrap());

        compositor.release(&mut backend, &mut pool, snapshot);
        assert_eq!(compositor.state(), DstReadState::Consumed);
        assert_eq!(pool.texture_count(), 1);
    }

    #[test]
    fn test_allocation_failure_is_a_skip() {
        let mut backend = SoftwareBackend::new();
        let mut pool = TexturePool::new(1 << 20);
        let mut compositor = BlendCompositor::new(&RenderConfig::default());
        let target = backend
            .create_texture(&TextureDesc::rgba(8, 8, ImageOrigin::TopLeft))
            .unwrap();
        backend.monitor().set_fail_allocations(true);
        compositor.begin(BlendDescriptor::new(BlendMode::Screen));
        let err = compositor
            .snapshot(
                &mut backend,
                &mut pool,
                &target,
                Rect::from_size(4.0, 4.0),
                |_, _, _| Ok(()),
            )
            .unwrap_err();
        assert!(matches!(err, SkipReason::AllocationFailed(_)));
        assert_eq!(
            compositor.fall_back(BlendMode::Screen, &err),
            XferProcessor::Coefficients(BlendMode::SrcOver)
        );
    }

    #[test]
    fn test_oversized_region_is_refused() {
        let mut backend = SoftwareBackend::new();
        let mut pool = TexturePool::new(1 << 20);
        let config = RenderConfig {
            max_snapshot_dimension: 4,
            ..RenderConfig::default()
        };
        let mut compositor = BlendCompositor::new(&config);
        let target = backend
            .create_texture(&TextureDesc::rgba(8, 8, ImageOrigin::TopLeft))
            .unwrap();
        let err = compositor
            .snapshot(
                &mut backend,
                &mut pool,
                &target,
                Rect::from_size(8.0, 8.0),
                |_, _, _| Ok(()),
            )
            .unwrap_err();
        assert_eq!(
            err,
            SkipReason::TooLarge {
                width: 8,
                height: 8,
                limit: 4
            }
        );
    }

    #[test]
    fn test_force_draw_uses_top_left_snapshot() {
        let mut backend = SoftwareBackend::new();
        let mut pool = TexturePool::new(1 << 20);
        let config = RenderConfig {
            dst_copy: DstCopyStrategy::ForceDraw,
            ..RenderConfig::default()
        };
        let mut compositor = BlendCompositor::new(&config);
        let target = backend
            .create_texture(&TextureDesc::rgba(8, 8, ImageOrigin::BottomLeft))
            .unwrap();
        let mut drawn = None;
        let snapshot = compositor
            .snapshot(
                &mut backend,
                &mut pool,
                &target,
                Rect::new(1.0, 1.0, 2.0, 2.0),
                |_, op, dst| {
                    drawn = Some((op.blend, dst.origin));
                    Ok(())
                },
            )
            .unwrap();
        assert_eq!(snapshot.method, CopyMethod::Draw);
        assert_eq!(drawn, Some((BlendMode::Src, ImageOrigin::TopLeft)));
    }

    fn origin_strategy() -> impl Strategy<Value = ImageOrigin> {
        prop_oneof![Just(ImageOrigin::TopLeft), Just(ImageOrigin::BottomLeft)]
    }

    proptest! {
        #[test]
        fn dst_coords_land_on_the_copied_texel(
            left in 0i32..200,
            top in 0i32..200,
            width in 1i32..64,
            height in 1i32..64,
            px in 0i32..64,
            py in 0i32..64,
            target_origin in origin_strategy(),
            snapshot_origin in origin_strategy(),
        ) {
            let target_height = 300u32;
            let region = IRect::new(left, top, left + width, top + height);
            let (dx, dy) = (left + px % width, top + py % height);
            let (scale, offset) =
                dst_coord_transform(region, target_height, target_origin, snapshot_origin);

            let memory_y = target_origin.memory_row(dy as u32, target_height);
            let frag = Vec2::new(dx as f32 + 0.5, memory_y as f32 + 0.5);
            let uv = frag * Vec2::from(scale) + Vec2::from(offset);

            let snapshot_row = snapshot_origin.memory_row((dy - top) as u32, height as u32);
            let texel_x = (uv.x * width as f32).floor() as i32;
            let texel_y = (uv.y * height as f32).floor() as i32;
            prop_assert_eq!(texel_x, dx - left);
            prop_assert_eq!(texel_y, snapshot_row as i32);
        }
    }
}

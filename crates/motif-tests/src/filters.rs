//! Layer filters driven through the context and against a bare program.

use glam::Mat3;
use motif_core::color::{quantize, unit};
use motif_core::{FrameBuffer, ImageOrigin, Rect, Vec2};
use motif_effects::{
    EffectFilter, MosaicEffect, MosaicFilter, RadialBlurEffect, RadialBlurFilter,
    RadialBlurQuality,
};
use motif_gpu::filter::{build_filter_program, filter_recipe};
use motif_gpu::uniform::UniformLocation;
use motif_gpu::{
    BackendTexture, FilterContext, FilterDraw, GpuBackend, LayerFilter, Program,
    ProgramDataManager, RenderConfig, SoftwareBackend, TextureDesc, TextureId, UniformUploader,
    UniformValue,
};

use crate::common::{assert_frames_close, software_device, upload};

#[derive(Default)]
struct Recorder {
    calls: Vec<(UniformLocation, UniformValue)>,
}

impl Recorder {
    fn float2(&self) -> Option<[f32; 2]> {
        self.calls.iter().find_map(|(_, v)| match v {
            UniformValue::Float2(v) => Some(*v),
            _ => None,
        })
    }

    fn float(&self) -> Option<f32> {
        self.calls.iter().find_map(|(_, v)| match v {
            UniformValue::Float(v) => Some(*v),
            _ => None,
        })
    }
}

impl UniformUploader for Recorder {
    fn set_1f(&mut self, location: UniformLocation, v: f32) {
        self.calls.push((location, UniformValue::Float(v)));
    }

    fn set_2f(&mut self, location: UniformLocation, x: f32, y: f32) {
        self.calls.push((location, UniformValue::Float2([x, y])));
    }

    fn set_4f(&mut self, location: UniformLocation, v: [f32; 4]) {
        self.calls.push((location, UniformValue::Float4(v)));
    }

    fn set_matrix3f(&mut self, location: UniformLocation, m: &Mat3) {
        self.calls.push((location, UniformValue::Mat3(*m)));
    }
}

fn input(origin: ImageOrigin) -> BackendTexture {
    BackendTexture::new(TextureId(1), &TextureDesc::rgba(200, 100, origin))
}

fn linked(filter: &dyn LayerFilter) -> anyhow::Result<Program> {
    let mut backend = SoftwareBackend::new();
    let program = Program::link(
        &mut backend as &mut dyn GpuBackend,
        filter_recipe(filter),
        &build_filter_program(filter),
    )?;
    Ok(program)
}

fn blur_params(filter: &mut RadialBlurFilter, program: &Program, origin: ImageOrigin) -> Recorder {
    let mut recorder = Recorder::default();
    {
        let mut pdm = ProgramDataManager::new(&mut recorder, program.generation());
        let mut ctx = FilterContext::new(&mut pdm, input(origin));
        filter.on_update_params(
            &mut ctx,
            Rect::new(10.0, 20.0, 200.0, 100.0),
            Vec2::new(2.0, 2.0),
        );
    }
    recorder
}

#[test]
fn radial_blur_center_maps_into_texture_space() -> anyhow::Result<()> {
    let mut filter = RadialBlurFilter::new(RadialBlurQuality::Best);
    filter.set_effect(RadialBlurEffect {
        amount: 20.0,
        center: [50.0, 12.5],
    });
    let program = linked(&filter)?;
    filter.on_prepare_program(&program);
    assert_eq!(filter.prepared_generation(), Some(program.generation()));

    let near = |a: [f32; 2], b: [f32; 2]| (a[0] - b[0]).abs() < 1e-5 && (a[1] - b[1]).abs() < 1e-5;
    let top_left = blur_params(&mut filter, &program, ImageOrigin::TopLeft);
    assert!(near(top_left.float2().unwrap_or_default(), [0.45, 0.05]));
    assert!((top_left.float().unwrap_or_default() - 0.125).abs() < 1e-6);

    let bottom_left = blur_params(&mut filter, &program, ImageOrigin::BottomLeft);
    assert!(near(bottom_left.float2().unwrap_or_default(), [0.45, 0.95]));
    Ok(())
}

/// Top-down nearest-sampled radial blur of `frame`, `taps` samples per pixel
/// towards `center` (in pixels), with the shader-side `amount`.
fn blurred(frame: &FrameBuffer, center: Vec2, amount: f32, taps: u32) -> FrameBuffer {
    let size = Vec2::new(frame.width as f32, frame.height as f32);
    let center = center / size;
    let mut out = FrameBuffer::new(frame.width, frame.height);
    for y in 0..frame.height {
        for x in 0..frame.width {
            let uv = (Vec2::new(x as f32, y as f32) + 0.5) / size;
            let step = (center - uv) * amount;
            let mut sum = [0.0f32; 4];
            for i in 0..taps {
                let texel = ((uv + step * (i as f32 / taps as f32)) * size).floor();
                let tx = texel.x.clamp(0.0, size.x - 1.0) as u32;
                let ty = texel.y.clamp(0.0, size.y - 1.0) as u32;
                for (acc, v) in sum.iter_mut().zip(frame.pixel(tx, ty)) {
                    *acc += unit(v);
                }
            }
            out.set_pixel(x, y, sum.map(|v| quantize(v / taps as f32)));
        }
    }
    out
}

#[test]
fn radial_blur_renders_identically_on_both_origins() -> anyhow::Result<()> {
    let (device, _) = software_device(SoftwareBackend::new(), RenderConfig::default());
    let mut ctx = device.lock_context();
    let pattern = FrameBuffer::test_pattern(24, 16);
    let center = [13.3, 7.7];
    let expected = blurred(&pattern, Vec2::from(center), 37.0 * 0.00625, 8);

    let mut outputs = Vec::new();
    for origin in [ImageOrigin::TopLeft, ImageOrigin::BottomLeft] {
        let source = upload(&mut ctx, &pattern, origin)?;
        let target = ctx.make_texture(&TextureDesc::rgba(24, 16, origin))?;
        let mut blur = RadialBlurFilter::new(RadialBlurQuality::Draft);
        blur.set_effect(RadialBlurEffect {
            amount: 37.0,
            center,
        });
        let mut filter = EffectFilter::from(blur);
        let draw = FilterDraw::covering(&target, Rect::from_size(24.0, 16.0));
        ctx.apply_filter(&mut filter, &source, &target, draw)?;
        outputs.push(ctx.read_pixels_top_down(&target)?);
    }

    assert_eq!(outputs[0], outputs[1]);
    assert_frames_close(&outputs[0], &expected, 1);
    // Taps collapse onto one texel at the centre and spread away from it.
    assert_eq!(outputs[0].pixel(13, 7), pattern.pixel(13, 7));
    assert_ne!(outputs[0].pixel(0, 0), pattern.pixel(0, 0));
    Ok(())
}

#[test]
fn unprepared_filter_pushes_nothing() {
    let mut filter = RadialBlurFilter::new(RadialBlurQuality::Draft);
    filter.set_effect(RadialBlurEffect {
        amount: 20.0,
        center: [50.0, 12.5],
    });
    let recorder = blur_params(&mut filter, &stub_program(), ImageOrigin::TopLeft);
    assert!(recorder.calls.is_empty());
}

fn stub_program() -> Program {
    let mosaic = MosaicFilter::new(MosaicEffect::default());
    let mut backend = SoftwareBackend::new();
    Program::link(
        &mut backend as &mut dyn GpuBackend,
        filter_recipe(&mosaic),
        &build_filter_program(&mosaic),
    )
    .expect("mosaic program links")
}

#[test]
fn sharp_mosaic_with_one_block_per_pixel_is_identity() -> anyhow::Result<()> {
    let (device, _) = software_device(SoftwareBackend::new(), RenderConfig::default());
    let mut ctx = device.lock_context();
    let pattern = FrameBuffer::test_pattern(16, 8);
    for origin in [ImageOrigin::TopLeft, ImageOrigin::BottomLeft] {
        let source = upload(&mut ctx, &pattern, origin)?;
        let target = ctx.make_texture(&TextureDesc::rgba(16, 8, origin))?;
        let mut filter = EffectFilter::from(MosaicFilter::new(MosaicEffect {
            horizontal_blocks: 16.0,
            vertical_blocks: 8.0,
            sharp_colors: true,
        }));
        let draw = FilterDraw::covering(&target, Rect::from_size(16.0, 8.0));
        ctx.apply_filter(&mut filter, &source, &target, draw)?;
        assert_frames_close(&ctx.read_pixels_top_down(&target)?, &pattern, 0);
    }
    Ok(())
}

#[test]
fn filter_reprepares_after_context_loss() -> anyhow::Result<()> {
    let (device, _) = software_device(SoftwareBackend::new(), RenderConfig::default());
    let mut ctx = device.lock_context();
    let source = upload(&mut ctx, &FrameBuffer::test_pattern(8, 8), ImageOrigin::TopLeft)?;
    let target = ctx.make_texture(&TextureDesc::rgba(8, 8, ImageOrigin::TopLeft))?;
    let mut filter = EffectFilter::from(RadialBlurFilter::new(RadialBlurQuality::Draft));
    let draw = FilterDraw::covering(&target, Rect::from_size(8.0, 8.0));

    ctx.apply_filter(&mut filter, &source, &target, draw)?;
    let before = filter.prepared_generation();
    ctx.on_context_lost();
    let report = ctx.apply_filter(&mut filter, &source, &target, draw)?;
    assert!(report.program_built);
    assert_eq!(report.uniform_uploads, 4);
    assert_ne!(filter.prepared_generation(), before);
    assert_eq!(ctx.stats().filter_programs, 1);
    Ok(())
}

//! Blend compositing end to end, across image origins.

use motif_core::color::{quantize, unit};
use motif_core::{Color, FrameBuffer, ImageOrigin, Rect, Vec2};
use motif_gpu::{
    blend, BlendMode, CopyMethod, DrawOp, DstReadOutcome, EllipseGeometry, FragmentStage,
    GeometryProcessor, PathGeometry, RectGeometry, RenderConfig, SkipReason, SoftwareBackend,
};

use crate::common::{
    assert_frames_close, image_layer, layer_image, reference, software_device, translucent_image,
    upload,
};

const SIZE: u32 = 400;

/// Multiply `image` over the full surface and read the result top-down.
fn multiply_full(
    surface_origin: ImageOrigin,
    image_origin: ImageOrigin,
    background: &FrameBuffer,
    image: &FrameBuffer,
) -> anyhow::Result<(FrameBuffer, DstReadOutcome)> {
    let (device, _) = software_device(SoftwareBackend::new(), RenderConfig::default());
    let mut ctx = device.lock_context();
    let surface = upload(&mut ctx, background, surface_origin)?;
    let texture = upload(&mut ctx, image, image_origin)?;
    let bounds = Rect::from_size(background.width as f32, background.height as f32);
    let report = ctx.draw(&surface, &image_layer(texture, bounds, BlendMode::Multiply))?;
    Ok((ctx.read_pixels_top_down(&surface)?, report.dst_read))
}

#[test]
fn multiply_layer_matches_reference_on_both_origins() -> anyhow::Result<()> {
    let background = FrameBuffer::test_pattern(SIZE, SIZE);
    let image = layer_image(SIZE, SIZE, 0.5);
    let expected = reference(&background, &image, 0, 0, BlendMode::Multiply);

    let (bottom_left, outcome) =
        multiply_full(ImageOrigin::BottomLeft, ImageOrigin::TopLeft, &background, &image)?;
    assert!(matches!(outcome, DstReadOutcome::Used { .. }));
    assert_frames_close(&bottom_left, &expected, 1);

    // Replacement image of the opposite origin on a top-left surface.
    let (top_left, _) =
        multiply_full(ImageOrigin::TopLeft, ImageOrigin::BottomLeft, &background, &image)?;
    assert_frames_close(&top_left, &expected, 1);
    assert_eq!(top_left, bottom_left);
    Ok(())
}

#[test]
fn origins_render_identically() -> anyhow::Result<()> {
    let background = FrameBuffer::test_pattern(64, 48);
    let image = translucent_image(20, 12);
    let rect = Rect::new(7.0, 9.0, 20.0, 12.0);

    let mut outputs = Vec::new();
    for origin in [ImageOrigin::TopLeft, ImageOrigin::BottomLeft] {
        let (device, _) = software_device(SoftwareBackend::new(), RenderConfig::default());
        let mut ctx = device.lock_context();
        let surface = upload(&mut ctx, &background, origin)?;
        let texture = upload(&mut ctx, &image, origin)?;
        for mode in [BlendMode::SrcOver, BlendMode::Screen, BlendMode::Hue] {
            ctx.draw(&surface, &image_layer(texture, rect, mode))?;
        }
        outputs.push(ctx.read_pixels_top_down(&surface)?);
    }
    assert_eq!(outputs[0], outputs[1]);
    Ok(())
}

#[test]
fn every_blend_mode_matches_its_formula() -> anyhow::Result<()> {
    let background = FrameBuffer::test_pattern(16, 16);
    let image = translucent_image(16, 16);
    let bounds = Rect::from_size(16.0, 16.0);

    for mode in BlendMode::ALL {
        let (device, _) = software_device(SoftwareBackend::new(), RenderConfig::default());
        let mut ctx = device.lock_context();
        let surface = upload(&mut ctx, &background, ImageOrigin::TopLeft)?;
        let texture = upload(&mut ctx, &image, ImageOrigin::TopLeft)?;
        let report = ctx.draw(&surface, &image_layer(texture, bounds, mode))?;
        let reads_dst = mode.coefficients().is_none();
        assert_eq!(
            matches!(report.dst_read, DstReadOutcome::Used { .. }),
            reads_dst,
            "{mode:?}"
        );
        let expected = reference(&background, &image, 0, 0, mode);
        assert_frames_close(&ctx.read_pixels_top_down(&surface)?, &expected, 1);
    }
    Ok(())
}

#[test]
fn copy_dst_texture_bottom_left() -> anyhow::Result<()> {
    let background = FrameBuffer::test_pattern(64, 64);
    let image = layer_image(24, 16, 0.25);
    let (device, _) = software_device(SoftwareBackend::new(), RenderConfig::default());
    let mut ctx = device.lock_context();
    let surface = upload(&mut ctx, &background, ImageOrigin::BottomLeft)?;
    let texture = upload(&mut ctx, &image, ImageOrigin::TopLeft)?;

    let report = ctx.draw(
        &surface,
        &image_layer(texture, Rect::new(10.0, 20.0, 24.0, 16.0), BlendMode::Difference),
    )?;
    match report.dst_read {
        DstReadOutcome::Used { region, method } => {
            assert_eq!(method, CopyMethod::Direct);
            assert_eq!((region.width(), region.height()), (24, 16));
        }
        other => panic!("expected a snapshot, got {other:?}"),
    }
    let expected = reference(&background, &image, 10, 20, BlendMode::Difference);
    assert_frames_close(&ctx.read_pixels_top_down(&surface)?, &expected, 1);
    Ok(())
}

#[test]
fn texture_bottom_left_on_top_left_surface() -> anyhow::Result<()> {
    let background = FrameBuffer::test_pattern(48, 48);
    let image = layer_image(48, 48, 0.75);
    let (device, _) = software_device(SoftwareBackend::new(), RenderConfig::default());
    let mut ctx = device.lock_context();
    let surface = upload(&mut ctx, &background, ImageOrigin::TopLeft)?;
    let texture = upload(&mut ctx, &image, ImageOrigin::BottomLeft)?;

    ctx.draw(
        &surface,
        &image_layer(texture, Rect::from_size(48.0, 48.0), BlendMode::Overlay),
    )?;
    let expected = reference(&background, &image, 0, 0, BlendMode::Overlay);
    assert_frames_close(&ctx.read_pixels_top_down(&surface)?, &expected, 1);
    Ok(())
}

#[test]
fn both_bottom_left_with_translated_half_size_image() -> anyhow::Result<()> {
    let background = FrameBuffer::test_pattern(SIZE, SIZE);
    let image = layer_image(SIZE / 2, SIZE / 2, 0.5);
    let (x0, y0) = (SIZE / 10, SIZE / 5);
    let (device, _) = software_device(SoftwareBackend::new(), RenderConfig::default());
    let mut ctx = device.lock_context();
    let surface = upload(&mut ctx, &background, ImageOrigin::BottomLeft)?;
    let texture = upload(&mut ctx, &image, ImageOrigin::BottomLeft)?;

    let rect = Rect::new(x0 as f32, y0 as f32, image.width as f32, image.height as f32);
    ctx.draw(&surface, &image_layer(texture, rect, BlendMode::Multiply))?;
    let expected = reference(&background, &image, x0, y0, BlendMode::Multiply);
    assert_frames_close(&ctx.read_pixels_top_down(&surface)?, &expected, 1);
    Ok(())
}

#[test]
fn draw_copy_matches_direct_copy() -> anyhow::Result<()> {
    let background = FrameBuffer::test_pattern(64, 64);
    let image = translucent_image(30, 20);
    let rect = Rect::new(5.0, 33.0, 30.0, 20.0);

    let mut outputs = Vec::new();
    for (backend, expected_method) in [
        (SoftwareBackend::new(), CopyMethod::Direct),
        (SoftwareBackend::without_framebuffer_copy(), CopyMethod::Draw),
    ] {
        let (device, _) = software_device(backend, RenderConfig::default());
        let mut ctx = device.lock_context();
        let surface = upload(&mut ctx, &background, ImageOrigin::BottomLeft)?;
        let texture = upload(&mut ctx, &image, ImageOrigin::TopLeft)?;
        let report = ctx.draw(&surface, &image_layer(texture, rect, BlendMode::ColorBurn))?;
        match report.dst_read {
            DstReadOutcome::Used { method, .. } => assert_eq!(method, expected_method),
            other => panic!("expected a snapshot, got {other:?}"),
        }
        outputs.push(ctx.read_pixels_top_down(&surface)?);
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_frames_close(
        &outputs[0],
        &reference(&background, &image, 5, 33, BlendMode::ColorBurn),
        1,
    );
    Ok(())
}

#[test]
fn forced_draw_copy_config_matches_reference() -> anyhow::Result<()> {
    let config = RenderConfig::from_json(r#"{"dst_copy": "force_draw"}"#)?;
    let background = FrameBuffer::test_pattern(32, 32);
    let image = translucent_image(32, 32);
    let (device, _) = software_device(SoftwareBackend::new(), config);
    let mut ctx = device.lock_context();
    let surface = upload(&mut ctx, &background, ImageOrigin::TopLeft)?;
    let texture = upload(&mut ctx, &image, ImageOrigin::BottomLeft)?;

    let report = ctx.draw(
        &surface,
        &image_layer(texture, Rect::from_size(32.0, 32.0), BlendMode::SoftLight),
    )?;
    assert!(matches!(
        report.dst_read,
        DstReadOutcome::Used {
            method: CopyMethod::Draw,
            ..
        }
    ));
    let expected = reference(&background, &image, 0, 0, BlendMode::SoftLight);
    assert_frames_close(&ctx.read_pixels_top_down(&surface)?, &expected, 1);
    Ok(())
}

#[test]
fn failed_snapshot_falls_back_to_source_over() -> anyhow::Result<()> {
    let background = FrameBuffer::test_pattern(32, 32);
    let image = translucent_image(16, 16);
    let rect = Rect::new(8.0, 8.0, 16.0, 16.0);

    let (device, monitor) = software_device(SoftwareBackend::new(), RenderConfig::default());
    let fallback = {
        let mut ctx = device.lock_context();
        let surface = upload(&mut ctx, &background, ImageOrigin::BottomLeft)?;
        let texture = upload(&mut ctx, &image, ImageOrigin::TopLeft)?;
        monitor.set_fail_allocations(true);
        let report = ctx.draw(&surface, &image_layer(texture, rect, BlendMode::Multiply))?;
        assert!(matches!(
            report.dst_read,
            DstReadOutcome::Skipped(SkipReason::AllocationFailed(_))
        ));
        ctx.read_pixels_top_down(&surface)?
    };

    let (device, _) = software_device(SoftwareBackend::new(), RenderConfig::default());
    let mut ctx = device.lock_context();
    let surface = upload(&mut ctx, &background, ImageOrigin::BottomLeft)?;
    let texture = upload(&mut ctx, &image, ImageOrigin::TopLeft)?;
    ctx.draw(&surface, &image_layer(texture, rect, BlendMode::SrcOver))?;
    assert_eq!(fallback, ctx.read_pixels_top_down(&surface)?);
    Ok(())
}

#[test]
fn snapshots_reuse_pooled_textures() -> anyhow::Result<()> {
    let background = FrameBuffer::test_pattern(32, 32);
    let image = translucent_image(16, 16);
    let (device, monitor) = software_device(SoftwareBackend::new(), RenderConfig::default());
    let mut ctx = device.lock_context();
    let surface = upload(&mut ctx, &background, ImageOrigin::TopLeft)?;
    let texture = upload(&mut ctx, &image, ImageOrigin::TopLeft)?;
    let op = image_layer(texture, Rect::new(4.0, 4.0, 16.0, 16.0), BlendMode::Exclusion);

    ctx.draw(&surface, &op)?;
    let created = monitor.textures_created();
    ctx.draw(&surface, &op)?;
    let stats = ctx.stats();
    assert_eq!(stats.snapshots, 2);
    assert_eq!((stats.pool_hits, stats.pool_misses), (1, 1));
    assert_eq!(monitor.textures_created(), created);
    assert_eq!(ctx.texture_pool().texture_count(), 1);

    ctx.purge_texture_pool();
    assert_eq!(ctx.texture_pool().texture_count(), 0);
    Ok(())
}

/// Coefficient modes whose destination factor depends on the source.
const COVERAGE_SENSITIVE: [BlendMode; 7] = [
    BlendMode::Clear,
    BlendMode::Src,
    BlendMode::SrcIn,
    BlendMode::DstIn,
    BlendMode::SrcOut,
    BlendMode::DstATop,
    BlendMode::Modulate,
];

#[test]
fn antialiased_ellipse_keeps_uncovered_pixels() -> anyhow::Result<()> {
    let background = FrameBuffer::test_pattern(32, 32);
    let color = Color::from_array([0.4, 0.2, 0.1, 0.5]);
    let ellipse = GeometryProcessor::Ellipse(EllipseGeometry::new(
        Rect::new(4.0, 4.0, 24.0, 24.0),
        color,
    ));

    for origin in [ImageOrigin::TopLeft, ImageOrigin::BottomLeft] {
        for mode in COVERAGE_SENSITIVE {
            let (device, _) = software_device(SoftwareBackend::new(), RenderConfig::default());
            let mut ctx = device.lock_context();
            let surface = upload(&mut ctx, &background, origin)?;
            let op = DrawOp::new(ellipse.clone(), FragmentStage::Color).with_blend(mode);
            let report = ctx.draw(&surface, &op)?;
            assert!(
                matches!(report.dst_read, DstReadOutcome::Used { .. }),
                "{mode:?} on {origin:?}"
            );

            let out = ctx.read_pixels_top_down(&surface)?;
            for (x, y) in [(3, 3), (4, 4), (27, 4), (4, 27), (27, 27), (28, 28)] {
                assert_eq!(
                    out.pixel(x, y),
                    background.pixel(x, y),
                    "{mode:?} on {origin:?} at ({x}, {y})"
                );
            }
            let d = background.pixel(16, 16).map(unit);
            let expected = blend(mode, color.to_array(), d).map(quantize);
            let center = out.pixel(16, 16);
            assert!(
                center.iter().zip(expected).all(|(a, e)| a.abs_diff(e) <= 1),
                "{mode:?} on {origin:?}: got {center:?}, expected {expected:?}"
            );
        }
    }
    Ok(())
}

#[test]
fn partial_path_coverage_interpolates_toward_destination() -> anyhow::Result<()> {
    let background = FrameBuffer::test_pattern(32, 32);
    let color = Color::from_array([0.6, 0.3, 0.0, 0.75]);
    let corners = [
        Vec2::new(4.0, 4.0),
        Vec2::new(28.0, 4.0),
        Vec2::new(28.0, 28.0),
        Vec2::new(4.0, 28.0),
    ];
    let path = PathGeometry::convex_polygon(&corners, color)?.with_coverage(vec![0.5; 6])?;

    for mode in COVERAGE_SENSITIVE {
        let (device, _) = software_device(SoftwareBackend::new(), RenderConfig::default());
        let mut ctx = device.lock_context();
        let surface = upload(&mut ctx, &background, ImageOrigin::BottomLeft)?;
        let op = DrawOp::new(GeometryProcessor::Path(path.clone()), FragmentStage::Color)
            .with_blend(mode);
        ctx.draw(&surface, &op)?;

        let mut expected = background.clone();
        for y in 4..28 {
            for x in 4..28 {
                let d = background.pixel(x, y).map(unit);
                let full = blend(mode, color.to_array(), d);
                let lerp: [f32; 4] = std::array::from_fn(|c| 0.5 * full[c] + 0.5 * d[c]);
                expected.set_pixel(x, y, lerp.map(quantize));
            }
        }
        assert_frames_close(&ctx.read_pixels_top_down(&surface)?, &expected, 1);
    }
    Ok(())
}

#[test]
fn off_target_dst_read_is_skipped() -> anyhow::Result<()> {
    let background = FrameBuffer::test_pattern(32, 32);
    let (device, monitor) = software_device(SoftwareBackend::new(), RenderConfig::default());
    let mut ctx = device.lock_context();
    let surface = upload(&mut ctx, &background, ImageOrigin::BottomLeft)?;
    let created = monitor.textures_created();

    for rect in [Rect::new(100.0, 100.0, 10.0, 10.0), Rect::new(8.0, 8.0, 0.0, 0.0)] {
        let op = DrawOp::new(
            GeometryProcessor::Rect(RectGeometry::new(rect, Color::RED)),
            FragmentStage::Color,
        )
        .with_blend(BlendMode::Multiply);
        let report = ctx.draw(&surface, &op)?;
        assert_eq!(report.dst_read, DstReadOutcome::Skipped(SkipReason::EmptyRegion));
    }

    assert_eq!(ctx.read_pixels_top_down(&surface)?, background);
    assert_eq!(monitor.textures_created(), created);
    let stats = ctx.stats();
    assert_eq!((stats.snapshots, stats.pool_hits, stats.pool_misses), (0, 0, 0));
    assert_eq!(ctx.texture_pool().texture_count(), 0);
    Ok(())
}

#[test]
fn far_off_target_geometry_fills_the_surface() -> anyhow::Result<()> {
    let (device, _) = software_device(SoftwareBackend::new(), RenderConfig::default());
    let mut ctx = device.lock_context();
    let surface = upload(&mut ctx, &FrameBuffer::new(8, 8), ImageOrigin::TopLeft)?;
    let op = DrawOp::new(
        GeometryProcessor::Rect(RectGeometry::new(
            Rect::new(-1e9, -1e9, 2e9, 2e9),
            Color::WHITE,
        )),
        FragmentStage::Color,
    );
    ctx.draw(&surface, &op)?;

    let out = ctx.read_pixels_top_down(&surface)?;
    for y in 0..8 {
        for x in 0..8 {
            assert_eq!(out.pixel(x, y), [255; 4], "pixel ({x}, {y})");
        }
    }
    Ok(())
}

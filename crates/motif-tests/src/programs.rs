//! Program reuse, upload elision and cache resets.

use motif_core::{Color, ImageOrigin, Matrix, Rect};
use motif_gpu::{
    DrawOp, EllipseGeometry, FragmentStage, GeometryProcessor, RectGeometry, RenderConfig,
    SoftwareBackend, TextureDesc,
};

use crate::common::software_device;

fn rect(color: Color, matrix: Matrix) -> DrawOp {
    DrawOp::new(
        GeometryProcessor::Rect(
            RectGeometry::new(Rect::new(4.0, 4.0, 16.0, 8.0), color).with_matrix(matrix),
        ),
        FragmentStage::Color,
    )
}

#[test]
fn same_shape_shares_one_program() -> anyhow::Result<()> {
    let (device, monitor) = software_device(SoftwareBackend::new(), RenderConfig::default());
    let mut ctx = device.lock_context();
    let target = ctx.make_texture(&TextureDesc::rgba(32, 32, ImageOrigin::TopLeft))?;

    let first = ctx.draw(&target, &rect(Color::RED, Matrix::IDENTITY))?;
    let second = ctx.draw(&target, &rect(Color::BLUE, Matrix::translate(3.0, 5.0)))?;
    assert!(first.program_built);
    assert!(!second.program_built);
    assert_eq!(ctx.stats().geometry_programs, 1);
    assert_eq!(monitor.programs_created(), 1);

    let ellipse = DrawOp::new(
        GeometryProcessor::Ellipse(EllipseGeometry::new(
            Rect::new(2.0, 2.0, 10.0, 10.0),
            Color::GREEN,
        )),
        FragmentStage::Color,
    );
    assert!(ctx.draw(&target, &ellipse)?.program_built);
    assert_eq!(ctx.stats().geometry_programs, 2);
    Ok(())
}

#[test]
fn unchanged_frame_uploads_nothing() -> anyhow::Result<()> {
    let (device, monitor) = software_device(SoftwareBackend::new(), RenderConfig::default());
    let mut ctx = device.lock_context();
    let target = ctx.make_texture(&TextureDesc::rgba(32, 32, ImageOrigin::TopLeft))?;
    let op = rect(Color::RED, Matrix::IDENTITY);

    assert_eq!(ctx.draw(&target, &op)?.uniform_uploads, 2);
    let uploads_after_first = monitor.uniform_uploads();
    assert_eq!(ctx.draw(&target, &op)?.uniform_uploads, 0);
    assert_eq!(monitor.uniform_uploads(), uploads_after_first);
    Ok(())
}

#[test]
fn only_changed_uniform_is_uploaded() -> anyhow::Result<()> {
    let (device, _) = software_device(SoftwareBackend::new(), RenderConfig::default());
    let mut ctx = device.lock_context();
    let small = ctx.make_texture(&TextureDesc::rgba(32, 32, ImageOrigin::TopLeft))?;
    let large = ctx.make_texture(&TextureDesc::rgba(64, 32, ImageOrigin::TopLeft))?;

    ctx.draw(&small, &rect(Color::RED, Matrix::IDENTITY))?;
    // View matrix only.
    let moved = ctx.draw(&small, &rect(Color::RED, Matrix::translate(1.0, 0.0)))?;
    assert_eq!(moved.uniform_uploads, 1);
    // Target dimensions only.
    let resized = ctx.draw(&large, &rect(Color::RED, Matrix::translate(1.0, 0.0)))?;
    assert_eq!(resized.uniform_uploads, 1);
    // Target origin counts as a target change too.
    let flipped_target = ctx.make_texture(&TextureDesc::rgba(64, 32, ImageOrigin::BottomLeft))?;
    let flipped = ctx.draw(&flipped_target, &rect(Color::RED, Matrix::translate(1.0, 0.0)))?;
    assert_eq!(flipped.uniform_uploads, 1);
    Ok(())
}

#[test]
fn context_loss_resets_upload_cache() -> anyhow::Result<()> {
    let (device, monitor) = software_device(SoftwareBackend::new(), RenderConfig::default());
    let mut ctx = device.lock_context();
    let target = ctx.make_texture(&TextureDesc::rgba(32, 32, ImageOrigin::TopLeft))?;
    let op = rect(Color::RED, Matrix::IDENTITY);

    ctx.draw(&target, &op)?;
    ctx.on_context_lost();
    let report = ctx.draw(&target, &op)?;
    assert!(report.program_built);
    assert_eq!(report.uniform_uploads, 2);
    assert_eq!(monitor.programs_created(), 2);
    assert_eq!(ctx.stats().epoch, 1);
    Ok(())
}

#[test]
fn purge_rebuilds_and_pushes_everything() -> anyhow::Result<()> {
    let (device, _) = software_device(SoftwareBackend::new(), RenderConfig::default());
    let mut ctx = device.lock_context();
    let target = ctx.make_texture(&TextureDesc::rgba(32, 32, ImageOrigin::TopLeft))?;
    let op = rect(Color::RED, Matrix::IDENTITY);

    ctx.draw(&target, &op)?;
    ctx.purge_programs();
    assert_eq!(ctx.stats().geometry_programs, 0);
    let report = ctx.draw(&target, &op)?;
    assert!(report.program_built);
    assert_eq!(report.uniform_uploads, 2);
    assert_eq!(ctx.draw(&target, &op)?.uniform_uploads, 0);
    Ok(())
}

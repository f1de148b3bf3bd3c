//! Shared fixtures for the integration tests.

use std::sync::{Arc, Once};

use motif_core::color::{quantize, unit};
use motif_core::{Color, FrameBuffer, ImageOrigin, Rect};
use motif_gpu::{
    blend, BackendTexture, BlendMode, Context, Device, DrawOp, FragmentStage, GeometryProcessor,
    RectGeometry, RenderConfig, SoftwareBackend, SoftwareMonitor, TextureDesc, TextureSampler,
};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Route `tracing` output to the test harness. `RUST_LOG` selects levels.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A software device plus the monitor of its backend.
pub fn software_device(
    backend: SoftwareBackend,
    config: RenderConfig,
) -> (Device, Arc<SoftwareMonitor>) {
    init_tracing();
    let monitor = backend.monitor();
    (Device::new(Box::new(backend), config), monitor)
}

/// Opaque frame whose content depends on `progress`, standing in for a
/// layer image sampled from the timeline.
pub fn layer_image(width: u32, height: u32, progress: f32) -> FrameBuffer {
    let shift = (progress * width as f32) as u32;
    let mut frame = FrameBuffer::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let r = (((x + shift) * 255) / width.max(1)) as u8;
            let g = ((y * 255) / height.max(1)) as u8;
            let b = (((x ^ y) * 37) % 256) as u8;
            frame.set_pixel(x, y, [r, g, b, 255]);
        }
    }
    frame
}

/// Premultiplied frame at 75% alpha.
pub fn translucent_image(width: u32, height: u32) -> FrameBuffer {
    let mut frame = FrameBuffer::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let r = ((x * 191) / width.max(1)) as u8;
            let g = ((y * 191) / height.max(1)) as u8;
            let b = (((x + y) * 23) % 192) as u8;
            frame.set_pixel(x, y, [r, g, b, 191]);
        }
    }
    frame
}

/// A texture holding the top-down `pixels`.
pub fn upload(
    ctx: &mut Context,
    pixels: &FrameBuffer,
    origin: ImageOrigin,
) -> anyhow::Result<BackendTexture> {
    let texture = ctx.make_texture(&TextureDesc::rgba(pixels.width, pixels.height, origin))?;
    ctx.write_pixels_top_down(&texture, pixels)?;
    Ok(texture)
}

/// Draw `image` stretched over `rect` with `mode`.
pub fn image_layer(image: BackendTexture, rect: Rect, mode: BlendMode) -> DrawOp {
    DrawOp::new(
        GeometryProcessor::Rect(RectGeometry::new(rect, Color::WHITE).with_local_rect(rect)),
        FragmentStage::Texture(TextureSampler::fill(image, rect)),
    )
    .with_blend(mode)
}

/// Expected top-down result of blending `src` over the area of `dst` at
/// (`x0`, `y0`).
pub fn reference(
    dst: &FrameBuffer,
    src: &FrameBuffer,
    x0: u32,
    y0: u32,
    mode: BlendMode,
) -> FrameBuffer {
    let mut out = dst.clone();
    for y in 0..src.height {
        for x in 0..src.width {
            let (dx, dy) = (x + x0, y + y0);
            let s = src.pixel(x, y).map(unit);
            let d = dst.pixel(dx, dy).map(unit);
            out.set_pixel(dx, dy, blend(mode, s, d).map(quantize));
        }
    }
    out
}

/// Assert two frames agree within `tolerance` per channel.
pub fn assert_frames_close(actual: &FrameBuffer, expected: &FrameBuffer, tolerance: u8) {
    assert_eq!(
        (actual.width, actual.height),
        (expected.width, expected.height),
        "frame sizes differ"
    );
    for y in 0..actual.height {
        for x in 0..actual.width {
            let a = actual.pixel(x, y);
            let e = expected.pixel(x, y);
            let close = a.iter().zip(e).all(|(a, e)| a.abs_diff(e) <= tolerance);
            assert!(close, "pixel ({x}, {y}): got {a:?}, expected {e:?}");
        }
    }
}

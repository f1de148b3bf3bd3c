//! Exclusive access to a device's context.

use std::sync::mpsc;
use std::thread;

use motif_core::{Color, ImageOrigin, Rect};
use motif_gpu::{
    CancelFlag, DrawOp, FragmentStage, GeometryProcessor, RectGeometry, RenderConfig,
    SoftwareBackend, TextureDesc,
};

use crate::common::software_device;

#[test]
fn context_is_exclusive_across_threads() {
    let (device, _) = software_device(SoftwareBackend::new(), RenderConfig::default());
    let guard = device.lock_context();
    thread::scope(|s| {
        let busy = s.spawn(|| device.try_lock_context().is_none());
        assert!(busy.join().unwrap_or(false));
    });
    drop(guard);
    thread::scope(|s| {
        let free = s.spawn(|| device.try_lock_context().is_some());
        assert!(free.join().unwrap_or(false));
    });
}

#[test]
fn waiting_thread_draws_after_release() -> anyhow::Result<()> {
    let (device, monitor) = software_device(SoftwareBackend::new(), RenderConfig::default());
    let target = device
        .lock_context()
        .make_texture(&TextureDesc::rgba(8, 8, ImageOrigin::TopLeft))?;
    let (started, wait_started) = mpsc::channel();

    let guard = device.lock_context();
    thread::scope(|s| {
        let worker = s.spawn(|| {
            let _ = started.send(());
            let mut ctx = device.lock_context();
            let op = DrawOp::new(
                GeometryProcessor::Rect(RectGeometry::new(Rect::from_size(8.0, 8.0), Color::RED)),
                FragmentStage::Color,
            );
            ctx.draw_all(&target, &[op], &CancelFlag::new())
                .map(|report| report.draws.len())
        });
        let _ = wait_started.recv();
        assert_eq!(monitor.draws(), 0);
        drop(guard);
        let drawn = worker.join().map_err(|_| anyhow::anyhow!("worker panicked"))??;
        assert_eq!(drawn, 1);
        Ok::<_, anyhow::Error>(())
    })?;
    assert_eq!(monitor.draws(), 1);
    Ok(())
}

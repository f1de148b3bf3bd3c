//! Draw descriptions and per-draw reports.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::blend::BlendMode;
use crate::compositor::DstReadOutcome;
use crate::fragment::FragmentStage;
use crate::processor::GeometryProcessor;

/// Interleaved vertex data, three vertices per triangle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    /// Floats per vertex.
    pub stride: usize,
    pub vertices: Vec<f32>,
}

impl Mesh {
    pub fn new(stride: usize) -> Self {
        Self {
            stride,
            vertices: Vec::new(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        if self.stride == 0 {
            0
        } else {
            self.vertices.len() / self.stride
        }
    }

    pub fn vertex(&self, index: usize) -> &[f32] {
        &self.vertices[index * self.stride..(index + 1) * self.stride]
    }
}

/// One draw: what to cover, how to shade it and how to blend it.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawOp {
    pub geometry: GeometryProcessor,
    pub fragment: FragmentStage,
    pub blend: BlendMode,
}

impl DrawOp {
    pub fn new(geometry: GeometryProcessor, fragment: FragmentStage) -> Self {
        Self {
            geometry,
            fragment,
            blend: BlendMode::SrcOver,
        }
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }
}

/// What happened during one draw.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawReport {
    /// The program was linked for this draw.
    pub program_built: bool,
    /// Uniform values that reached the backend.
    pub uniform_uploads: usize,
    pub dst_read: DstReadOutcome,
}

/// Summary of [`crate::Context::draw_all`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    pub draws: Vec<DrawReport>,
    /// The frame stopped early because the flag was raised.
    pub cancelled: bool,
}

/// Cooperative cancellation checked between draws.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

//! Motif GPU - shader program management and blend compositing
//!
//! Draws are described by a geometry processor, a fragment stage and a
//! blend mode. Programs are generated from the configuration shape of a
//! draw and cached; uniform values are pushed per draw with redundant
//! uploads elided. Blend modes the fixed-function hardware cannot express
//! read the destination through a snapshot taken before the draw.
//!
//! Two backends implement [`GpuBackend`]: [`WgpuBackend`] on real hardware
//! and [`SoftwareBackend`], a CPU rasteriser used headless and in tests.

pub mod backend;
pub mod blend;
pub mod builder;
pub mod compositor;
pub mod config;
pub mod context;
pub mod draw;
pub mod filter;
pub mod fragment;
pub mod processor;
pub mod program;
pub mod software;
pub mod texture;
pub mod texture_pool;
pub mod uniform;
pub mod wgpu_backend;
pub mod xfer;

pub use backend::{BackendCaps, DrawCommand, GpuBackend};
pub use blend::{blend, BlendCoefficients, BlendDescriptor, BlendFactor, BlendMode};
pub use compositor::{BlendCompositor, CopyMethod, DstReadOutcome, DstReadState, SkipReason};
pub use config::{DstCopyStrategy, RenderConfig};
pub use context::{Context, ContextGuard, ContextStats, Device, FilterDraw};
pub use draw::{CancelFlag, DrawOp, DrawReport, FrameReport, Mesh};
pub use filter::{FilterContext, FilterKernel, FragmentShader, LayerFilter, TextureSource};
pub use fragment::{CoordTransform, FragmentStage, TextureSampler};
pub use processor::{
    EllipseGeometry, GeometryProcessor, GeometryShape, PathGeometry, RectGeometry, TargetInfo,
};
pub use program::{KeyBuilder, Program, ProgramCache, ProgramId, ShaderRecipe};
pub use software::{SoftwareBackend, SoftwareMonitor};
pub use texture::{BackendTexture, TextureDesc, TextureId};
pub use texture_pool::TexturePool;
pub use uniform::{
    ProgramDataManager, UniformDecl, UniformHandle, UniformType, UniformUploader, UniformValue,
    UniformValues,
};
pub use wgpu_backend::WgpuBackend;

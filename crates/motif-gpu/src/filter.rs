//! Layer-filter framework.
//!
//! A [`LayerFilter`] contributes the fragment shader of a full-surface
//! effect pass. The framework owns the shared vertex stage, which maps a
//! unit quad onto the destination rectangle and into the input texture
//! through two matrices pushed on every draw.

use std::fmt::{self, Write};
use std::sync::Arc;

use motif_core::{Matrix, Rect, Vec2};

use crate::builder::uniform_block;
use crate::draw::Mesh;
use crate::processor::{TargetInfo, POSITION};
use crate::program::{
    KeyBuilder, Program, ProgramKernel, ProgramSource, SamplerBindings, ShaderRecipe,
};
use crate::texture::BackendTexture;
use crate::uniform::{ProgramDataManager, UniformDecl, UniformHandle, UniformType, UniformValues};

/// Sampling access to a filter's input, in normalized memory coordinates.
pub trait TextureSource: Sync {
    fn sample(&self, uv: Vec2) -> [f32; 4];

    fn size(&self) -> (u32, u32);
}

/// CPU evaluation of a filter's fragment shader.
pub trait FilterKernel: Send + Sync + fmt::Debug {
    fn shade(&self, uniforms: &UniformValues<'_>, input: &dyn TextureSource, uv: Vec2) -> [f32; 4];
}

/// Fragment stage of a filter program.
#[derive(Debug, Clone)]
pub struct FragmentShader {
    /// WGSL defining `fs_main(in: VertexOutput)`. May read `in.tex_coord`,
    /// `input_texture`, `texture_sampler` and the declared uniforms as
    /// `u.<name>`.
    pub code: String,
    pub uniforms: Vec<UniformDecl>,
    pub kernel: Arc<dyn FilterKernel>,
}

/// Per-draw access handed to [`LayerFilter::on_update_params`].
pub struct FilterContext<'a, 'b> {
    pdm: &'a mut ProgramDataManager<'b>,
    input: BackendTexture,
}

impl<'a, 'b> FilterContext<'a, 'b> {
    pub fn new(pdm: &'a mut ProgramDataManager<'b>, input: BackendTexture) -> Self {
        Self { pdm, input }
    }

    pub fn pdm(&mut self) -> &mut ProgramDataManager<'b> {
        self.pdm
    }

    pub fn input(&self) -> &BackendTexture {
        &self.input
    }

    /// Normalized memory coordinates of the input texel showing `point`,
    /// given that the input holds `content_bounds` stretched over it.
    pub fn content_to_texture(&self, point: Vec2, content_bounds: Rect) -> Vec2 {
        let relative = (point - content_bounds.min()) / content_bounds.size();
        self.input.origin.normalized_matrix().map_point(relative)
    }
}

/// A full-surface effect with its own fragment shader.
pub trait LayerFilter {
    fn name(&self) -> &'static str;

    /// Configuration shape only; runtime parameters never enter the key.
    fn compute_key(&self, key: &mut KeyBuilder);

    fn on_build_fragment_shader(&self) -> FragmentShader;

    /// Resolve uniform handles against a freshly paired program.
    fn on_prepare_program(&mut self, program: &Program);

    /// Generation of the program the handles were resolved against.
    fn prepared_generation(&self) -> Option<u64>;

    /// Push this frame's parameters. Values are pushed unconditionally.
    fn on_update_params(
        &mut self,
        ctx: &mut FilterContext<'_, '_>,
        content_bounds: Rect,
        filter_scale: Vec2,
    );
}

/// Recipe of a filter program.
pub fn filter_recipe(filter: &dyn LayerFilter) -> ShaderRecipe {
    let mut key = KeyBuilder::new();
    // Keeps filter recipes apart from geometry recipes.
    key.add(u32::MAX);
    filter.compute_key(&mut key);
    key.finish()
}

const VERTEX_STAGE: &str = "
struct VertexInput {
    @location(0) position: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let p = vec3<f32>(in.position, 1.0);
    out.clip_position = vec4<f32>((u.vertex_matrix * p).xy, 0.0, 1.0);
    out.tex_coord = (u.texture_matrix * p).xy;
    return out;
}
";

/// Combine the shared vertex stage with the filter's fragment shader.
pub fn build_filter_program(filter: &dyn LayerFilter) -> ProgramSource {
    let fragment = filter.on_build_fragment_shader();
    let mut uniforms = vec![
        UniformDecl::new("vertex_matrix", UniformType::Mat3),
        UniformDecl::new("texture_matrix", UniformType::Mat3),
    ];
    uniforms.extend(fragment.uniforms);

    let mut wgsl = uniform_block(&uniforms);
    wgsl.push_str("@group(1) @binding(0) var texture_sampler: sampler;\n");
    wgsl.push_str("@group(1) @binding(1) var input_texture: texture_2d<f32>;\n");
    wgsl.push_str(VERTEX_STAGE);
    let _ = write!(wgsl, "\n{}", fragment.code);

    ProgramSource {
        label: filter.name().to_string(),
        wgsl,
        attributes: vec![POSITION],
        uniforms,
        samplers: SamplerBindings {
            src: true,
            dst: false,
        },
        kernel: ProgramKernel::Filter(fragment.kernel),
    }
}

/// Unit quad of positions.
pub(crate) fn filter_mesh() -> Mesh {
    let mut mesh = Mesh::new(POSITION.format.components());
    let corners = [
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(1.0, 1.0),
        Vec2::new(0.0, 1.0),
    ];
    for i in [0, 1, 2, 0, 2, 3] {
        mesh.vertices.extend_from_slice(&[corners[i].x, corners[i].y]);
    }
    mesh
}

/// Maps the unit quad onto `dst_rect` of the target, in clip space.
pub fn vertex_matrix(dst_rect: Rect, target: TargetInfo) -> Matrix {
    let [sx, tx, sy, ty] = target.rt_adjust();
    Matrix::scale(dst_rect.width, dst_rect.height)
        .then(Matrix::translate(dst_rect.x, dst_rect.y))
        .then(Matrix::scale(sx, sy))
        .then(Matrix::translate(tx, ty))
}

/// Maps the unit quad onto the whole input texture.
pub fn texture_matrix(input: &BackendTexture) -> Matrix {
    input.origin.normalized_matrix()
}

/// Handles of the shared vertex-stage uniforms.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterRunner {
    vertex_matrix: UniformHandle,
    texture_matrix: UniformHandle,
}

impl FilterRunner {
    pub fn prepare(program: &Program) -> Self {
        Self {
            vertex_matrix: program.uniform("vertex_matrix"),
            texture_matrix: program.uniform("texture_matrix"),
        }
    }

    pub fn set_data(
        &self,
        pdm: &mut ProgramDataManager<'_>,
        vertex_matrix: Matrix,
        texture_matrix: Matrix,
    ) {
        pdm.set_matrix3f(self.vertex_matrix, &vertex_matrix.to_mat3());
        pdm.set_matrix3f(self.texture_matrix, &texture_matrix.to_mat3());
    }
}

/// Reusable piece for filters that declare their uniforms by name.
pub fn resolve_handles<const N: usize>(program: &Program, names: [&str; N]) -> [UniformHandle; N] {
    names.map(|name| program.uniform(name))
}

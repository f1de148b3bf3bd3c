//! Mosaic: the input averaged over a grid of blocks.

use std::sync::Arc;

use motif_core::{Rect, Vec2};
use motif_gpu::filter::{resolve_handles, FilterContext, FilterKernel, FragmentShader, LayerFilter};
use motif_gpu::uniform::{UniformDecl, UniformHandle, UniformType, UniformValues};
use motif_gpu::{KeyBuilder, Program, TextureSource};
use serde::{Deserialize, Serialize};

use crate::MOSAIC_CLASS;

/// Sample offsets inside a block used when colours are blended.
const BLOCK_SAMPLES: [[f32; 2]; 4] = [[0.25, 0.25], [0.75, 0.25], [0.25, 0.75], [0.75, 0.75]];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MosaicEffect {
    pub horizontal_blocks: f32,
    pub vertical_blocks: f32,
    /// Take the colour at the block centre instead of blending the block.
    pub sharp_colors: bool,
}

impl Default for MosaicEffect {
    fn default() -> Self {
        Self {
            horizontal_blocks: 10.0,
            vertical_blocks: 10.0,
            sharp_colors: false,
        }
    }
}

#[derive(Debug)]
struct MosaicKernel;

impl FilterKernel for MosaicKernel {
    fn shade(&self, uniforms: &UniformValues<'_>, input: &dyn TextureSource, uv: Vec2) -> [f32; 4] {
        let count = Vec2::from(uniforms.vec2("block_count")).max(Vec2::ONE);
        let cell = (uv * count).floor();
        if uniforms.float("sharp_colors") > 0.5 {
            return input.sample((cell + 0.5) / count);
        }
        let mut sum = [0.0f32; 4];
        for offset in BLOCK_SAMPLES {
            let sample = input.sample((cell + Vec2::from(offset)) / count);
            for (acc, v) in sum.iter_mut().zip(sample) {
                *acc += v;
            }
        }
        sum.map(|v| v / BLOCK_SAMPLES.len() as f32)
    }
}

const FRAGMENT: &str = "
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let count = max(u.block_count, vec2<f32>(1.0));
    let cell = floor(in.tex_coord * count);
    if (u.sharp_colors > 0.5) {
        return textureSampleLevel(input_texture, texture_sampler, (cell + 0.5) / count, 0.0);
    }
    var color = vec4<f32>(0.0);
    for (var i = 0u; i < 4u; i = i + 1u) {
        let offset = vec2<f32>(f32(i % 2u) * 0.5 + 0.25, f32(i / 2u) * 0.5 + 0.25);
        let uv = (cell + offset) / count;
        color = color + textureSampleLevel(input_texture, texture_sampler, uv, 0.0);
    }
    return color * 0.25;
}
";

#[derive(Debug, Clone, Default)]
pub struct MosaicFilter {
    effect: MosaicEffect,
    block_count: UniformHandle,
    sharp_colors: UniformHandle,
    generation: Option<u64>,
}

impl MosaicFilter {
    pub fn new(effect: MosaicEffect) -> Self {
        Self {
            effect,
            ..Default::default()
        }
    }

    pub fn effect(&self) -> &MosaicEffect {
        &self.effect
    }

    pub fn set_effect(&mut self, effect: MosaicEffect) {
        self.effect = effect;
    }
}

impl LayerFilter for MosaicFilter {
    fn name(&self) -> &'static str {
        "MosaicFilter"
    }

    fn compute_key(&self, key: &mut KeyBuilder) {
        key.add(MOSAIC_CLASS);
    }

    fn on_build_fragment_shader(&self) -> FragmentShader {
        FragmentShader {
            code: FRAGMENT.to_string(),
            uniforms: vec![
                UniformDecl::new("block_count", UniformType::Float2),
                UniformDecl::new("sharp_colors", UniformType::Float),
            ],
            kernel: Arc::new(MosaicKernel),
        }
    }

    fn on_prepare_program(&mut self, program: &Program) {
        [self.block_count, self.sharp_colors] =
            resolve_handles(program, ["block_count", "sharp_colors"]);
        self.generation = Some(program.generation());
    }

    fn prepared_generation(&self) -> Option<u64> {
        self.generation
    }

    fn on_update_params(&mut self, ctx: &mut FilterContext<'_, '_>, _: Rect, _: Vec2) {
        let pdm = ctx.pdm();
        pdm.set_2f(
            self.block_count,
            self.effect.horizontal_blocks.max(1.0),
            self.effect.vertical_blocks.max(1.0),
        );
        pdm.set_1f(self.sharp_colors, if self.effect.sharp_colors { 1.0 } else { 0.0 });
    }
}

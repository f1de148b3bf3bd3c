//! Radial (zoom) blur around an authored centre.

use std::sync::Arc;

use motif_core::{Rect, Vec2};
use motif_gpu::filter::{resolve_handles, FilterContext, FilterKernel, FragmentShader, LayerFilter};
use motif_gpu::uniform::{UniformDecl, UniformHandle, UniformType, UniformValues};
use motif_gpu::{KeyBuilder, Program, TextureSource};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::RADIAL_BLUR_CLASS;

/// Authored amount is scaled by this before reaching the shader.
const AMOUNT_SCALE: f32 = 0.00625;
const MAX_AMOUNT: f32 = 0.25;

/// Sampling quality. Changes the compiled program, not a uniform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RadialBlurQuality {
    #[default]
    Draft,
    Best,
}

impl RadialBlurQuality {
    pub fn taps(self) -> u32 {
        match self {
            Self::Draft => 8,
            Self::Best => 32,
        }
    }
}

/// Per-frame parameters, as sampled from the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadialBlurEffect {
    pub amount: f32,
    /// Centre in authored layer coordinates.
    pub center: [f32; 2],
}

impl Default for RadialBlurEffect {
    fn default() -> Self {
        Self {
            amount: 0.0,
            center: [0.0, 0.0],
        }
    }
}

/// Shader-side amount for an authored amount.
pub fn shader_amount(amount: f32) -> f32 {
    (amount * AMOUNT_SCALE).min(MAX_AMOUNT)
}

#[derive(Debug)]
struct RadialBlurKernel {
    taps: u32,
}

impl FilterKernel for RadialBlurKernel {
    fn shade(&self, uniforms: &UniformValues<'_>, input: &dyn TextureSource, uv: Vec2) -> [f32; 4] {
        let amount = uniforms.float("amount");
        let center = Vec2::from(uniforms.vec2("center"));
        let step = (center - uv) * amount;
        let mut sum = [0.0f32; 4];
        for i in 0..self.taps {
            let sample = input.sample(uv + step * (i as f32 / self.taps as f32));
            for (acc, v) in sum.iter_mut().zip(sample) {
                *acc += v;
            }
        }
        sum.map(|v| v / self.taps as f32)
    }
}

fn fragment_code(taps: u32) -> String {
    format!(
        "@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {{
    let step = (u.center - in.tex_coord) * u.amount;
    var color = vec4<f32>(0.0);
    for (var i = 0u; i < {taps}u; i = i + 1u) {{
        let offset = step * (f32(i) / {taps}.0);
        let uv = in.tex_coord + offset;
        color = color + textureSampleLevel(input_texture, texture_sampler, uv, 0.0);
    }}
    return color / {taps}.0;
}}
"
    )
}

/// Blurs every pixel along the line towards the centre.
#[derive(Debug, Clone, Default)]
pub struct RadialBlurFilter {
    quality: RadialBlurQuality,
    effect: RadialBlurEffect,
    amount: UniformHandle,
    center: UniformHandle,
    generation: Option<u64>,
}

impl RadialBlurFilter {
    pub fn new(quality: RadialBlurQuality) -> Self {
        Self {
            quality,
            ..Default::default()
        }
    }

    pub fn quality(&self) -> RadialBlurQuality {
        self.quality
    }

    pub fn effect(&self) -> &RadialBlurEffect {
        &self.effect
    }

    /// Parameters for the next draw.
    pub fn set_effect(&mut self, effect: RadialBlurEffect) {
        self.effect = effect;
    }
}

impl LayerFilter for RadialBlurFilter {
    fn name(&self) -> &'static str {
        "RadialBlurFilter"
    }

    fn compute_key(&self, key: &mut KeyBuilder) {
        key.add(RADIAL_BLUR_CLASS).add(self.quality.taps());
    }

    fn on_build_fragment_shader(&self) -> FragmentShader {
        let taps = self.quality.taps();
        FragmentShader {
            code: fragment_code(taps),
            uniforms: vec![
                UniformDecl::new("amount", UniformType::Float),
                UniformDecl::new("center", UniformType::Float2),
            ],
            kernel: Arc::new(RadialBlurKernel { taps }),
        }
    }

    fn on_prepare_program(&mut self, program: &Program) {
        [self.amount, self.center] = resolve_handles(program, ["amount", "center"]);
        self.generation = Some(program.generation());
        trace!(generation = program.generation(), "Resolved radial blur handles");
    }

    fn prepared_generation(&self) -> Option<u64> {
        self.generation
    }

    fn on_update_params(
        &mut self,
        ctx: &mut FilterContext<'_, '_>,
        content_bounds: Rect,
        filter_scale: Vec2,
    ) {
        let center = Vec2::from(self.effect.center) * filter_scale;
        let center = ctx.content_to_texture(center, content_bounds);
        let pdm = ctx.pdm();
        pdm.set_1f(self.amount, shader_amount(self.effect.amount));
        pdm.set_2f(self.center, center.x, center.y);
    }
}

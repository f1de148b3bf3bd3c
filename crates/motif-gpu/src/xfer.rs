//! Transfer stage: how the shaded fragment is combined with the target.

use crate::blend::{wgsl_blend_function, BlendCoefficients, BlendDescriptor, BlendMode};
use crate::compositor::DstSnapshot;
use crate::program::{KeyBuilder, Program};
use crate::uniform::{ProgramDataManager, UniformDecl, UniformHandle, UniformType};

/// Fixed-function blending, or a shader blend against a destination
/// snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XferProcessor {
    Coefficients(BlendMode),
    DstRead(BlendMode),
}

impl XferProcessor {
    pub fn for_blend(blend: BlendDescriptor) -> Self {
        if blend.requires_dst_read {
            Self::DstRead(blend.mode)
        } else {
            Self::Coefficients(blend.mode)
        }
    }

    pub fn mode(self) -> BlendMode {
        match self {
            Self::Coefficients(mode) | Self::DstRead(mode) => mode,
        }
    }

    pub fn reads_dst(self) -> bool {
        matches!(self, Self::DstRead(_))
    }

    /// Fixed-function state for the draw. `None` replaces the target pixel
    /// with the fragment output.
    pub fn blend_coefficients(self) -> Option<BlendCoefficients> {
        match self {
            Self::Coefficients(mode) => mode.coefficients(),
            Self::DstRead(_) => None,
        }
    }

    pub(crate) fn compute_key(self, key: &mut KeyBuilder) {
        key.add_bool(self.reads_dst()).add(self.mode() as u32);
    }

    pub(crate) fn uniforms(self) -> Vec<UniformDecl> {
        if self.reads_dst() {
            vec![
                UniformDecl::new("dst_coord_scale", UniformType::Float2),
                UniformDecl::new("dst_coord_offset", UniformType::Float2),
            ]
        } else {
            Vec::new()
        }
    }

    pub(crate) fn helpers(self) -> String {
        match self {
            Self::DstRead(mode) => wgsl_blend_function(mode),
            Self::Coefficients(_) => String::new(),
        }
    }

    /// Fragment tail consuming `color` and `coverage`. The coefficient tail
    /// folds coverage into the source, which is exact only for modes
    /// passing [`BlendMode::supports_coverage_as_alpha`].
    pub(crate) fn emit_code(self) -> String {
        match self {
            Self::Coefficients(_) => "    return color * coverage;\n".to_string(),
            Self::DstRead(mode) => format!(
                "    let dst_coord = \
                 in.clip_position.xy * u.dst_coord_scale + u.dst_coord_offset;\n    \
                 let dst = textureSampleLevel(dst_texture, texture_sampler, dst_coord, 0.0);\n    \
                 let blended = blend_{}(color, dst);\n    \
                 return coverage * blended + (1.0 - coverage) * dst;\n",
                mode.shader_name()
            ),
        }
    }
}

/// Resolved handles of the dst-read uniforms.
#[derive(Debug, Clone, Copy, Default)]
pub struct XferProgram {
    dst_coord_scale: UniformHandle,
    dst_coord_offset: UniformHandle,
}

impl XferProgram {
    pub fn prepare(program: &Program) -> Self {
        Self {
            dst_coord_scale: program.uniform("dst_coord_scale"),
            dst_coord_offset: program.uniform("dst_coord_offset"),
        }
    }

    /// The snapshot differs on every draw, so its mapping is always pushed.
    pub fn set_data(&self, pdm: &mut ProgramDataManager<'_>, snapshot: Option<&DstSnapshot>) {
        if let Some(snapshot) = snapshot {
            let [sx, sy] = snapshot.coord_scale;
            let [ox, oy] = snapshot.coord_offset;
            pdm.set_2f(self.dst_coord_scale, sx, sy);
            pdm.set_2f(self.dst_coord_offset, ox, oy);
        }
    }
}

//! Fragment shading stage of a geometry draw: solid color or a sampled
//! texture.

use motif_core::{Matrix, Rect};

use crate::program::KeyBuilder;
use crate::texture::BackendTexture;

/// Maps a draw's local coordinates to normalized memory coordinates of a
/// sampled texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordTransform {
    pub matrix: Matrix,
}

impl CoordTransform {
    /// Local pixel coordinates to memory uv of `texture`, through
    /// `local_to_texture`, which maps local coordinates to top-down texel
    /// coordinates.
    pub fn for_texture(texture: &BackendTexture, local_to_texture: Matrix) -> Self {
        let normalize = Matrix::scale(1.0 / texture.width as f32, 1.0 / texture.height as f32);
        Self {
            matrix: local_to_texture
                .then(normalize)
                .then(texture.origin.normalized_matrix()),
        }
    }
}

/// A texture input with its coordinate transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureSampler {
    pub texture: BackendTexture,
    pub transform: CoordTransform,
}

impl TextureSampler {
    /// Stretch the whole texture over `local_rect`.
    pub fn fill(texture: BackendTexture, local_rect: Rect) -> Self {
        let to_texture = Matrix::translate(-local_rect.x, -local_rect.y).then(Matrix::scale(
            texture.width as f32 / local_rect.width,
            texture.height as f32 / local_rect.height,
        ));
        Self::with_matrix(texture, to_texture)
    }

    /// Sample with an explicit local-to-texel mapping.
    pub fn with_matrix(texture: BackendTexture, local_to_texture: Matrix) -> Self {
        Self {
            texture,
            transform: CoordTransform::for_texture(&texture, local_to_texture),
        }
    }
}

/// Configuration shape of a [`FragmentStage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadingShape {
    Color,
    Texture,
}

/// How the fragment color is produced before blending.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FragmentStage {
    /// Interpolated vertex color.
    Color,
    /// Texel times vertex color.
    Texture(TextureSampler),
}

impl FragmentStage {
    pub fn shape(&self) -> ShadingShape {
        match self {
            Self::Color => ShadingShape::Color,
            Self::Texture(_) => ShadingShape::Texture,
        }
    }

    pub fn coord_transforms(&self) -> &[CoordTransform] {
        match self {
            Self::Color => &[],
            Self::Texture(sampler) => std::slice::from_ref(&sampler.transform),
        }
    }

    pub fn texture(&self) -> Option<&BackendTexture> {
        match self {
            Self::Color => None,
            Self::Texture(sampler) => Some(&sampler.texture),
        }
    }

    pub(crate) fn compute_key(&self, key: &mut KeyBuilder) {
        key.add(self.shape() as u32);
    }
}

impl ShadingShape {
    /// WGSL declaring `var color` from the varyings.
    pub(crate) fn emit_code(self) -> &'static str {
        match self {
            Self::Color => "    var color = in.color;\n",
            Self::Texture => {
                "    var color = \
                 textureSampleLevel(src_texture, texture_sampler, in.tex_coord_0, 0.0) \
                 * in.color;\n"
            }
        }
    }
}

//! Motif Effects - layer filters
//!
//! Each filter contributes the fragment shader of a full-surface pass over
//! a layer's rendered content. [`EffectFilter`] is the closed set the
//! renderer dispatches over.

pub mod mosaic;
pub mod radial_blur;

pub use mosaic::{MosaicEffect, MosaicFilter};
pub use radial_blur::{RadialBlurEffect, RadialBlurFilter, RadialBlurQuality};

use motif_core::{Rect, Vec2};
use motif_gpu::filter::{FilterContext, FragmentShader, LayerFilter};
use motif_gpu::{KeyBuilder, Program};

/// Recipe class words of the built-in filters.
pub(crate) const RADIAL_BLUR_CLASS: u32 = 1;
pub(crate) const MOSAIC_CLASS: u32 = 2;

/// Built-in layer filters.
#[derive(Debug, Clone)]
pub enum EffectFilter {
    RadialBlur(RadialBlurFilter),
    Mosaic(MosaicFilter),
}

impl EffectFilter {
    fn inner(&self) -> &dyn LayerFilter {
        match self {
            Self::RadialBlur(f) => f,
            Self::Mosaic(f) => f,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn LayerFilter {
        match self {
            Self::RadialBlur(f) => f,
            Self::Mosaic(f) => f,
        }
    }
}

impl From<RadialBlurFilter> for EffectFilter {
    fn from(filter: RadialBlurFilter) -> Self {
        Self::RadialBlur(filter)
    }
}

impl From<MosaicFilter> for EffectFilter {
    fn from(filter: MosaicFilter) -> Self {
        Self::Mosaic(filter)
    }
}

impl LayerFilter for EffectFilter {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn compute_key(&self, key: &mut KeyBuilder) {
        self.inner().compute_key(key);
    }

    fn on_build_fragment_shader(&self) -> FragmentShader {
        self.inner().on_build_fragment_shader()
    }

    fn on_prepare_program(&mut self, program: &Program) {
        self.inner_mut().on_prepare_program(program);
    }

    fn prepared_generation(&self) -> Option<u64> {
        self.inner().prepared_generation()
    }

    fn on_update_params(
        &mut self,
        ctx: &mut FilterContext<'_, '_>,
        content_bounds: Rect,
        filter_scale: Vec2,
    ) {
        self.inner_mut()
            .on_update_params(ctx, content_bounds, filter_scale);
    }
}

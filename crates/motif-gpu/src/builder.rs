//! WGSL assembly for geometry programs.
//!
//! Every generated module follows one layout: the uniform block at
//! `@group(0) @binding(0)`, the sampler and the source/destination textures
//! at `@group(1)` bindings 0, 1 and 2, entry points `vs_main` and `fs_main`.

use std::fmt::Write;

use crate::fragment::{FragmentStage, ShadingShape};
use crate::processor::{EmitArgs, GeometryProcessor};
use crate::program::{
    GeometryKernel, KeyBuilder, ProgramKernel, ProgramSource, SamplerBindings, ShaderRecipe,
};
use crate::uniform::UniformDecl;
use crate::xfer::XferProcessor;

/// Recipe of a geometry draw.
pub fn geometry_recipe(
    gp: &GeometryProcessor,
    fragment: &FragmentStage,
    xfer: XferProcessor,
) -> ShaderRecipe {
    let mut key = KeyBuilder::new();
    gp.compute_key(&mut key);
    fragment.compute_key(&mut key);
    xfer.compute_key(&mut key);
    key.finish()
}

/// Generate the full program for a geometry draw's configuration shape.
pub fn build_geometry_program(
    gp: &GeometryProcessor,
    shading: ShadingShape,
    xfer: XferProcessor,
) -> ProgramSource {
    let coord_transforms = usize::from(shading == ShadingShape::Texture);
    let fragments = gp.emit_code(&EmitArgs { coord_transforms });

    let mut uniforms = fragments.uniforms.clone();
    uniforms.extend(xfer.uniforms());
    let samplers = SamplerBindings {
        src: shading == ShadingShape::Texture,
        dst: xfer.reads_dst(),
    };

    let mut wgsl = String::new();
    wgsl.push_str(&uniform_block(&uniforms));
    wgsl.push_str(&sampler_bindings(samplers));

    wgsl.push_str("\nstruct VertexInput {\n");
    for (i, attr) in fragments.attributes.iter().enumerate() {
        let _ = writeln!(wgsl, "    @location({i}) {}: {},", attr.name, attr.format.wgsl());
    }
    wgsl.push_str("}\n\nstruct VertexOutput {\n    @builtin(position) clip_position: vec4<f32>,\n");
    for (i, varying) in fragments.varyings.iter().enumerate() {
        let _ = writeln!(
            wgsl,
            "    @location({i}) {}: {},",
            varying.name,
            varying.format.wgsl()
        );
    }
    wgsl.push_str("}\n");

    wgsl.push_str(&fragments.helpers);
    wgsl.push_str(&xfer.helpers());

    wgsl.push_str(
        "\n@vertex\nfn vs_main(in: VertexInput) -> VertexOutput {\n    \
         var out: VertexOutput;\n",
    );
    wgsl.push_str(&fragments.vertex_code);
    wgsl.push_str(
        "    out.clip_position = \
         vec4<f32>(device_position * u.rt_adjust.xz + u.rt_adjust.yw, 0.0, 1.0);\n    \
         return out;\n}\n",
    );

    wgsl.push_str(
        "\n@fragment\nfn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {\n    \
         var coverage = 1.0;\n",
    );
    wgsl.push_str(&fragments.coverage_code);
    wgsl.push_str(shading.emit_code());
    wgsl.push_str(&xfer.emit_code());
    wgsl.push_str("}\n");

    ProgramSource {
        label: format!("{} {:?} {:?}", gp.name(), shading, xfer),
        wgsl,
        attributes: fragments.attributes,
        uniforms,
        samplers,
        kernel: ProgramKernel::Geometry(GeometryKernel {
            shape: gp.shape(),
            shading,
            xfer,
            coord_transforms,
        }),
    }
}

pub(crate) fn uniform_block(uniforms: &[UniformDecl]) -> String {
    let mut out = String::from("struct Uniforms {\n");
    for decl in uniforms {
        let _ = writeln!(out, "    {}: {},", decl.name, decl.ty.wgsl());
    }
    out.push_str("}\n\n@group(0) @binding(0) var<uniform> u: Uniforms;\n");
    out
}

pub(crate) fn sampler_bindings(samplers: SamplerBindings) -> String {
    let mut out = String::new();
    if samplers.src || samplers.dst {
        out.push_str("@group(1) @binding(0) var texture_sampler: sampler;\n");
    }
    if samplers.src {
        out.push_str("@group(1) @binding(1) var src_texture: texture_2d<f32>;\n");
    }
    if samplers.dst {
        out.push_str("@group(1) @binding(2) var dst_texture: texture_2d<f32>;\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blend::BlendMode;
    use crate::processor::{EllipseGeometry, RectGeometry};
    use motif_core::{Color, Rect};

    fn rect() -> GeometryProcessor {
        GeometryProcessor::Rect(RectGeometry::new(Rect::from_size(8.0, 8.0), Color::WHITE))
    }

    #[test]
    fn test_color_program_has_no_samplers() {
        let source = build_geometry_program(
            &rect(),
            ShadingShape::Color,
            XferProcessor::Coefficients(BlendMode::SrcOver),
        );
        assert!(!source.wgsl.contains("texture_sampler"));
        assert!(source.wgsl.contains("fn vs_main"));
        assert!(source.wgsl.contains("return color * coverage;"));
        assert_eq!(source.vertex_stride(), 6);
    }

    #[test]
    fn test_dst_read_texture_program_binds_both_textures() {
        let source = build_geometry_program(
            &rect(),
            ShadingShape::Texture,
            XferProcessor::DstRead(BlendMode::Multiply),
        );
        assert!(source.samplers.src && source.samplers.dst);
        assert!(source.wgsl.contains("u.coord_transform_0"));
        assert!(source.wgsl.contains("u.dst_coord_scale"));
        assert!(source.wgsl.contains("fn blend_multiply("));
        let names: Vec<_> = source.uniforms.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "view_matrix",
                "rt_adjust",
                "coord_transform_0",
                "dst_coord_scale",
                "dst_coord_offset"
            ]
        );
    }

    #[test]
    fn test_recipe_ignores_runtime_values() {
        let a = GeometryProcessor::Ellipse(EllipseGeometry::new(
            Rect::from_size(10.0, 10.0),
            Color::RED,
        ));
        let b = GeometryProcessor::Ellipse(EllipseGeometry::new(
            Rect::new(3.0, 4.0, 50.0, 20.0),
            Color::GREEN,
        ));
        let xfer = XferProcessor::Coefficients(BlendMode::SrcOver);
        assert_eq!(
            geometry_recipe(&a, &FragmentStage::Color, xfer),
            geometry_recipe(&b, &FragmentStage::Color, xfer)
        );
        assert_ne!(
            geometry_recipe(&a, &FragmentStage::Color, xfer),
            geometry_recipe(&a, &FragmentStage::Color, XferProcessor::DstRead(BlendMode::Screen))
        );
    }
}

//! CPU evaluation of program kernels.

use glam::Mat3;
use motif_core::color::{quantize, unit};
use motif_core::{FrameBuffer, ImageOrigin, MotifError, Result, Vec2};
use rayon::prelude::*;
use smallvec::SmallVec;

use super::raster::fill_triangle;
use crate::blend::{blend, BlendCoefficients};
use crate::draw::Mesh;
use crate::filter::{FilterKernel, TextureSource};
use crate::fragment::ShadingShape;
use crate::processor::{coord_transform_name, COLOR, POSITION};
use crate::program::{GeometryKernel, VertexAttribute};
use crate::uniform::UniformValues;
use crate::xfer::XferProcessor;

type Varyings = SmallVec<[f32; 16]>;

/// Nearest-neighbour, clamp-to-edge sampling of a frame in memory order.
pub(crate) struct NearestSampler<'a> {
    frame: &'a FrameBuffer,
}

impl<'a> NearestSampler<'a> {
    pub(crate) fn new(frame: &'a FrameBuffer) -> Self {
        Self { frame }
    }
}

impl TextureSource for NearestSampler<'_> {
    fn sample(&self, uv: Vec2) -> [f32; 4] {
        let (w, h) = (self.frame.width, self.frame.height);
        if w == 0 || h == 0 {
            return [0.0; 4];
        }
        let x = (uv.x * w as f32).floor().clamp(0.0, (w - 1) as f32) as u32;
        let y = (uv.y * h as f32).floor().clamp(0.0, (h - 1) as f32) as u32;
        self.frame.pixel(x, y).map(unit)
    }

    fn size(&self) -> (u32, u32) {
        (self.frame.width, self.frame.height)
    }
}

/// The render target of a draw.
pub(crate) struct Target<'a> {
    pub frame: &'a mut FrameBuffer,
    pub origin: ImageOrigin,
}

impl Target<'_> {
    fn size(&self) -> Vec2 {
        Vec2::new(self.frame.width as f32, self.frame.height as f32)
    }

    /// Normalized device coordinates to memory-space pixels.
    fn ndc_to_memory(&self, ndc: Vec2) -> Vec2 {
        let size = self.size();
        Vec2::new((ndc.x + 1.0) * 0.5 * size.x, (1.0 - ndc.y) * 0.5 * size.y)
    }

    fn write(&mut self, x: u32, y: u32, out: [f32; 4], coefficients: Option<BlendCoefficients>) {
        let result = match coefficients {
            Some(c) => c.apply(out, self.frame.pixel(x, y).map(unit)),
            None => out,
        };
        self.frame.set_pixel(x, y, result.map(quantize));
    }
}

/// Rasterize a triangle list, calling `emit(x, memory_row, varyings)`.
///
/// Triangles are walked in the target's top-down orientation so that a
/// bottom-left target covers exactly the mirrored memory rows.
fn rasterize(
    target: &Target<'_>,
    positions: &[Vec2],
    varyings: &[Varyings],
    mut emit: impl FnMut(u32, u32, &[f32]),
) {
    let (w, h) = (target.frame.width, target.frame.height);
    let hf = h as f32;
    let logical = |p: Vec2| match target.origin {
        ImageOrigin::TopLeft => p,
        ImageOrigin::BottomLeft => Vec2::new(p.x, hf - p.y),
    };
    let mut buf: Varyings = SmallVec::new();
    for t in 0..positions.len() / 3 {
        let i = [3 * t, 3 * t + 1, 3 * t + 2];
        let tri = i.map(|k| logical(positions[k]));
        fill_triangle(tri, w, h, |x, y, b| {
            buf.clear();
            let (v0, v1, v2) = (&varyings[i[0]], &varyings[i[1]], &varyings[i[2]]);
            buf.extend((0..v0.len()).map(|k| b[0] * v0[k] + b[1] * v1[k] + b[2] * v2[k]));
            emit(x, target.origin.memory_row(y, h), &buf);
        });
    }
}

fn attribute_offset(attributes: &[VertexAttribute], name: &str) -> Result<usize> {
    let mut offset = 0;
    for attr in attributes {
        if attr.name == name {
            return Ok(offset);
        }
        offset += attr.format.components();
    }
    Err(MotifError::Shader(format!("missing vertex attribute `{name}`")))
}

fn read2(v: &[f32], at: usize) -> Vec2 {
    Vec2::new(v[at], v[at + 1])
}

/// Run a geometry program over `mesh`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn draw_geometry(
    kernel: &GeometryKernel,
    attributes: &[VertexAttribute],
    uniforms: &UniformValues<'_>,
    mesh: &Mesh,
    target: &mut Target<'_>,
    src: Option<&FrameBuffer>,
    dst: Option<&FrameBuffer>,
    coefficients: Option<BlendCoefficients>,
) -> Result<()> {
    let src = match (kernel.shading, src) {
        (ShadingShape::Texture, None) => {
            return Err(MotifError::InvalidParameter(
                "program samples a source texture but none is bound".into(),
            ))
        }
        (_, src) => src.map(NearestSampler::new),
    };
    let dst = match (kernel.xfer, dst) {
        (XferProcessor::DstRead(_), None) => {
            return Err(MotifError::InvalidParameter(
                "program reads the destination but no snapshot is bound".into(),
            ))
        }
        (_, dst) => dst.map(NearestSampler::new),
    };

    let position = attribute_offset(attributes, POSITION.name)?;
    let color = attribute_offset(attributes, COLOR.name)?;
    let local = attribute_offset(attributes, kernel.shape.local_coord_attribute())?;
    let extras = kernel
        .shape
        .extra_attributes()
        .iter()
        .map(|a| Ok((attribute_offset(attributes, a.name)?, a.format.components())))
        .collect::<Result<SmallVec<[(usize, usize); 4]>>>()?;

    let view = uniforms.mat3("view_matrix");
    let rt = uniforms.vec4("rt_adjust");
    let transforms: SmallVec<[Mat3; 2]> = (0..kernel.coord_transforms)
        .map(|i| uniforms.mat3(&coord_transform_name(i)))
        .collect();
    let extras_start = 4 + 2 * transforms.len();

    let mut positions = Vec::with_capacity(mesh.vertex_count());
    let mut varyings = Vec::with_capacity(mesh.vertex_count());
    for n in 0..mesh.vertex_count() {
        let v = mesh.vertex(n);
        let device = view.transform_point2(read2(v, position));
        let ndc = device * Vec2::new(rt[0], rt[2]) + Vec2::new(rt[1], rt[3]);
        positions.push(target.ndc_to_memory(ndc));

        let mut out: Varyings = SmallVec::from_slice(&v[color..color + 4]);
        let local = read2(v, local);
        for m in &transforms {
            let t = m.transform_point2(local);
            out.extend_from_slice(&[t.x, t.y]);
        }
        for &(offset, len) in &extras {
            out.extend_from_slice(&v[offset..offset + len]);
        }
        varyings.push(out);
    }

    let mut fragments = Vec::new();
    rasterize(target, &positions, &varyings, |x, y, vary| {
        let coverage = kernel.shape.coverage(&vary[extras_start..]);
        let mut color = [vary[0], vary[1], vary[2], vary[3]];
        if let Some(src) = &src {
            let texel = src.sample(Vec2::new(vary[4], vary[5]));
            color = std::array::from_fn(|c| texel[c] * color[c]);
        }
        fragments.push((x, y, color, coverage));
    });

    for (x, y, color, coverage) in fragments {
        let out = match (kernel.xfer, &dst) {
            (XferProcessor::DstRead(mode), Some(dst)) => {
                let frag = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let [sx, sy] = uniforms.vec2("dst_coord_scale");
                let [ox, oy] = uniforms.vec2("dst_coord_offset");
                let d = dst.sample(frag * Vec2::new(sx, sy) + Vec2::new(ox, oy));
                let blended = blend(mode, color, d);
                std::array::from_fn(|c| coverage * blended[c] + (1.0 - coverage) * d[c])
            }
            // Only modes that fold coverage into the source reach here with
            // fractional coverage.
            _ => color.map(|c| c * coverage),
        };
        target.write(x, y, out, coefficients);
    }
    Ok(())
}

/// Run a filter program over `mesh`. Fragments are shaded in parallel and
/// written in raster order.
pub(crate) fn draw_filter(
    kernel: &dyn FilterKernel,
    attributes: &[VertexAttribute],
    uniforms: &UniformValues<'_>,
    mesh: &Mesh,
    target: &mut Target<'_>,
    input: &FrameBuffer,
    coefficients: Option<BlendCoefficients>,
) -> Result<()> {
    let position = attribute_offset(attributes, POSITION.name)?;
    let vertex_matrix = uniforms.mat3("vertex_matrix");
    let texture_matrix = uniforms.mat3("texture_matrix");

    let mut positions = Vec::with_capacity(mesh.vertex_count());
    let mut varyings = Vec::with_capacity(mesh.vertex_count());
    for n in 0..mesh.vertex_count() {
        let p = read2(mesh.vertex(n), position);
        positions.push(target.ndc_to_memory(vertex_matrix.transform_point2(p)));
        let uv = texture_matrix.transform_point2(p);
        varyings.push(SmallVec::from_slice(&[uv.x, uv.y]));
    }

    let mut fragments = Vec::new();
    rasterize(target, &positions, &varyings, |x, y, vary| {
        fragments.push((x, y, Vec2::new(vary[0], vary[1])));
    });

    let sampler = NearestSampler::new(input);
    let shaded: Vec<[f32; 4]> = fragments
        .par_iter()
        .map(|&(_, _, uv)| kernel.shade(uniforms, &sampler, uv))
        .collect();

    for (&(x, y, _), out) in fragments.iter().zip(shaded) {
        target.write(x, y, out, coefficients);
    }
    Ok(())
}

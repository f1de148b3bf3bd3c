//! Geometry processors.
//!
//! A geometry processor describes one primitive shape: the vertex inputs it
//! needs, the shader code that turns them into device positions and
//! coverage, and the per-draw uniform values. Processors with the same
//! configuration shape share a program; [`GeometryProcessor::set_data`]
//! skips uploads whose value is already in the program.

mod ellipse;
mod path;
mod rect;

pub use ellipse::EllipseGeometry;
pub use path::PathGeometry;
pub use rect::RectGeometry;

use motif_core::{Color, ImageOrigin, Matrix, Rect, Vec2};
use smallvec::SmallVec;
use tracing::trace;

use crate::draw::Mesh;
use crate::fragment::CoordTransform;
use crate::program::{AttributeFormat, KeyBuilder, Program, VertexAttribute};
use crate::texture::BackendTexture;
use crate::uniform::{ProgramDataManager, UniformDecl, UniformHandle, UniformType};

pub(crate) const POSITION: VertexAttribute =
    VertexAttribute::new("position", AttributeFormat::Float2);
pub(crate) const COLOR: VertexAttribute = VertexAttribute::new("color", AttributeFormat::Float4);

/// Configuration shape of a geometry processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryShape {
    Ellipse { stroked: bool },
    Rect { local_coords: bool },
    Path { coverage: bool },
}

impl GeometryShape {
    fn class_id(self) -> u32 {
        match self {
            Self::Ellipse { .. } => 1,
            Self::Rect { .. } => 2,
            Self::Path { .. } => 3,
        }
    }

    fn flag(self) -> bool {
        match self {
            Self::Ellipse { stroked } => stroked,
            Self::Rect { local_coords } => local_coords,
            Self::Path { coverage } => coverage,
        }
    }

    /// Attributes after position and color. Each is passed through to the
    /// fragment stage as a varying of the same name.
    pub fn extra_attributes(self) -> &'static [VertexAttribute] {
        match self {
            Self::Ellipse { .. } => ellipse::ATTRIBUTES,
            Self::Rect { local_coords: true } => rect::ATTRIBUTES,
            Self::Path { coverage: true } => path::ATTRIBUTES,
            _ => &[],
        }
    }

    /// Attribute feeding the coord transforms.
    pub fn local_coord_attribute(self) -> &'static str {
        match self {
            Self::Rect { local_coords: true } => rect::ATTRIBUTES[0].name,
            _ => POSITION.name,
        }
    }

    /// Whether fragments may carry coverage below one.
    pub fn has_fractional_coverage(self) -> bool {
        matches!(self, Self::Ellipse { .. } | Self::Path { coverage: true })
    }

    /// CPU evaluation of the coverage code, from the extra varyings in
    /// attribute order.
    pub fn coverage(self, extra: &[f32]) -> f32 {
        match self {
            Self::Ellipse { stroked } => ellipse::coverage(extra, stroked),
            Self::Path { coverage: true } => extra.first().copied().unwrap_or(1.0).clamp(0.0, 1.0),
            _ => 1.0,
        }
    }
}

/// Arguments for code emission.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmitArgs {
    /// Number of coord transforms the fragment stage consumes.
    pub coord_transforms: usize,
}

/// A value interpolated between the vertex and fragment stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Varying {
    pub name: String,
    pub format: AttributeFormat,
}

/// Shader pieces contributed by a geometry processor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderFragments {
    pub attributes: Vec<VertexAttribute>,
    pub varyings: Vec<Varying>,
    pub uniforms: Vec<UniformDecl>,
    /// Module-scope helper functions.
    pub helpers: String,
    /// Body of `vs_main`; must define `device_position`.
    pub vertex_code: String,
    /// Fragment code assigning `coverage`.
    pub coverage_code: String,
}

/// Render-target dimensions and origin, tracked as one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetInfo {
    pub width: u32,
    pub height: u32,
    pub origin: ImageOrigin,
}

impl TargetInfo {
    pub fn of(texture: &BackendTexture) -> Self {
        Self {
            width: texture.width,
            height: texture.height,
            origin: texture.origin,
        }
    }

    /// `[sx, tx, sy, ty]` with `ndc = device * (sx, sy) + (tx, ty)`. Row 0
    /// of memory sits at ndc y = +1, so a bottom-left target flips y.
    pub fn rt_adjust(&self) -> [f32; 4] {
        let sx = 2.0 / self.width as f32;
        let sy = 2.0 / self.height as f32;
        match self.origin {
            ImageOrigin::TopLeft => [sx, -1.0, -sy, 1.0],
            ImageOrigin::BottomLeft => [sx, -1.0, sy, -1.0],
        }
    }
}

/// Last values pushed for one program, used to skip redundant uploads.
///
/// `None` means the value in the program is unknown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessorState {
    generation: Option<u64>,
    view_matrix: Option<Matrix>,
    target: Option<TargetInfo>,
    coord_transforms: SmallVec<[Option<Matrix>; 2]>,
}

impl ProcessorState {
    pub fn new(transforms: usize) -> Self {
        Self {
            coord_transforms: SmallVec::from_elem(None, transforms),
            ..Self::default()
        }
    }

    /// Forget every recorded value.
    pub fn reset(&mut self) {
        self.generation = None;
        self.view_matrix = None;
        self.target = None;
        self.coord_transforms.iter_mut().for_each(|m| *m = None);
    }

    /// Reset unless the state was recorded against `generation`.
    pub fn validate(&mut self, generation: u64) {
        if self.generation != Some(generation) {
            if self.generation.is_some() {
                trace!(generation, "Program generation changed, resetting state");
            }
            self.reset();
            self.generation = Some(generation);
        }
    }

    pub fn generation(&self) -> Option<u64> {
        self.generation
    }

    pub fn view_matrix(&self) -> Option<Matrix> {
        self.view_matrix
    }

    pub fn target(&self) -> Option<TargetInfo> {
        self.target
    }
}

/// Program-side state of a geometry program: resolved handles plus the
/// upload cache.
#[derive(Debug, Clone)]
pub struct GeometryProgram {
    view_matrix: UniformHandle,
    rt_adjust: UniformHandle,
    coord_transforms: SmallVec<[UniformHandle; 2]>,
    pub state: ProcessorState,
}

impl GeometryProgram {
    /// Resolve handles once after link.
    pub fn prepare(program: &Program, transforms: usize) -> Self {
        Self {
            view_matrix: program.uniform("view_matrix"),
            rt_adjust: program.uniform("rt_adjust"),
            coord_transforms: (0..transforms)
                .map(|i| program.uniform(&coord_transform_name(i)))
                .collect(),
            state: ProcessorState::new(transforms),
        }
    }
}

pub(crate) fn coord_transform_name(index: usize) -> String {
    format!("coord_transform_{index}")
}

pub(crate) fn tex_coord_name(index: usize) -> String {
    format!("tex_coord_{index}")
}

/// The closed set of primitive shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryProcessor {
    Ellipse(EllipseGeometry),
    Rect(RectGeometry),
    Path(PathGeometry),
}

impl GeometryProcessor {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ellipse(_) => "EllipseGeometry",
            Self::Rect(_) => "RectGeometry",
            Self::Path(_) => "PathGeometry",
        }
    }

    pub fn shape(&self) -> GeometryShape {
        match self {
            Self::Ellipse(e) => GeometryShape::Ellipse {
                stroked: e.stroke_width.is_some(),
            },
            Self::Rect(r) => GeometryShape::Rect {
                local_coords: r.local_rect.is_some(),
            },
            Self::Path(p) => GeometryShape::Path {
                coverage: p.coverage.is_some(),
            },
        }
    }

    pub fn view_matrix(&self) -> Matrix {
        match self {
            Self::Ellipse(e) => e.view_matrix,
            Self::Rect(r) => r.view_matrix,
            Self::Path(p) => p.view_matrix,
        }
    }

    pub fn color(&self) -> Color {
        match self {
            Self::Ellipse(e) => e.color,
            Self::Rect(r) => r.color,
            Self::Path(p) => p.color,
        }
    }

    /// Bounds of the mesh in local coordinates.
    pub fn local_bounds(&self) -> Rect {
        match self {
            Self::Ellipse(e) => e.mesh_rect(),
            Self::Rect(r) => r.rect,
            Self::Path(p) => Rect::bounds_of(p.vertices.iter().copied()),
        }
    }

    /// Bounds of the mesh in device pixels.
    pub fn device_bounds(&self) -> Rect {
        self.view_matrix().map_rect(self.local_bounds())
    }

    pub fn compute_key(&self, key: &mut KeyBuilder) {
        let shape = self.shape();
        key.add(shape.class_id()).add_bool(shape.flag());
    }

    /// Shader pieces for this configuration shape. Depends only on the
    /// shape and `args`, never on runtime values.
    pub fn emit_code(&self, args: &EmitArgs) -> ShaderFragments {
        let shape = self.shape();
        let mut out = ShaderFragments::default();

        out.attributes.push(POSITION);
        out.attributes.push(COLOR);
        out.attributes.extend_from_slice(shape.extra_attributes());

        out.uniforms
            .push(UniformDecl::new("view_matrix", UniformType::Mat3));
        out.uniforms.push(UniformDecl::new("rt_adjust", UniformType::Float4));

        out.vertex_code.push_str(
            "    let device_position = (u.view_matrix * vec3<f32>(in.position, 1.0)).xy;\n",
        );
        out.varyings.push(Varying {
            name: COLOR.name.to_string(),
            format: COLOR.format,
        });
        out.vertex_code.push_str("    out.color = in.color;\n");

        let local = shape.local_coord_attribute();
        for i in 0..args.coord_transforms {
            let uniform = coord_transform_name(i);
            let varying = tex_coord_name(i);
            out.uniforms.push(UniformDecl::new(&uniform, UniformType::Mat3));
            out.vertex_code.push_str(&format!(
                "    out.{varying} = (u.{uniform} * vec3<f32>(in.{local}, 1.0)).xy;\n"
            ));
            out.varyings.push(Varying {
                name: varying,
                format: AttributeFormat::Float2,
            });
        }

        for attr in shape.extra_attributes() {
            out.varyings.push(Varying {
                name: attr.name.to_string(),
                format: attr.format,
            });
            out.vertex_code
                .push_str(&format!("    out.{0} = in.{0};\n", attr.name));
        }

        match shape {
            GeometryShape::Ellipse { stroked } => {
                out.helpers.push_str(ellipse::HELPERS);
                out.coverage_code.push_str(&ellipse::coverage_code(stroked));
            }
            GeometryShape::Path { coverage: true } => {
                out.coverage_code.push_str(path::COVERAGE_CODE);
            }
            _ => {}
        }
        out
    }

    /// Interleaved vertices matching [`Self::emit_code`]'s attributes.
    pub fn build_mesh(&self) -> Mesh {
        let color = self.color().to_array();
        match self {
            Self::Ellipse(e) => e.build_mesh(color),
            Self::Rect(r) => r.build_mesh(color),
            Self::Path(p) => p.build_mesh(color),
        }
    }

    /// Push this draw's uniform values, skipping those already in the
    /// program.
    pub fn set_data(
        &self,
        pdm: &mut ProgramDataManager<'_>,
        program: &mut GeometryProgram,
        target: TargetInfo,
        transforms: &[CoordTransform],
    ) {
        let state = &mut program.state;
        state.validate(pdm.generation());

        let view = self.view_matrix();
        if state.view_matrix != Some(view) {
            pdm.set_matrix3f(program.view_matrix, &view.to_mat3());
            state.view_matrix = Some(view);
        } else {
            trace!(processor = self.name(), "View matrix unchanged");
        }

        if state.target != Some(target) {
            pdm.set_4f(program.rt_adjust, target.rt_adjust());
            state.target = Some(target);
        } else {
            trace!(processor = self.name(), "Target unchanged");
        }

        for (i, transform) in transforms.iter().enumerate() {
            let (Some(handle), Some(prev)) = (
                program.coord_transforms.get(i),
                state.coord_transforms.get_mut(i),
            ) else {
                break;
            };
            if *prev != Some(transform.matrix) {
                pdm.set_matrix3f(*handle, &transform.matrix.to_mat3());
                *prev = Some(transform.matrix);
            }
        }
    }
}

/// Append one interleaved vertex.
pub(crate) fn push_vertex(mesh: &mut Mesh, position: Vec2, color: [f32; 4], extra: &[f32]) {
    mesh.vertices.extend_from_slice(&[position.x, position.y]);
    mesh.vertices.extend_from_slice(&color);
    mesh.vertices.extend_from_slice(extra);
}

/// Two triangles covering `corners` (clockwise from the top-left), each
/// corner carrying its own extra attributes.
pub(crate) fn push_quad<const N: usize>(
    mesh: &mut Mesh,
    corners: [Vec2; 4],
    color: [f32; 4],
    extra: [[f32; N]; 4],
) {
    for i in [0, 1, 2, 0, 2, 3] {
        push_vertex(mesh, corners[i], color, &extra[i]);
    }
}

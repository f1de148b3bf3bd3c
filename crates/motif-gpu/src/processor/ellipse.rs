use motif_core::{Color, Matrix, Rect, Vec2};

use super::push_quad;
use crate::draw::Mesh;
use crate::program::{AttributeFormat, VertexAttribute};

pub(super) const ATTRIBUTES: &[VertexAttribute] = &[
    VertexAttribute::new("ellipse_offset", AttributeFormat::Float2),
    VertexAttribute::new("ellipse_radii", AttributeFormat::Float4),
];

/// Extra local pixels around the ellipse for the antialiased edge.
const AA_OUTSET: f32 = 1.0;

pub(super) const HELPERS: &str = r#"
fn ellipse_edge(offset: vec2<f32>, radii: vec2<f32>) -> f32 {
    if (radii.x <= 0.0 || radii.y <= 0.0) {
        return 0.0;
    }
    let d = length(offset / radii);
    return clamp((1.0 - d) * min(radii.x, radii.y) + 0.5, 0.0, 1.0);
}
"#;

pub(super) fn coverage_code(stroked: bool) -> String {
    let mut code =
        String::from("    coverage = ellipse_edge(in.ellipse_offset, in.ellipse_radii.xy);\n");
    if stroked {
        code.push_str(
            "    coverage = coverage * \
             (1.0 - ellipse_edge(in.ellipse_offset, in.ellipse_radii.zw));\n",
        );
    }
    code
}

fn edge(offset: Vec2, rx: f32, ry: f32) -> f32 {
    if rx <= 0.0 || ry <= 0.0 {
        return 0.0;
    }
    let d = (offset / Vec2::new(rx, ry)).length();
    ((1.0 - d) * rx.min(ry) + 0.5).clamp(0.0, 1.0)
}

/// `extra` is `[offset.x, offset.y, rx, ry, inner_rx, inner_ry]`.
pub(super) fn coverage(extra: &[f32], stroked: bool) -> f32 {
    let [ox, oy, rx, ry, irx, iry] = match extra {
        [a, b, c, d, e, f, ..] => [*a, *b, *c, *d, *e, *f],
        _ => return 0.0,
    };
    let offset = Vec2::new(ox, oy);
    let outer = edge(offset, rx, ry);
    if stroked {
        outer * (1.0 - edge(offset, irx, iry))
    } else {
        outer
    }
}

/// An axis-aligned ellipse inscribed in `rect`, filled or stroked.
#[derive(Debug, Clone, PartialEq)]
pub struct EllipseGeometry {
    pub rect: Rect,
    pub view_matrix: Matrix,
    pub color: Color,
    /// Stroke centered on the ellipse outline; `None` fills.
    pub stroke_width: Option<f32>,
}

impl EllipseGeometry {
    pub fn new(rect: Rect, color: Color) -> Self {
        Self {
            rect,
            view_matrix: Matrix::IDENTITY,
            color,
            stroke_width: None,
        }
    }

    pub fn with_matrix(mut self, view_matrix: Matrix) -> Self {
        self.view_matrix = view_matrix;
        self
    }

    pub fn stroked(mut self, width: f32) -> Self {
        self.stroke_width = Some(width.max(0.0));
        self
    }

    /// Outer and inner radii.
    fn radii(&self) -> [f32; 4] {
        let (rx, ry) = (self.rect.width * 0.5, self.rect.height * 0.5);
        match self.stroke_width {
            Some(w) => {
                let h = w * 0.5;
                [rx + h, ry + h, (rx - h).max(0.0), (ry - h).max(0.0)]
            }
            None => [rx, ry, 0.0, 0.0],
        }
    }

    pub(super) fn mesh_rect(&self) -> Rect {
        let [rx, ry, ..] = self.radii();
        let c = self.rect.center();
        let half = Vec2::new(rx + AA_OUTSET, ry + AA_OUTSET);
        Rect::from_corners(c - half, c + half)
    }

    pub(super) fn build_mesh(&self, color: [f32; 4]) -> Mesh {
        let radii = self.radii();
        let center = self.rect.center();
        let corners = self.mesh_rect().corners();
        let extra = corners.map(|p| {
            let o = p - center;
            [o.x, o.y, radii[0], radii[1], radii[2], radii[3]]
        });
        let mut mesh = Mesh::new(2 + 4 + 6);
        push_quad(&mut mesh, corners, color, extra);
        mesh
    }
}

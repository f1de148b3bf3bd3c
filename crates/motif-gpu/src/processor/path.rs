use motif_core::{Color, Matrix, MotifError, Result, Vec2};

use super::push_vertex;
use crate::draw::Mesh;
use crate::program::{AttributeFormat, VertexAttribute};

pub(super) const ATTRIBUTES: &[VertexAttribute] =
    &[VertexAttribute::new("edge_coverage", AttributeFormat::Float)];

pub(super) const COVERAGE_CODE: &str = "    coverage = clamp(in.edge_coverage, 0.0, 1.0);\n";

/// Pre-triangulated path geometry, optionally with a per-vertex coverage
/// ramp for antialiased edges.
#[derive(Debug, Clone, PartialEq)]
pub struct PathGeometry {
    /// Triangle list in local coordinates.
    pub vertices: Vec<Vec2>,
    pub coverage: Option<Vec<f32>>,
    pub view_matrix: Matrix,
    pub color: Color,
}

impl PathGeometry {
    pub fn new(vertices: Vec<Vec2>, color: Color) -> Result<Self> {
        if vertices.len() % 3 != 0 {
            return Err(MotifError::InvalidParameter(format!(
                "triangle list needs a multiple of 3 vertices, got {}",
                vertices.len()
            )));
        }
        Ok(Self {
            vertices,
            coverage: None,
            view_matrix: Matrix::IDENTITY,
            color,
        })
    }

    /// Fan-triangulate a convex polygon.
    pub fn convex_polygon(points: &[Vec2], color: Color) -> Result<Self> {
        if points.len() < 3 {
            return Err(MotifError::InvalidParameter(
                "polygon needs at least 3 points".into(),
            ));
        }
        let vertices = (1..points.len() - 1)
            .flat_map(|i| [points[0], points[i], points[i + 1]])
            .collect();
        Self::new(vertices, color)
    }

    pub fn with_matrix(mut self, view_matrix: Matrix) -> Self {
        self.view_matrix = view_matrix;
        self
    }

    pub fn with_coverage(mut self, coverage: Vec<f32>) -> Result<Self> {
        if coverage.len() != self.vertices.len() {
            return Err(MotifError::InvalidParameter(format!(
                "{} coverage values for {} vertices",
                coverage.len(),
                self.vertices.len()
            )));
        }
        self.coverage = Some(coverage);
        Ok(self)
    }

    pub(super) fn build_mesh(&self, color: [f32; 4]) -> Mesh {
        match &self.coverage {
            Some(ramp) => {
                let mut mesh = Mesh::new(2 + 4 + 1);
                for (p, c) in self.vertices.iter().zip(ramp) {
                    push_vertex(&mut mesh, *p, color, &[*c]);
                }
                mesh
            }
            None => {
                let mut mesh = Mesh::new(2 + 4);
                for p in &self.vertices {
                    push_vertex(&mut mesh, *p, color, &[]);
                }
                mesh
            }
        }
    }
}

use motif_core::{Color, Matrix, Rect};

use super::push_quad;
use crate::draw::Mesh;
use crate::program::{AttributeFormat, VertexAttribute};

pub(super) const ATTRIBUTES: &[VertexAttribute] =
    &[VertexAttribute::new("local_coord", AttributeFormat::Float2)];

/// A filled rectangle. Coord transforms read `local_rect` coordinates when
/// given, the position otherwise.
#[derive(Debug, Clone, PartialEq)]
pub struct RectGeometry {
    pub rect: Rect,
    pub local_rect: Option<Rect>,
    pub view_matrix: Matrix,
    pub color: Color,
}

impl RectGeometry {
    pub fn new(rect: Rect, color: Color) -> Self {
        Self {
            rect,
            local_rect: None,
            view_matrix: Matrix::IDENTITY,
            color,
        }
    }

    pub fn with_matrix(mut self, view_matrix: Matrix) -> Self {
        self.view_matrix = view_matrix;
        self
    }

    pub fn with_local_rect(mut self, local_rect: Rect) -> Self {
        self.local_rect = Some(local_rect);
        self
    }

    pub(super) fn build_mesh(&self, color: [f32; 4]) -> Mesh {
        let corners = self.rect.corners();
        match self.local_rect {
            Some(local) => {
                let mut mesh = Mesh::new(2 + 4 + 2);
                push_quad(&mut mesh, corners, color, local.corners().map(|p| [p.x, p.y]));
                mesh
            }
            None => {
                let mut mesh = Mesh::new(2 + 4);
                push_quad(&mut mesh, corners, color, [[]; 4]);
                mesh
            }
        }
    }
}

//! Image origin conventions.
//!
//! Every texture and surface records which screen edge its memory row 0
//! holds. Two textures with different origins need a vertical flip to line
//! up physically corresponding pixels.

use serde::{Deserialize, Serialize};

use crate::geometry::{IRect, Matrix};

/// Which screen edge corresponds to row 0 of the underlying memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ImageOrigin {
    /// Row 0 is the top edge.
    #[default]
    TopLeft,
    /// Row 0 is the bottom edge (OpenGL default framebuffer layout).
    BottomLeft,
}

impl ImageOrigin {
    /// The other origin.
    #[inline]
    pub fn flipped(self) -> Self {
        match self {
            Self::TopLeft => Self::BottomLeft,
            Self::BottomLeft => Self::TopLeft,
        }
    }

    /// Memory row holding logical (top-down) row `row` of an image of `height` rows.
    #[inline]
    pub fn memory_row(self, row: u32, height: u32) -> u32 {
        match self {
            Self::TopLeft => row,
            Self::BottomLeft => height - 1 - row,
        }
    }

    /// Memory-space rectangle holding the logical rectangle `rect` of an
    /// image of `height` rows.
    pub fn memory_rect(self, rect: IRect, height: u32) -> IRect {
        match self {
            Self::TopLeft => rect,
            Self::BottomLeft => {
                let h = height as i32;
                IRect::new(rect.left, h - rect.bottom, rect.right, h - rect.top)
            }
        }
    }

    /// Maps top-down normalized texture coordinates to normalized memory
    /// coordinates.
    pub fn normalized_matrix(self) -> Matrix {
        match self {
            Self::TopLeft => Matrix::IDENTITY,
            Self::BottomLeft => Matrix::flip_y(1.0),
        }
    }
}

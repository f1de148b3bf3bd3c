//! Geometric primitives for 2D transformations.

use bytemuck::{Pod, Zeroable};
use glam::{Affine2, Mat3, Vec2 as GlamVec2};
use serde::{Deserialize, Serialize};

/// 2D vector.
pub type Vec2 = GlamVec2;

/// Axis-aligned rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, Pod, Zeroable)]
#[repr(C)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    /// Create a new rectangle.
    #[inline]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle at the origin with the given size.
    #[inline]
    pub const fn from_size(width: f32, height: f32) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    /// Create a rectangle from two corners.
    pub fn from_corners(min: Vec2, max: Vec2) -> Self {
        Self {
            x: min.x,
            y: min.y,
            width: max.x - min.x,
            height: max.y - min.y,
        }
    }

    #[inline]
    pub fn left(self) -> f32 {
        self.x
    }

    #[inline]
    pub fn top(self) -> f32 {
        self.y
    }

    #[inline]
    pub fn right(self) -> f32 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(self) -> f32 {
        self.y + self.height
    }

    /// Minimum corner (top-left).
    #[inline]
    pub fn min(self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    /// Maximum corner (bottom-right).
    #[inline]
    pub fn max(self) -> Vec2 {
        Vec2::new(self.x + self.width, self.y + self.height)
    }

    /// Center point.
    #[inline]
    pub fn center(self) -> Vec2 {
        Vec2::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    /// Size as a vector.
    #[inline]
    pub fn size(self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    /// Whether the rectangle covers no area.
    #[inline]
    pub fn is_empty(self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// The four corners, clockwise from the top-left.
    pub fn corners(self) -> [Vec2; 4] {
        [
            Vec2::new(self.left(), self.top()),
            Vec2::new(self.right(), self.top()),
            Vec2::new(self.right(), self.bottom()),
            Vec2::new(self.left(), self.bottom()),
        ]
    }

    /// Compute intersection with another rectangle.
    pub fn intersection(self, other: Self) -> Option<Self> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());

        if x1 < x2 && y1 < y2 {
            Some(Self::new(x1, y1, x2 - x1, y2 - y1))
        } else {
            None
        }
    }

    /// Smallest integer rectangle containing this one.
    pub fn round_out(self) -> IRect {
        IRect::new(
            self.left().floor() as i32,
            self.top().floor() as i32,
            self.right().ceil() as i32,
            self.bottom().ceil() as i32,
        )
    }

    /// Bounding box of a set of points. Empty input yields the zero rect.
    pub fn bounds_of(points: impl IntoIterator<Item = Vec2>) -> Self {
        let mut iter = points.into_iter();
        let Some(first) = iter.next() else {
            return Self::default();
        };
        let (min, max) = iter.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));
        Self::from_corners(min, max)
    }
}

/// Integer rectangle in pixel units, stored as edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl IRect {
    #[inline]
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle at the origin with the given size.
    #[inline]
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    #[inline]
    pub fn width(self) -> u32 {
        (self.right - self.left).max(0) as u32
    }

    #[inline]
    pub fn height(self) -> u32 {
        (self.bottom - self.top).max(0) as u32
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    /// Overlap of two rectangles, `None` when they do not intersect.
    pub fn intersect(self, other: Self) -> Option<Self> {
        let r = Self::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        (!r.is_empty()).then_some(r)
    }

    pub fn to_rect(self) -> Rect {
        Rect::new(
            self.left as f32,
            self.top as f32,
            self.width() as f32,
            self.height() as f32,
        )
    }
}

/// 2D affine transformation matrix.
///
/// Equality is exact; callers that cache a matrix to skip GPU uploads rely
/// on that.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    inner: Affine2,
}

impl Matrix {
    /// Identity transform.
    pub const IDENTITY: Self = Self {
        inner: Affine2::IDENTITY,
    };

    /// Create a translation transform.
    #[inline]
    pub fn translate(x: f32, y: f32) -> Self {
        Self {
            inner: Affine2::from_translation(Vec2::new(x, y)),
        }
    }

    /// Create a scale transform.
    #[inline]
    pub fn scale(x: f32, y: f32) -> Self {
        Self {
            inner: Affine2::from_scale(Vec2::new(x, y)),
        }
    }

    /// Build from the six affine coefficients: `x' = a*x + c*y + tx`,
    /// `y' = b*x + d*y + ty`.
    pub fn from_coefficients(a: f32, b: f32, c: f32, d: f32, tx: f32, ty: f32) -> Self {
        Self {
            inner: Affine2::from_cols_array(&[a, b, c, d, tx, ty]),
        }
    }

    /// Transform that maps `y` to `height - y`.
    pub fn flip_y(height: f32) -> Self {
        Self::from_coefficients(1.0, 0.0, 0.0, -1.0, 0.0, height)
    }

    /// Apply `self` first, then `next`.
    #[inline]
    pub fn then(self, next: Self) -> Self {
        Self {
            inner: next.inner * self.inner,
        }
    }

    /// Transform a point.
    #[inline]
    pub fn map_point(self, point: Vec2) -> Vec2 {
        self.inner.transform_point2(point)
    }

    /// Bounding box of the transformed rectangle.
    pub fn map_rect(self, rect: Rect) -> Rect {
        Rect::bounds_of(rect.corners().into_iter().map(|p| self.map_point(p)))
    }

    /// Inverse transform, or `None` when the matrix is singular.
    pub fn invert(self) -> Option<Self> {
        let det = self.inner.matrix2.determinant();
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        Some(Self {
            inner: self.inner.inverse(),
        })
    }

    /// Convert to a 3x3 matrix for GPU upload.
    pub fn to_mat3(self) -> Mat3 {
        Mat3::from(self.inner)
    }

    /// The six affine coefficients in the order accepted by
    /// [`Matrix::from_coefficients`].
    pub fn coefficients(self) -> [f32; 6] {
        self.inner.to_cols_array()
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

//! Motif Core - Foundation types for the animation renderer
//!
//! This crate provides the fundamental types shared by the GPU backend:
//! - Error type and result alias
//! - Geometric primitives (Rect, IRect, Matrix)
//! - Premultiplied colors
//! - Image origin conventions
//! - CPU-side RGBA8 frame buffers

pub mod color;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod origin;

pub use color::Color;
pub use error::{MotifError, Result};
pub use frame::{FrameBuffer, PixelFormat};
pub use geometry::{IRect, Matrix, Rect, Vec2};
pub use origin::ImageOrigin;

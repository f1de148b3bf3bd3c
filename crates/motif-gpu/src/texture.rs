//! Backend-neutral texture handles.

use motif_core::{IRect, ImageOrigin, PixelFormat};

/// Identifier of a texture inside one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

/// Parameters for creating a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub origin: ImageOrigin,
}

impl TextureDesc {
    /// An RGBA8 texture with the given origin.
    pub fn rgba(width: u32, height: u32, origin: ImageOrigin) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Rgba8,
            origin,
        }
    }

    /// Memory usage estimate in bytes.
    pub fn memory_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

/// A texture owned by a backend, plus what the core needs to know about it.
///
/// Every texture doubles as a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendTexture {
    pub id: TextureId,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub origin: ImageOrigin,
}

impl BackendTexture {
    pub fn new(id: TextureId, desc: &TextureDesc) -> Self {
        Self {
            id,
            width: desc.width,
            height: desc.height,
            format: desc.format,
            origin: desc.origin,
        }
    }

    pub fn desc(&self) -> TextureDesc {
        TextureDesc {
            width: self.width,
            height: self.height,
            format: self.format,
            origin: self.origin,
        }
    }

    /// Full extent in device pixels.
    pub fn bounds(&self) -> IRect {
        IRect::from_size(self.width, self.height)
    }

    pub fn memory_size(&self) -> usize {
        self.desc().memory_size()
    }
}

//! Uniform handles, uniform-buffer layout and the upload capability.
//!
//! Backends implement [`UniformUploader`]. Everything in the core pushes
//! through a [`ProgramDataManager`], which owns the policy: unresolved
//! handles are dropped silently, and handles resolved against another
//! program generation never reach the backend.

use glam::Mat3;
use tracing::{trace, warn};

/// Backend-side slot index of a uniform inside one linked program.
pub type UniformLocation = u32;

/// Opaque token naming a uniform slot inside one compiled program.
///
/// Only valid for the program generation it was resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformHandle {
    location: UniformLocation,
    generation: u64,
}

impl UniformHandle {
    /// Sentinel for a uniform that is absent from the program, typically
    /// because the compiler eliminated it for the current shader branch.
    pub const INVALID: Self = Self {
        location: UniformLocation::MAX,
        generation: 0,
    };

    pub(crate) fn new(location: UniformLocation, generation: u64) -> Self {
        Self {
            location,
            generation,
        }
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.location != UniformLocation::MAX
    }

    #[inline]
    pub fn location(self) -> Option<UniformLocation> {
        self.is_valid().then_some(self.location)
    }

    /// Generation of the program this handle was resolved against.
    #[inline]
    pub fn generation(self) -> u64 {
        self.generation
    }
}

impl Default for UniformHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Shapes of values a uniform can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    Float,
    Float2,
    Float4,
    Mat3,
}

impl UniformType {
    /// WGSL type name.
    pub fn wgsl(self) -> &'static str {
        match self {
            Self::Float => "f32",
            Self::Float2 => "vec2<f32>",
            Self::Float4 => "vec4<f32>",
            Self::Mat3 => "mat3x3<f32>",
        }
    }

    /// Size in a WGSL uniform buffer.
    pub fn size(self) -> u32 {
        match self {
            Self::Float => 4,
            Self::Float2 => 8,
            Self::Float4 => 16,
            Self::Mat3 => 48,
        }
    }

    /// Alignment in a WGSL uniform buffer.
    pub fn align(self) -> u32 {
        match self {
            Self::Float => 4,
            Self::Float2 => 8,
            Self::Float4 | Self::Mat3 => 16,
        }
    }
}

/// A uniform declared by a shader stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniformDecl {
    pub name: String,
    pub ty: UniformType,
}

impl UniformDecl {
    pub fn new(name: impl Into<String>, ty: UniformType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A concrete uniform value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Float2([f32; 2]),
    Float4([f32; 4]),
    Mat3(Mat3),
}

/// One member of the generated `Uniforms` struct.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformSlot {
    pub name: String,
    pub ty: UniformType,
    pub offset: u32,
}

/// Byte layout of a program's uniform block, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformLayout {
    slots: Vec<UniformSlot>,
    size: u32,
}

impl UniformLayout {
    pub fn new(decls: &[UniformDecl]) -> Self {
        let mut offset = 0u32;
        let mut slots = Vec::with_capacity(decls.len());
        for decl in decls {
            offset = align_to(offset, decl.ty.align());
            slots.push(UniformSlot {
                name: decl.name.clone(),
                ty: decl.ty,
                offset,
            });
            offset += decl.ty.size();
        }
        Self {
            slots,
            size: align_to(offset.max(16), 16),
        }
    }

    /// Total size of the block, rounded up to 16 bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn slots(&self) -> &[UniformSlot] {
        &self.slots
    }

    pub fn slot(&self, location: UniformLocation) -> Option<&UniformSlot> {
        self.slots.get(location as usize)
    }

    /// Index of the named member.
    pub fn find(&self, name: &str) -> Option<UniformLocation> {
        self.slots
            .iter()
            .position(|s| s.name == name)
            .map(|i| i as UniformLocation)
    }

    /// Serialize `value` into `block` at the slot's offset. Mismatched
    /// shapes and out-of-range locations are ignored.
    pub fn write(&self, block: &mut [u8], location: UniformLocation, value: &UniformValue) {
        let Some(slot) = self.slot(location) else {
            return;
        };
        let start = slot.offset as usize;
        match (slot.ty, value) {
            (UniformType::Float, UniformValue::Float(v)) => {
                write_floats(block, start, &[*v]);
            }
            (UniformType::Float2, UniformValue::Float2(v)) => {
                write_floats(block, start, v);
            }
            (UniformType::Float4, UniformValue::Float4(v)) => {
                write_floats(block, start, v);
            }
            (UniformType::Mat3, UniformValue::Mat3(m)) => {
                // Each column is padded to a vec4.
                for (i, col) in [m.x_axis, m.y_axis, m.z_axis].iter().enumerate() {
                    write_floats(block, start + i * 16, &[col.x, col.y, col.z, 0.0]);
                }
            }
            (ty, value) => {
                warn!(slot = %slot.name, ?ty, ?value, "Uniform shape mismatch");
            }
        }
    }
}

/// Read-only view of the values currently stored for a program, as seen by
/// CPU shader kernels. Never-uploaded slots read as zero, like a freshly
/// zeroed uniform buffer.
#[derive(Clone, Copy)]
pub struct UniformValues<'a> {
    layout: &'a UniformLayout,
    values: &'a [Option<UniformValue>],
}

impl<'a> UniformValues<'a> {
    pub fn new(layout: &'a UniformLayout, values: &'a [Option<UniformValue>]) -> Self {
        Self { layout, values }
    }

    pub fn get(&self, name: &str) -> Option<UniformValue> {
        let location = self.layout.find(name)?;
        self.values.get(location as usize).copied().flatten()
    }

    pub fn float(&self, name: &str) -> f32 {
        match self.get(name) {
            Some(UniformValue::Float(v)) => v,
            _ => 0.0,
        }
    }

    pub fn vec2(&self, name: &str) -> [f32; 2] {
        match self.get(name) {
            Some(UniformValue::Float2(v)) => v,
            _ => [0.0; 2],
        }
    }

    pub fn vec4(&self, name: &str) -> [f32; 4] {
        match self.get(name) {
            Some(UniformValue::Float4(v)) => v,
            _ => [0.0; 4],
        }
    }

    pub fn mat3(&self, name: &str) -> Mat3 {
        match self.get(name) {
            Some(UniformValue::Mat3(m)) => m,
            _ => Mat3::ZERO,
        }
    }
}

fn write_floats(block: &mut [u8], start: usize, values: &[f32]) {
    let bytes: &[u8] = bytemuck::cast_slice(values);
    if let Some(dst) = block.get_mut(start..start + bytes.len()) {
        dst.copy_from_slice(bytes);
    }
}

fn align_to(value: u32, align: u32) -> u32 {
    (value + align - 1) / align * align
}

/// Upload capability over the active graphics context.
///
/// Uploads target the currently bound program.
pub trait UniformUploader {
    fn set_1f(&mut self, location: UniformLocation, v: f32);

    fn set_2f(&mut self, location: UniformLocation, x: f32, y: f32);

    fn set_4f(&mut self, location: UniformLocation, v: [f32; 4]);

    fn set_matrix3f(&mut self, location: UniformLocation, m: &Mat3);
}

/// Wraps the uploader for one bound program.
pub struct ProgramDataManager<'a> {
    uploader: &'a mut dyn UniformUploader,
    generation: u64,
    uploads: usize,
}

impl<'a> ProgramDataManager<'a> {
    pub fn new(uploader: &'a mut dyn UniformUploader, generation: u64) -> Self {
        Self {
            uploader,
            generation,
            uploads: 0,
        }
    }

    /// Generation of the bound program.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of values that reached the backend so far.
    pub fn uploads(&self) -> usize {
        self.uploads
    }

    pub fn set_1f(&mut self, handle: UniformHandle, v: f32) {
        if let Some(location) = self.resolve(handle) {
            self.uploader.set_1f(location, v);
        }
    }

    pub fn set_2f(&mut self, handle: UniformHandle, x: f32, y: f32) {
        if let Some(location) = self.resolve(handle) {
            self.uploader.set_2f(location, x, y);
        }
    }

    pub fn set_4f(&mut self, handle: UniformHandle, v: [f32; 4]) {
        if let Some(location) = self.resolve(handle) {
            self.uploader.set_4f(location, v);
        }
    }

    pub fn set_matrix3f(&mut self, handle: UniformHandle, m: &Mat3) {
        if let Some(location) = self.resolve(handle) {
            self.uploader.set_matrix3f(location, m);
        }
    }

    fn resolve(&mut self, handle: UniformHandle) -> Option<UniformLocation> {
        let Some(location) = handle.location() else {
            trace!("Skipping upload to unresolved uniform");
            return None;
        };
        if handle.generation != self.generation {
            warn!(
                handle_generation = handle.generation,
                program_generation = self.generation,
                "Dropping upload through a handle from another program"
            );
            return None;
        }
        self.uploads += 1;
        Some(location)
    }
}

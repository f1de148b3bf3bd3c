//! Shader recipes, linked programs and the program cache.
//!
//! A [`ShaderRecipe`] captures the configuration shape of a draw. Every draw
//! with the same recipe shares one linked [`Program`]; draws differ only in
//! the uniform values pushed before they are issued.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use motif_core::{MotifError, Result};
use smallvec::SmallVec;
use tracing::debug;

use crate::backend::GpuBackend;
use crate::filter::FilterKernel;
use crate::fragment::ShadingShape;
use crate::processor::GeometryShape;
use crate::uniform::{UniformDecl, UniformHandle, UniformLayout};
use crate::xfer::XferProcessor;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Fresh program generation. Unique for the lifetime of the process.
pub(crate) fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Accumulates the 32-bit words of a recipe.
#[derive(Debug, Default)]
pub struct KeyBuilder {
    words: SmallVec<[u32; 8]>,
}

impl KeyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, word: u32) -> &mut Self {
        self.words.push(word);
        self
    }

    pub fn add_bool(&mut self, flag: bool) -> &mut Self {
        self.add(flag as u32)
    }

    pub fn finish(self) -> ShaderRecipe {
        ShaderRecipe { words: self.words }
    }
}

/// Deterministic key of a compilable shader source pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderRecipe {
    words: SmallVec<[u32; 8]>,
}

impl ShaderRecipe {
    pub fn words(&self) -> &[u32] {
        &self.words
    }
}

/// Backend identifier of a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeFormat {
    Float,
    Float2,
    Float4,
}

impl AttributeFormat {
    pub fn components(self) -> usize {
        match self {
            Self::Float => 1,
            Self::Float2 => 2,
            Self::Float4 => 4,
        }
    }

    pub fn wgsl(self) -> &'static str {
        match self {
            Self::Float => "f32",
            Self::Float2 => "vec2<f32>",
            Self::Float4 => "vec4<f32>",
        }
    }
}

/// A per-vertex input, in the order it is interleaved in the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub name: &'static str,
    pub format: AttributeFormat,
}

impl VertexAttribute {
    pub const fn new(name: &'static str, format: AttributeFormat) -> Self {
        Self { name, format }
    }
}

/// Which texture inputs a program samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SamplerBindings {
    pub src: bool,
    pub dst: bool,
}

/// Shape of a geometry program, as interpreted by the software backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryKernel {
    pub shape: GeometryShape,
    pub shading: ShadingShape,
    pub xfer: XferProcessor,
    pub coord_transforms: usize,
}

/// CPU-evaluable description of what a program computes.
#[derive(Debug, Clone)]
pub enum ProgramKernel {
    Geometry(GeometryKernel),
    Filter(Arc<dyn FilterKernel>),
}

/// Everything a backend needs to create a program.
#[derive(Debug, Clone)]
pub struct ProgramSource {
    pub label: String,
    /// Complete WGSL module with `vs_main` and `fs_main` entry points.
    pub wgsl: String,
    pub attributes: Vec<VertexAttribute>,
    pub uniforms: Vec<UniformDecl>,
    pub samplers: SamplerBindings,
    pub kernel: ProgramKernel,
}

impl ProgramSource {
    /// Floats per interleaved vertex.
    pub fn vertex_stride(&self) -> usize {
        self.attributes.iter().map(|a| a.format.components()).sum()
    }

    pub fn uniform_layout(&self) -> UniformLayout {
        UniformLayout::new(&self.uniforms)
    }

    /// Whether the WGSL reads `u.<name>` as a whole member access. Backends
    /// report no location for declared uniforms that are never read.
    pub fn reads_uniform(&self, name: &str) -> bool {
        let needle = format!("u.{name}");
        let is_ident = |c: char| c.is_alphanumeric() || c == '_';
        self.wgsl.match_indices(&needle).any(|(at, _)| {
            let before = self.wgsl[..at].chars().next_back();
            let after = self.wgsl[at + needle.len()..].chars().next();
            !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
        })
    }
}

/// A linked program and its resolved uniform handles.
#[derive(Debug)]
pub struct Program {
    id: ProgramId,
    recipe: ShaderRecipe,
    generation: u64,
    handles: HashMap<String, UniformHandle>,
}

impl Program {
    /// Create the program on the backend and resolve every declared uniform.
    /// Uniforms the backend eliminated resolve to [`UniformHandle::INVALID`].
    pub fn link(
        backend: &mut dyn GpuBackend,
        recipe: ShaderRecipe,
        source: &ProgramSource,
    ) -> Result<Self> {
        let id = backend.create_program(source)?;
        let generation = next_generation();
        let handles = source
            .uniforms
            .iter()
            .map(|decl| {
                let handle = backend
                    .uniform_location(id, &decl.name)
                    .map_or(UniformHandle::INVALID, |loc| {
                        UniformHandle::new(loc, generation)
                    });
                (decl.name.clone(), handle)
            })
            .collect();
        debug!(label = %source.label, ?id, generation, "Linked program");
        Ok(Self {
            id,
            recipe,
            generation,
            handles,
        })
    }

    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn recipe(&self) -> &ShaderRecipe {
        &self.recipe
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Handle of the named uniform, or the sentinel when it is absent.
    pub fn uniform(&self, name: &str) -> UniformHandle {
        self.handles
            .get(name)
            .copied()
            .unwrap_or(UniformHandle::INVALID)
    }
}

/// A cached program plus the per-program state its users keep.
#[derive(Debug)]
pub struct CacheEntry<P> {
    pub program: Program,
    pub state: P,
    last_used: u64,
}

/// Recipe-keyed program cache with LRU eviction.
pub struct ProgramCache<P> {
    label: &'static str,
    entries: HashMap<ShaderRecipe, CacheEntry<P>>,
    capacity: usize,
    clock: u64,
    built: u64,
}

impl<P> ProgramCache<P> {
    pub fn new(label: &'static str, capacity: usize) -> Self {
        Self {
            label,
            entries: HashMap::new(),
            capacity: capacity.max(1),
            clock: 0,
            built: 0,
        }
    }

    /// Look up the program for `recipe`, linking it on a miss. Returns the
    /// entry and whether it was linked by this call.
    pub fn find_or_link<B, I>(
        &mut self,
        backend: &mut dyn GpuBackend,
        recipe: &ShaderRecipe,
        build: B,
        init: I,
    ) -> Result<(&mut CacheEntry<P>, bool)>
    where
        B: FnOnce() -> ProgramSource,
        I: FnOnce(&Program) -> P,
    {
        self.clock += 1;
        let linked = !self.entries.contains_key(recipe);
        if linked {
            if self.entries.len() >= self.capacity {
                self.evict_lru(backend);
            }
            let source = build();
            let program = Program::link(backend, recipe.clone(), &source)?;
            let state = init(&program);
            self.built += 1;
            self.entries.insert(
                recipe.clone(),
                CacheEntry {
                    program,
                    state,
                    last_used: 0,
                },
            );
        }
        let clock = self.clock;
        let entry = self.entries.get_mut(recipe).ok_or_else(|| {
            MotifError::Internal(format!("{} cache lost a fresh entry", self.label))
        })?;
        entry.last_used = clock;
        Ok((entry, linked))
    }

    fn evict_lru(&mut self, backend: &mut dyn GpuBackend) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(k, _)| k.clone());
        if let Some(entry) = oldest.and_then(|k| self.entries.remove(&k)) {
            debug!(cache = self.label, id = ?entry.program.id, "Evicted program");
            backend.delete_program(entry.program.id);
        }
    }

    pub fn get(&self, recipe: &ShaderRecipe) -> Option<&CacheEntry<P>> {
        self.entries.get(recipe)
    }

    pub fn contains(&self, recipe: &ShaderRecipe) -> bool {
        self.entries.contains_key(recipe)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Programs linked since creation.
    pub fn programs_built(&self) -> u64 {
        self.built
    }

    /// Delete every program. The next draw of each recipe rebuilds it under
    /// a new generation.
    pub fn purge(&mut self, backend: &mut dyn GpuBackend) {
        for (_, entry) in self.entries.drain() {
            backend.delete_program(entry.program.id);
        }
        debug!(cache = self.label, "Purged programs");
    }

    /// Drop every entry without backend calls; the context that owned the
    /// programs is gone.
    pub fn abandon(&mut self) {
        let dropped = self.entries.len();
        self.entries.clear();
        debug!(cache = self.label, dropped, "Abandoned programs");
    }
}

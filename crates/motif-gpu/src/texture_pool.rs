//! Texture pool for destination snapshots.
//!
//! Snapshots live for a single draw. The pool keeps released textures keyed
//! by (width, height, format) so the next draw of the same size reuses one
//! instead of allocating.

use std::collections::HashMap;

use motif_core::{PixelFormat, Result};
use tracing::debug;

use crate::backend::GpuBackend;
use crate::texture::{BackendTexture, TextureDesc};

/// Key for pooled textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TextureKey {
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl TextureKey {
    fn of(desc: &TextureDesc) -> Self {
        Self {
            width: desc.width,
            height: desc.height,
            format: desc.format,
        }
    }
}

/// Pool of reusable backend textures.
pub struct TexturePool {
    /// Available (free) textures, keyed by dimensions + format.
    free: HashMap<TextureKey, Vec<BackendTexture>>,
    /// Total memory used by all pooled textures.
    total_memory: usize,
    /// Maximum memory budget for the pool.
    max_memory: usize,
    hits: u64,
    misses: u64,
}

impl TexturePool {
    /// Create a new texture pool with the given memory budget.
    pub fn new(max_memory: usize) -> Self {
        Self {
            free: HashMap::new(),
            total_memory: 0,
            max_memory,
            hits: 0,
            misses: 0,
        }
    }

    /// Acquire a texture from the pool or create a new one.
    ///
    /// The returned texture carries the requested origin; origin is
    /// bookkeeping only, so pooled textures are shared across origins.
    pub fn acquire(
        &mut self,
        backend: &mut dyn GpuBackend,
        desc: &TextureDesc,
    ) -> Result<BackendTexture> {
        if let Some(textures) = self.free.get_mut(&TextureKey::of(desc)) {
            if let Some(mut tex) = textures.pop() {
                self.total_memory -= tex.memory_size();
                self.hits += 1;
                tex.origin = desc.origin;
                return Ok(tex);
            }
        }

        self.misses += 1;
        backend.create_texture(desc)
    }

    /// Return a texture to the pool for reuse.
    pub fn release(&mut self, backend: &mut dyn GpuBackend, texture: BackendTexture) {
        let mem = texture.memory_size();

        // Over budget: delete it instead.
        if self.total_memory + mem > self.max_memory {
            backend.delete_texture(&texture);
            return;
        }

        self.total_memory += mem;
        self.free
            .entry(TextureKey::of(&texture.desc()))
            .or_default()
            .push(texture);
    }

    /// Total memory used by pooled (free) textures.
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    /// Number of textures in the pool.
    pub fn texture_count(&self) -> usize {
        self.free.values().map(|v| v.len()).sum()
    }

    /// (reused, allocated) counts since creation.
    pub fn hit_stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    /// Delete every pooled texture.
    pub fn purge(&mut self, backend: &mut dyn GpuBackend) {
        for tex in self.free.drain().flat_map(|(_, v)| v) {
            backend.delete_texture(&tex);
        }
        self.total_memory = 0;
    }

    /// Forget every pooled texture without touching the backend. Used after
    /// the context was lost and the handles are already dead.
    pub fn abandon(&mut self) {
        let dropped = self.texture_count();
        self.free.clear();
        self.total_memory = 0;
        debug!(dropped, "Abandoned pooled textures");
    }

    /// Evict textures until memory is at or below the target.
    pub fn evict_to(&mut self, backend: &mut dyn GpuBackend, target_memory: usize) {
        while self.total_memory > target_memory {
            // Find the key with the most textures and remove one
            let key = self
                .free
                .iter()
                .filter(|(_, v)| !v.is_empty())
                .max_by_key(|(_, v)| v.len())
                .map(|(k, _)| *k);

            let Some(key) = key else {
                break;
            };
            if let Some(textures) = self.free.get_mut(&key) {
                if let Some(tex) = textures.pop() {
                    self.total_memory -= tex.memory_size();
                    backend.delete_texture(&tex);
                }
                if textures.is_empty() {
                    self.free.remove(&key);
                }
            }
        }
    }
}

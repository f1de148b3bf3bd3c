//! Renderer configuration.

use motif_core::Result;
use serde::{Deserialize, Serialize};

/// How destination snapshots are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DstCopyStrategy {
    /// Copy the framebuffer directly when the backend can, otherwise draw.
    #[default]
    Auto,
    /// Always render the snapshot through a textured draw.
    ForceDraw,
}

/// Tunables of a [`crate::Context`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Bytes of free snapshot textures the pool may retain.
    pub texture_pool_budget: usize,
    /// Capacity of each program cache before LRU eviction.
    pub max_cached_programs: usize,
    pub dst_copy: DstCopyStrategy,
    /// Snapshots wider or taller than this are refused.
    pub max_snapshot_dimension: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            texture_pool_budget: 64 * 1024 * 1024,
            max_cached_programs: 256,
            dst_copy: DstCopyStrategy::Auto,
            max_snapshot_dimension: 8192,
        }
    }
}

impl RenderConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

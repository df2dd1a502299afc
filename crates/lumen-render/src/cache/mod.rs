// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Get-or-create caches for render passes, samplers and pipelines.
//!
//! Every cache maps a stable identity to one shared device object. Entries
//! live until the renderer is torn down; there is no eviction.

mod pipeline;
mod render_pass;
mod resource_cache;
mod sampler;

pub use self::pipeline::{GraphicsPipeline, PipelineCache, PipelineSignature};
pub use self::render_pass::{
    AttachmentFormats, RenderPassCache, RenderPassFlags, RenderPassHandle, RenderPassKey,
};
pub use self::resource_cache::ResourceCache;
pub use self::sampler::{sampler_descriptor, SamplerCache, SamplerFlags, SamplerHandle, SamplerKind};

/// Counters of one cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently cached.
    pub entries: usize,
    /// Lookups answered from the cache.
    pub hits: usize,
    /// Entries created.
    pub creations: usize,
}

impl CacheStats {
    fn of<K: Eq + std::hash::Hash + Clone, V>(cache: &ResourceCache<K, V>) -> Self {
        Self {
            entries: cache.len(),
            hits: cache.hits(),
            creations: cache.creations(),
        }
    }
}

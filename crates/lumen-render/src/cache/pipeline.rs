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

use super::{CacheStats, ResourceCache};
use lumen_core::renderer::api::{
    GraphicsPipelineDescriptor, PipelineLayoutId, RenderPassId, RenderPipelineId,
};
use lumen_core::renderer::{GraphicsDevice, ResourceError};
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;

// Fixed seeds keep signatures stable for the lifetime of the process and
// across runs.
const SIGNATURE_SEEDS: [u64; 4] = [
    0x9e37_79b9_7f4a_7c15,
    0xbf58_476d_1ce4_e5b9,
    0x94d0_49bb_1331_11eb,
    0x2545_f491_4f6c_dd1d,
];

/// A structural hash of everything that defines a graphics pipeline.
///
/// Two descriptors that differ only in their label share a signature; any
/// other difference (shaders, entry points, vertex layouts, fixed-function
/// state, render pass or layout) yields a different one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineSignature(pub u64);

impl PipelineSignature {
    /// Computes the signature of `descriptor`.
    pub fn of(descriptor: &GraphicsPipelineDescriptor) -> Self {
        let mut hasher = ahash::RandomState::with_seeds(
            SIGNATURE_SEEDS[0],
            SIGNATURE_SEEDS[1],
            SIGNATURE_SEEDS[2],
            SIGNATURE_SEEDS[3],
        )
        .build_hasher();
        descriptor.layout.hash(&mut hasher);
        descriptor.render_pass.hash(&mut hasher);
        descriptor.vertex.hash(&mut hasher);
        descriptor.fragment.hash(&mut hasher);
        descriptor.vertex_buffers.hash(&mut hasher);
        descriptor.topology.hash(&mut hasher);
        descriptor.cull_mode.hash(&mut hasher);
        descriptor.front_face.hash(&mut hasher);
        descriptor.blend.hash(&mut hasher);
        descriptor.color_format.hash(&mut hasher);
        descriptor.depth_stencil.hash(&mut hasher);
        descriptor.sample_count.hash(&mut hasher);
        Self(hasher.finish())
    }
}

/// The label-free copy of a descriptor the cache is keyed by, so two
/// pipelines whose signatures collide are still told apart.
fn structural_key(descriptor: &GraphicsPipelineDescriptor) -> GraphicsPipelineDescriptor {
    GraphicsPipelineDescriptor {
        label: None,
        ..descriptor.clone()
    }
}

/// A compiled pipeline living on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsPipeline {
    /// Device handle.
    pub id: RenderPipelineId,
    /// Structural signature.
    pub signature: PipelineSignature,
    /// Layout the pipeline was compiled against.
    pub layout: PipelineLayoutId,
    /// Render pass the pipeline was compiled for.
    pub render_pass: RenderPassId,
}

/// Graphics pipelines keyed by their descriptor, ignoring the label.
#[derive(Debug, Default)]
pub struct PipelineCache {
    cache: ResourceCache<GraphicsPipelineDescriptor, GraphicsPipeline>,
}

impl PipelineCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pipeline matching `descriptor`, compiling it on a miss.
    pub fn get_or_create(
        &self,
        device: &dyn GraphicsDevice,
        descriptor: &GraphicsPipelineDescriptor,
    ) -> Result<Arc<GraphicsPipeline>, ResourceError> {
        let key = structural_key(descriptor);
        self.cache.get_or_try_create(&key, || {
            let signature = PipelineSignature::of(descriptor);
            let id = device.create_render_pipeline(descriptor)?;
            log::debug!(
                "PipelineCache: compiled '{}' ({:?}, signature {:016x})",
                descriptor.label.as_deref().unwrap_or("unnamed"),
                id,
                signature.0
            );
            Ok(GraphicsPipeline {
                id,
                signature,
                layout: descriptor.layout,
                render_pass: descriptor.render_pass,
            })
        })
    }

    /// Looks up the pipeline compiled for `descriptor`, if any.
    pub fn get(&self, descriptor: &GraphicsPipelineDescriptor) -> Option<Arc<GraphicsPipeline>> {
        self.cache.get(&structural_key(descriptor))
    }

    /// Hit and creation counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats::of(&self.cache)
    }

    /// Destroys every cached pipeline. Returns the number of failures.
    pub fn release(&self, device: &dyn GraphicsDevice) -> usize {
        self.cache
            .drain()
            .into_iter()
            .filter(|(_, pipeline)| match device.destroy_render_pipeline(pipeline.id) {
                Ok(()) => false,
                Err(e) => {
                    log::error!("PipelineCache: failed to destroy {:?}: {e}", pipeline.id);
                    true
                }
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::renderer::api::{
        BlendMode, CullMode, FrontFace, PipelineLayoutDescriptor, PrimitiveTopology,
        RenderPassDescriptor, ShaderEntry, ShaderModuleId, TextureFormat,
    };
    use lumen_core::renderer::testing::RecordingDevice;
    use std::borrow::Cow;

    fn descriptor() -> GraphicsPipelineDescriptor {
        GraphicsPipelineDescriptor {
            label: Some(Cow::Borrowed("a")),
            layout: PipelineLayoutId(1),
            render_pass: RenderPassId(2),
            vertex: ShaderEntry {
                module: ShaderModuleId(3),
                entry_point: Cow::Borrowed("vs_main"),
            },
            fragment: Some(ShaderEntry {
                module: ShaderModuleId(3),
                entry_point: Cow::Borrowed("fs_main"),
            }),
            vertex_buffers: vec![],
            topology: PrimitiveTopology::TriangleList,
            cull_mode: CullMode::Back,
            front_face: FrontFace::Ccw,
            blend: BlendMode::Opaque,
            color_format: Some(TextureFormat::Bgra8UnormSrgb),
            depth_stencil: None,
            sample_count: 1,
        }
    }

    #[test]
    fn label_does_not_affect_signature() {
        let a = descriptor();
        let mut b = descriptor();
        b.label = Some(Cow::Borrowed("b"));
        assert_eq!(PipelineSignature::of(&a), PipelineSignature::of(&b));
    }

    #[test]
    fn defining_state_changes_signature() {
        let base = PipelineSignature::of(&descriptor());

        let mut blended = descriptor();
        blended.blend = BlendMode::AlphaBlend;
        assert_ne!(PipelineSignature::of(&blended), base);

        let mut other_pass = descriptor();
        other_pass.render_pass = RenderPassId(9);
        assert_ne!(PipelineSignature::of(&other_pass), base);

        let mut other_entry = descriptor();
        other_entry.vertex.entry_point = Cow::Borrowed("vs_instanced");
        assert_ne!(PipelineSignature::of(&other_entry), base);
    }

    #[test]
    fn distinct_descriptors_are_not_shared() {
        let device = RecordingDevice::new();
        let render_pass = device
            .create_render_pass(&RenderPassDescriptor {
                label: None,
                color: None,
                depth_stencil: None,
                present: false,
            })
            .unwrap();
        let layout = device
            .create_pipeline_layout(&PipelineLayoutDescriptor {
                label: None,
                set_layouts: vec![],
                push_constant_ranges: vec![],
            })
            .unwrap();
        let base = GraphicsPipelineDescriptor {
            layout,
            render_pass,
            ..descriptor()
        };
        let cache = PipelineCache::new();
        let first = cache.get_or_create(&device, &base).unwrap();

        let relabeled = GraphicsPipelineDescriptor {
            label: Some(Cow::Borrowed("b")),
            ..base.clone()
        };
        assert!(Arc::ptr_eq(&first, &cache.get_or_create(&device, &relabeled).unwrap()));

        let culled = GraphicsPipelineDescriptor {
            cull_mode: CullMode::None,
            ..base.clone()
        };
        let other = cache.get_or_create(&device, &culled).unwrap();
        assert_ne!(first.id, other.id);
        assert_eq!(cache.get(&culled).map(|p| p.id), Some(other.id));
        assert_eq!(cache.stats().creations, 2);
    }
}

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

//! The shared, immutable description of something that can be drawn.

use lumen_core::renderer::api::{
    BlendMode, BufferId, CullMode, DescriptorSetId, DescriptorSetLayoutId, IndexFormat,
    PrimitiveTopology, VertexBufferLayout,
};
use std::ops::Range;

/// Loading progress of a renderable's device data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Buffers or textures are still being uploaded.
    Loading,
    /// Everything is on the device.
    Loaded,
    /// Loading failed; instances of this renderable are broken.
    Failed,
}

/// An index buffer bound alongside the geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBinding {
    /// Device buffer.
    pub buffer: BufferId,
    /// Index width.
    pub format: IndexFormat,
    /// Number of indices.
    pub count: u32,
}

/// Geometry stream of a renderable, bound to vertex slot 0.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryBinding {
    /// Device buffer with the vertices.
    pub vertex_buffer: BufferId,
    /// Layout of one vertex.
    pub vertex_layout: VertexBufferLayout,
    /// Number of vertices.
    pub vertex_count: u32,
    /// Optional indices.
    pub index: Option<IndexBinding>,
    /// Primitive assembly.
    pub topology: PrimitiveTopology,
}

impl GeometryBinding {
    /// Vertex or index range covering the whole geometry.
    pub fn element_range(&self) -> Range<u32> {
        match self.index {
            Some(index) => 0..index.count,
            None => 0..self.vertex_count,
        }
    }
}

/// One material layer. Every layer is drawn once per instance batch with its
/// own program.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialLayer {
    /// Layer name, forwarded to the program generator.
    pub name: String,
    /// Layout of set 1, if the material binds any resources.
    pub set_layout: Option<DescriptorSetLayoutId>,
    /// Set 1 contents.
    pub descriptor_set: Option<DescriptorSetId>,
    /// Color blending.
    pub blend: BlendMode,
    /// Face culling, unless the instance disables it.
    pub cull_mode: CullMode,
}

impl MaterialLayer {
    /// An opaque, back-face culled layer without resources.
    pub fn opaque(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            set_layout: None,
            descriptor_set: None,
            blend: BlendMode::Opaque,
            cull_mode: CullMode::Back,
        }
    }
}

/// Shared geometry and materials drawn by any number of instances.
///
/// Renderables are loaded elsewhere and shared read-only between instances.
pub trait Renderable: Send + Sync {
    /// Name used in logs and program requests.
    fn name(&self) -> &str;

    /// Whether the device data is usable yet.
    fn load_state(&self) -> LoadState;

    /// The geometry stream.
    fn geometry(&self) -> &GeometryBinding;

    /// Material layers, drawn in order.
    fn layers(&self) -> &[MaterialLayer];
}

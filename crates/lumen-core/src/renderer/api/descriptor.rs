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

//! Descriptor pools, set layouts and sets.

use super::buffer::BufferId;
use super::shader::ShaderStageFlags;
use super::texture::{SamplerId, TextureViewId};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// An opaque handle to a descriptor pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorPoolId(pub usize);

/// An opaque handle to a descriptor set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorSetLayoutId(pub usize);

/// An opaque handle to an allocated descriptor set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorSetId(pub usize);

/// Kind of resource referenced by a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptorType {
    /// Uniform buffer.
    UniformBuffer,
    /// Storage buffer.
    StorageBuffer,
    /// Sampled image.
    SampledImage,
    /// Sampler.
    Sampler,
    /// Image and sampler in one binding.
    CombinedImageSampler,
}

/// Capacity of a pool for one descriptor type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DescriptorPoolSize {
    /// Descriptor type.
    pub ty: DescriptorType,
    /// Number of descriptors of that type.
    pub count: u32,
}

/// Describes a fixed-size descriptor pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorPoolDescriptor {
    /// Debug label.
    pub label: Option<Cow<'static, str>>,
    /// Maximum number of sets allocated at once.
    pub max_sets: u32,
    /// Per-type capacities.
    pub sizes: Vec<DescriptorPoolSize>,
}

impl DescriptorPoolDescriptor {
    /// Capacity for `ty`, zero if the pool was not sized for it.
    pub fn capacity_of(&self, ty: DescriptorType) -> u32 {
        self.sizes
            .iter()
            .filter(|size| size.ty == ty)
            .map(|size| size.count)
            .sum()
    }
}

/// One binding slot of a set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayoutEntry {
    /// Binding number.
    pub binding: u32,
    /// Resource kind.
    pub ty: DescriptorType,
    /// Visible stages.
    pub visibility: ShaderStageFlags,
}

/// Describes a descriptor set layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayoutDescriptor {
    /// Debug label.
    pub label: Option<Cow<'static, str>>,
    /// Binding slots.
    pub entries: Vec<DescriptorSetLayoutEntry>,
}

/// A resource written into a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorResource {
    /// A range of a buffer bound as a uniform block.
    UniformBuffer {
        /// Buffer.
        buffer: BufferId,
        /// Byte offset.
        offset: u64,
        /// Byte size.
        size: u64,
    },
    /// A texture view.
    TextureView(TextureViewId),
    /// A sampler.
    Sampler(SamplerId),
}

impl DescriptorResource {
    /// Descriptor type this resource consumes from a pool.
    pub const fn descriptor_type(&self) -> DescriptorType {
        match self {
            DescriptorResource::UniformBuffer { .. } => DescriptorType::UniformBuffer,
            DescriptorResource::TextureView(_) => DescriptorType::SampledImage,
            DescriptorResource::Sampler(_) => DescriptorType::Sampler,
        }
    }
}

/// A (binding, resource) pair written when a set is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorBinding {
    /// Binding number.
    pub binding: u32,
    /// Resource.
    pub resource: DescriptorResource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_capacity_sums_matching_sizes() {
        let pool = DescriptorPoolDescriptor {
            label: None,
            max_sets: 4,
            sizes: vec![
                DescriptorPoolSize {
                    ty: DescriptorType::UniformBuffer,
                    count: 8,
                },
                DescriptorPoolSize {
                    ty: DescriptorType::UniformBuffer,
                    count: 2,
                },
            ],
        };
        assert_eq!(pool.capacity_of(DescriptorType::UniformBuffer), 10);
        assert_eq!(pool.capacity_of(DescriptorType::Sampler), 0);
    }
}

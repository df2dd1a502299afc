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
    AddressMode, CompareFunction, FilterMode, SamplerDescriptor, SamplerId,
};
use lumen_core::renderer::{GraphicsDevice, ResourceError};
use std::borrow::Cow;
use std::ops::BitOr;
use std::sync::Arc;

/// The filtering family of a sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerKind {
    /// Trilinear filtering.
    Linear,
    /// Point sampling.
    Nearest,
    /// Depth comparison sampling for shadow maps.
    Shadow,
}

/// Creation flags of a cached sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SamplerFlags {
    bits: u32,
}

impl SamplerFlags {
    /// Repeat addressing, mipmaps, no anisotropy.
    pub const NONE: Self = Self { bits: 0 };
    /// Clamp coordinates to the edge.
    pub const CLAMP_TO_EDGE: Self = Self { bits: 1 << 0 };
    /// Mirror coordinates outside `[0, 1]`.
    pub const MIRROR: Self = Self { bits: 1 << 1 };
    /// Nearest mipmap selection.
    pub const NO_MIPMAP_FILTER: Self = Self { bits: 1 << 2 };
    /// 16x anisotropic filtering.
    pub const ANISOTROPIC: Self = Self { bits: 1 << 3 };

    /// Whether every flag of `other` is set.
    pub const fn contains(&self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }
}

impl BitOr for SamplerFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            bits: self.bits | rhs.bits,
        }
    }
}

/// Builds the device descriptor for a sampler kind and flag set.
pub fn sampler_descriptor(kind: SamplerKind, flags: SamplerFlags) -> SamplerDescriptor {
    let address_mode = if flags.contains(SamplerFlags::CLAMP_TO_EDGE) {
        AddressMode::ClampToEdge
    } else if flags.contains(SamplerFlags::MIRROR) {
        AddressMode::MirrorRepeat
    } else {
        AddressMode::Repeat
    };
    let (filter, compare) = match kind {
        SamplerKind::Linear => (FilterMode::Linear, None),
        SamplerKind::Nearest => (FilterMode::Nearest, None),
        SamplerKind::Shadow => (FilterMode::Linear, Some(CompareFunction::LessEqual)),
    };
    let mipmap_filter = if flags.contains(SamplerFlags::NO_MIPMAP_FILTER) {
        FilterMode::Nearest
    } else {
        filter
    };
    SamplerDescriptor {
        label: Some(Cow::Owned(format!("Sampler {kind:?}"))),
        address_mode,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter,
        compare,
        anisotropy_clamp: if flags.contains(SamplerFlags::ANISOTROPIC) {
            16
        } else {
            1
        },
    }
}

/// A sampler living on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerHandle {
    /// Device handle.
    pub id: SamplerId,
    /// Filtering family.
    pub kind: SamplerKind,
    /// Creation flags.
    pub flags: SamplerFlags,
}

/// Samplers keyed by `(SamplerKind, SamplerFlags)`.
#[derive(Debug, Default)]
pub struct SamplerCache {
    cache: ResourceCache<(SamplerKind, SamplerFlags), SamplerHandle>,
}

impl SamplerCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the sampler for `(kind, flags)`, creating it on a miss.
    pub fn get_or_create(
        &self,
        device: &dyn GraphicsDevice,
        kind: SamplerKind,
        flags: SamplerFlags,
    ) -> Result<Arc<SamplerHandle>, ResourceError> {
        self.cache.get_or_try_create(&(kind, flags), || {
            let id = device.create_sampler(&sampler_descriptor(kind, flags))?;
            log::debug!("SamplerCache: created {kind:?} sampler ({id:?})");
            Ok(SamplerHandle { id, kind, flags })
        })
    }

    /// Hit and creation counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats::of(&self.cache)
    }

    /// Destroys every cached sampler. Returns the number of failures.
    pub fn release(&self, device: &dyn GraphicsDevice) -> usize {
        self.cache
            .drain()
            .into_iter()
            .filter(|(_, handle)| device.destroy_sampler(handle.id).is_err())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::renderer::testing::RecordingDevice;

    #[test]
    fn shadow_samplers_compare_depth() {
        let descriptor = sampler_descriptor(SamplerKind::Shadow, SamplerFlags::CLAMP_TO_EDGE);
        assert_eq!(descriptor.compare, Some(CompareFunction::LessEqual));
        assert_eq!(descriptor.address_mode, AddressMode::ClampToEdge);
    }

    #[test]
    fn identical_requests_share_a_sampler() {
        let device = RecordingDevice::new();
        let cache = SamplerCache::new();
        let a = cache
            .get_or_create(&device, SamplerKind::Linear, SamplerFlags::ANISOTROPIC)
            .unwrap();
        let b = cache
            .get_or_create(&device, SamplerKind::Linear, SamplerFlags::ANISOTROPIC)
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(device.counters().samplers_created, 1);
        assert_eq!(cache.release(&device), 0);
    }
}

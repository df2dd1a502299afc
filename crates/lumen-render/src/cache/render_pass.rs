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
    AttachmentDescriptor, AttachmentOps, RenderPassDescriptor, RenderPassId, TextureFormat,
};
use lumen_core::renderer::{GraphicsDevice, ResourceError};
use std::borrow::Cow;
use std::ops::BitOr;
use std::sync::Arc;

/// Creation flags of a cached render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RenderPassFlags {
    bits: u32,
}

impl RenderPassFlags {
    /// No flags: attachments are loaded and stored.
    pub const NONE: Self = Self { bits: 0 };
    /// Clears the color attachment on load.
    pub const CLEAR_COLOR: Self = Self { bits: 1 << 0 };
    /// Clears the depth/stencil attachment on load.
    pub const CLEAR_DEPTH_STENCIL: Self = Self { bits: 1 << 1 };
    /// Keeps depth contents after the pass (shadow maps).
    pub const STORE_DEPTH: Self = Self { bits: 1 << 2 };
    /// The color attachment is presented after the pass.
    pub const PRESENT: Self = Self { bits: 1 << 3 };

    /// Returns the raw bits.
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    /// Whether every flag of `other` is set.
    pub const fn contains(&self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }
}

impl BitOr for RenderPassFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            bits: self.bits | rhs.bits,
        }
    }
}

/// Attachment formats of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AttachmentFormats {
    /// Color attachment format.
    pub color: Option<TextureFormat>,
    /// Depth/stencil attachment format.
    pub depth_stencil: Option<TextureFormat>,
}

/// Identity of a cached render pass.
///
/// The formats are part of the identity so that one string id can never
/// resolve to a pass with incompatible attachments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderPassKey {
    /// A caller-chosen name, e.g. `"main"` or `"shadow-map"`.
    pub id: String,
    /// Creation flags.
    pub flags: RenderPassFlags,
    /// Attachment formats.
    pub formats: AttachmentFormats,
}

impl RenderPassKey {
    /// Builds the device descriptor implied by this key.
    pub fn descriptor(&self) -> RenderPassDescriptor {
        let color_ops = if self.flags.contains(RenderPassFlags::CLEAR_COLOR) {
            AttachmentOps::CLEAR_STORE
        } else {
            AttachmentOps::LOAD_STORE
        };
        let depth_ops = match (
            self.flags.contains(RenderPassFlags::CLEAR_DEPTH_STENCIL),
            self.flags.contains(RenderPassFlags::STORE_DEPTH),
        ) {
            (true, true) => AttachmentOps::CLEAR_STORE,
            (true, false) => AttachmentOps::CLEAR_DISCARD,
            (false, _) => AttachmentOps::LOAD_STORE,
        };
        RenderPassDescriptor {
            label: Some(Cow::Owned(format!("Render Pass '{}'", self.id))),
            color: self.formats.color.map(|format| AttachmentDescriptor {
                format,
                ops: color_ops,
            }),
            depth_stencil: self.formats.depth_stencil.map(|format| AttachmentDescriptor {
                format,
                ops: depth_ops,
            }),
            present: self.flags.contains(RenderPassFlags::PRESENT),
        }
    }
}

/// A render pass living on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPassHandle {
    /// Device handle.
    pub id: RenderPassId,
    /// Cache identity.
    pub key: RenderPassKey,
    /// The descriptor it was created with.
    pub descriptor: RenderPassDescriptor,
}

/// Render passes keyed by [`RenderPassKey`].
#[derive(Debug, Default)]
pub struct RenderPassCache {
    cache: ResourceCache<RenderPassKey, RenderPassHandle>,
}

impl RenderPassCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the pass for `key`, creating it on the device on a miss.
    pub fn get_or_create(
        &self,
        device: &dyn GraphicsDevice,
        key: RenderPassKey,
    ) -> Result<Arc<RenderPassHandle>, ResourceError> {
        self.cache.get_or_try_create(&key, || {
            let descriptor = key.descriptor();
            let id = device.create_render_pass(&descriptor)?;
            log::debug!("RenderPassCache: created '{}' ({:?})", key.id, id);
            Ok(RenderPassHandle {
                id,
                key: key.clone(),
                descriptor,
            })
        })
    }

    /// Hit and creation counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats::of(&self.cache)
    }

    /// Destroys every cached pass. Returns the number of failures.
    pub fn release(&self, device: &dyn GraphicsDevice) -> usize {
        self.cache
            .drain()
            .into_iter()
            .filter(|(key, handle)| match device.destroy_render_pass(handle.id) {
                Ok(()) => false,
                Err(e) => {
                    log::error!("RenderPassCache: failed to destroy '{}': {e}", key.id);
                    true
                }
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::renderer::api::{LoadOp, StoreOp};
    use lumen_core::renderer::testing::RecordingDevice;

    fn key(id: &str, flags: RenderPassFlags) -> RenderPassKey {
        RenderPassKey {
            id: id.to_string(),
            flags,
            formats: AttachmentFormats {
                color: Some(TextureFormat::Bgra8UnormSrgb),
                depth_stencil: Some(TextureFormat::Depth32Float),
            },
        }
    }

    #[test]
    fn same_key_returns_same_pass() {
        let device = RecordingDevice::new();
        let cache = RenderPassCache::new();
        let a = cache
            .get_or_create(&device, key("main", RenderPassFlags::CLEAR_COLOR))
            .unwrap();
        let b = cache
            .get_or_create(&device, key("main", RenderPassFlags::CLEAR_COLOR))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(device.counters().render_passes_created, 1);

        let c = cache
            .get_or_create(&device, key("main", RenderPassFlags::NONE))
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.stats().creations, 2);
        assert_eq!(cache.release(&device), 0);
    }

    #[test]
    fn flags_shape_attachment_operations() {
        let descriptor =
            key("shadow", RenderPassFlags::CLEAR_DEPTH_STENCIL | RenderPassFlags::STORE_DEPTH)
                .descriptor();
        let depth = descriptor.depth_stencil.unwrap();
        assert_eq!(depth.ops.load, LoadOp::Clear);
        assert_eq!(depth.ops.store, StoreOp::Store);
        assert_eq!(descriptor.color.unwrap().ops.load, LoadOp::Load);
        assert!(!descriptor.present);
    }
}

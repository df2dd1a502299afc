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

//! GPU buffer descriptors.

use std::borrow::Cow;
use std::ops::BitOr;

/// An opaque handle to a GPU buffer owned by a [`GraphicsDevice`].
///
/// [`GraphicsDevice`]: crate::renderer::traits::GraphicsDevice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub usize);

/// How a buffer is going to be used. Combine with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferUsage {
    bits: u32,
}

impl BufferUsage {
    /// Source of vertex (or per-instance) attributes.
    pub const VERTEX: Self = Self { bits: 1 << 0 };
    /// Source of indices.
    pub const INDEX: Self = Self { bits: 1 << 1 };
    /// Bound as a uniform block.
    pub const UNIFORM: Self = Self { bits: 1 << 2 };
    /// Bound as a storage block.
    pub const STORAGE: Self = Self { bits: 1 << 3 };
    /// Destination of host writes.
    pub const COPY_DST: Self = Self { bits: 1 << 4 };

    /// Raw bits.
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    /// Whether every bit of `other` is set.
    pub const fn contains(&self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }
}

impl BitOr for BufferUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self {
            bits: self.bits | rhs.bits,
        }
    }
}

/// Describes a buffer to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDescriptor {
    /// Debug label.
    pub label: Option<Cow<'static, str>>,
    /// Size in bytes.
    pub size: u64,
    /// Allowed usages.
    pub usage: BufferUsage,
}

/// Element type of an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// 16-bit indices.
    Uint16,
    /// 32-bit indices.
    Uint32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_flags_combine() {
        let usage = BufferUsage::VERTEX | BufferUsage::COPY_DST;
        assert!(usage.contains(BufferUsage::VERTEX));
        assert!(usage.contains(BufferUsage::COPY_DST));
        assert!(!usage.contains(BufferUsage::UNIFORM));
        assert!(usage.contains(BufferUsage::default()));
    }
}

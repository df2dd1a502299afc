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

use std::ops::{BitOr, BitOrAssign};
use std::sync::atomic::{AtomicU32, Ordering};

/// Per-instance option and state bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct InstanceFlags {
    bits: u32,
}

impl InstanceFlags {
    /// No flags set.
    pub const NONE: Self = Self { bits: 0 };
    /// The instance is skipped by every pass.
    pub const HIDDEN: Self = Self { bits: 1 << 0 };
    /// The instance takes part in shadow map passes.
    pub const CASTS_SHADOWS: Self = Self { bits: 1 << 1 };
    /// The instance is lit by shadow maps.
    pub const RECEIVES_SHADOWS: Self = Self { bits: 1 << 2 };
    /// The model frame is rotated to face the camera before drawing.
    pub const FACING_CAMERA: Self = Self { bits: 1 << 3 };
    /// Drawn with the translation-free view-projection (sky boxes).
    pub const USE_INFINITY_VIEW: Self = Self { bits: 1 << 4 };
    /// No depth test.
    pub const DISABLE_DEPTH_TEST: Self = Self { bits: 1 << 5 };
    /// No depth writes.
    pub const DISABLE_DEPTH_WRITE: Self = Self { bits: 1 << 6 };
    /// Stencil test enabled.
    pub const ENABLE_STENCIL_TEST: Self = Self { bits: 1 << 7 };
    /// Stencil writes enabled.
    pub const ENABLE_STENCIL_WRITE: Self = Self { bits: 1 << 8 };
    /// No face culling.
    pub const DISABLE_BACK_FACE_CULLING: Self = Self { bits: 1 << 9 };
    /// Shaded by scene lights.
    pub const ENABLE_LIGHTING: Self = Self { bits: 1 << 10 };
    /// Vertices are skinned.
    pub const ENABLE_SKELETAL_ANIMATION: Self = Self { bits: 1 << 11 };
    /// Every light affects the instance regardless of its range.
    pub const DISABLE_LIGHT_DISTANCE_CHECK: Self = Self { bits: 1 << 12 };
    /// Model data comes from an instance stream. Set on multiple instances.
    pub const ENABLE_INSTANCING: Self = Self { bits: 1 << 13 };
    /// An extra transformation is applied. Follows the extra matrix.
    pub const APPLY_TRANSFORMATION_MATRIX: Self = Self { bits: 1 << 14 };

    /// The instance data on the device matches the host copy.
    pub const POSITIONS_SYNCHRONIZED: Self = Self { bits: 1 << 16 };
    /// Programs exist for at least one render target.
    pub const READY_TO_RENDER: Self = Self { bits: 1 << 17 };
    /// Programs exist for at least one shadow map.
    pub const READY_TO_CAST_SHADOWS: Self = Self { bits: 1 << 18 };
    /// Unrecoverable failure; the instance never draws again.
    pub const BROKEN: Self = Self { bits: 1 << 19 };

    /// Bits that describe what the instance is rather than how far along it is.
    pub const OPTIONS: Self = Self { bits: (1 << 16) - 1 };

    /// Raw bits.
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    /// Whether every bit of `other` is set.
    pub const fn contains(&self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }

    /// Bits set in both.
    pub const fn intersection(&self, other: Self) -> Self {
        Self {
            bits: self.bits & other.bits,
        }
    }
}

impl BitOr for InstanceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self {
            bits: self.bits | rhs.bits,
        }
    }
}

impl BitOrAssign for InstanceFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.bits |= rhs.bits;
    }
}

/// [`InstanceFlags`] shared between the logic and render threads.
#[derive(Debug, Default)]
pub struct AtomicInstanceFlags {
    bits: AtomicU32,
}

impl AtomicInstanceFlags {
    /// Starts with `flags` set.
    pub fn new(flags: InstanceFlags) -> Self {
        Self {
            bits: AtomicU32::new(flags.bits),
        }
    }

    /// Current flags.
    pub fn load(&self) -> InstanceFlags {
        InstanceFlags {
            bits: self.bits.load(Ordering::SeqCst),
        }
    }

    /// Whether every bit of `flags` is set.
    pub fn contains(&self, flags: InstanceFlags) -> bool {
        self.load().contains(flags)
    }

    /// Sets `flags`.
    pub fn insert(&self, flags: InstanceFlags) {
        self.bits.fetch_or(flags.bits, Ordering::SeqCst);
    }

    /// Clears `flags`.
    pub fn remove(&self, flags: InstanceFlags) {
        self.bits.fetch_and(!flags.bits, Ordering::SeqCst);
    }

    /// Sets or clears `flags`.
    pub fn set(&self, flags: InstanceFlags, enabled: bool) {
        if enabled {
            self.insert(flags);
        } else {
            self.remove(flags);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_exclude_state_bits() {
        assert!(InstanceFlags::OPTIONS.contains(InstanceFlags::DISABLE_BACK_FACE_CULLING));
        assert!(!InstanceFlags::OPTIONS.contains(InstanceFlags::POSITIONS_SYNCHRONIZED));
        assert!(!InstanceFlags::OPTIONS.contains(InstanceFlags::BROKEN));
    }

    #[test]
    fn atomic_flags_insert_and_remove() {
        let flags = AtomicInstanceFlags::new(InstanceFlags::CASTS_SHADOWS);
        flags.insert(InstanceFlags::POSITIONS_SYNCHRONIZED);
        assert!(flags.contains(InstanceFlags::CASTS_SHADOWS | InstanceFlags::POSITIONS_SYNCHRONIZED));
        flags.remove(InstanceFlags::POSITIONS_SYNCHRONIZED);
        assert!(!flags.contains(InstanceFlags::POSITIONS_SYNCHRONIZED));
        flags.set(InstanceFlags::HIDDEN, true);
        assert_eq!(
            flags.load(),
            InstanceFlags::CASTS_SHADOWS | InstanceFlags::HIDDEN
        );
    }
}

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

//! Push constant blocks carrying per-draw matrices.

use super::flags::InstanceFlags;
use crate::program::PassKind;
use bytemuck::{Pod, Zeroable};
use lumen_core::math::Mat4;
use lumen_core::renderer::api::{PushConstantRange, ShaderStageFlags};

/// Whether a renderable draws one instance or a stream of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformVariant {
    /// One model frame pushed per draw.
    Unique,
    /// Model data streamed through an instance vertex buffer.
    Multiple,
}

/// The push constant block a program expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatrixPushLayout {
    /// [`ModelViewProjectionBlock`] with the regular view-projection.
    ModelViewProjection,
    /// [`ModelViewProjectionBlock`] with the translation-free view-projection.
    InfinityModelViewProjection,
    /// [`ViewProjectionBlock`] with the regular view-projection.
    ViewProjection,
    /// [`ViewProjectionBlock`] with the translation-free view-projection.
    InfinityViewProjection,
    /// [`FacingCameraBlock`]; sprites are oriented in the vertex shader.
    FacingCamera,
    /// [`ViewProjectionBlock`] holding light view-projection times model.
    ShadowCaster,
    /// [`ViewProjectionBlock`] holding the light view-projection.
    InstancedShadowCaster,
}

/// Model-view-projection and model matrix of a single instance.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ModelViewProjectionBlock {
    /// Clip-from-local.
    pub mvp: Mat4,
    /// World-from-local.
    pub model: Mat4,
}

/// A single matrix.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ViewProjectionBlock {
    /// Clip-from-world, or clip-from-local for shadow casters.
    pub view_projection: Mat4,
}

/// View-projection plus the view matrix the sprites face.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct FacingCameraBlock {
    /// Clip-from-world.
    pub view_projection: Mat4,
    /// View-from-world.
    pub view: Mat4,
}

impl MatrixPushLayout {
    /// Picks the block for a variant, its flags and the pass being recorded.
    pub fn select(variant: TransformVariant, flags: InstanceFlags, pass: PassKind) -> Self {
        let infinity = flags.contains(InstanceFlags::USE_INFINITY_VIEW);
        match (pass, variant) {
            (PassKind::ShadowCasting, TransformVariant::Unique) => Self::ShadowCaster,
            (PassKind::ShadowCasting, TransformVariant::Multiple) => Self::InstancedShadowCaster,
            (PassKind::Render, TransformVariant::Unique) if infinity => {
                Self::InfinityModelViewProjection
            }
            (PassKind::Render, TransformVariant::Unique) => Self::ModelViewProjection,
            (PassKind::Render, TransformVariant::Multiple)
                if flags.contains(InstanceFlags::FACING_CAMERA) =>
            {
                Self::FacingCamera
            }
            (PassKind::Render, TransformVariant::Multiple) if infinity => {
                Self::InfinityViewProjection
            }
            (PassKind::Render, TransformVariant::Multiple) => Self::ViewProjection,
        }
    }

    /// Byte size of the block.
    pub const fn size(&self) -> u32 {
        let size = match self {
            Self::ModelViewProjection | Self::InfinityModelViewProjection => {
                std::mem::size_of::<ModelViewProjectionBlock>()
            }
            Self::FacingCamera => std::mem::size_of::<FacingCameraBlock>(),
            Self::ViewProjection
            | Self::InfinityViewProjection
            | Self::ShadowCaster
            | Self::InstancedShadowCaster => std::mem::size_of::<ViewProjectionBlock>(),
        };
        size as u32
    }

    /// Whether the block is built from the translation-free view-projection.
    pub const fn uses_infinity_view(&self) -> bool {
        matches!(
            self,
            Self::InfinityModelViewProjection | Self::InfinityViewProjection
        )
    }

    /// The pipeline layout range for this block.
    pub fn push_constant_range(&self) -> PushConstantRange {
        PushConstantRange {
            stages: ShaderStageFlags::VERTEX,
            range: 0..self.size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_follows_variant_flags_and_pass() {
        assert_eq!(
            MatrixPushLayout::select(TransformVariant::Unique, InstanceFlags::NONE, PassKind::Render),
            MatrixPushLayout::ModelViewProjection
        );
        assert_eq!(
            MatrixPushLayout::select(
                TransformVariant::Unique,
                InstanceFlags::USE_INFINITY_VIEW,
                PassKind::Render
            ),
            MatrixPushLayout::InfinityModelViewProjection
        );
        assert_eq!(
            MatrixPushLayout::select(
                TransformVariant::Multiple,
                InstanceFlags::FACING_CAMERA | InstanceFlags::USE_INFINITY_VIEW,
                PassKind::Render
            ),
            MatrixPushLayout::FacingCamera
        );
        assert_eq!(
            MatrixPushLayout::select(
                TransformVariant::Multiple,
                InstanceFlags::USE_INFINITY_VIEW,
                PassKind::ShadowCasting
            ),
            MatrixPushLayout::InstancedShadowCaster
        );
    }

    #[test]
    fn blocks_fit_the_guaranteed_push_constant_size() {
        assert_eq!(MatrixPushLayout::ModelViewProjection.size(), 128);
        assert_eq!(MatrixPushLayout::FacingCamera.size(), 128);
        assert_eq!(MatrixPushLayout::ShadowCaster.size(), 64);
        assert_eq!(
            MatrixPushLayout::ViewProjection.push_constant_range().range,
            0..64
        );
    }
}

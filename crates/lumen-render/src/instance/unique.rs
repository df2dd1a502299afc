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

use super::data::InstanceDataLayout;
use super::flags::{AtomicInstanceFlags, InstanceFlags};
use super::push::{
    MatrixPushLayout, ModelViewProjectionBlock, TransformVariant, ViewProjectionBlock,
};
use super::{InstanceError, InstanceTransform, PushContext};
use crate::services::TransferService;
use lumen_core::math::{CartesianFrame, Mat4, Vec3};
use lumen_core::renderer::api::ShaderStageFlags;
use lumen_core::renderer::{CommandRecorder, GraphicsDevice};
use std::sync::{PoisonError, RwLock};

/// A single model frame, pushed with every draw.
#[derive(Debug, Default)]
pub struct UniqueTransform {
    frame: RwLock<CartesianFrame>,
}

impl UniqueTransform {
    /// Starts at `frame`.
    pub fn new(frame: CartesianFrame) -> Self {
        Self {
            frame: RwLock::new(frame),
        }
    }

    /// The current model frame.
    pub fn frame(&self) -> CartesianFrame {
        *self.frame.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the model frame.
    pub fn set_frame(&self, frame: CartesianFrame) {
        *self.frame.write().unwrap_or_else(PoisonError::into_inner) = frame;
    }

    /// Edits the model frame in place.
    pub fn update_frame<R>(&self, update: impl FnOnce(&mut CartesianFrame) -> R) -> R {
        update(&mut self.frame.write().unwrap_or_else(PoisonError::into_inner))
    }

    /// World-from-local as drawn from `eye`: camera facing applied first,
    /// then the extra local transformation.
    pub fn model_matrix(&self, eye: Vec3, flags: InstanceFlags, extra: Option<Mat4>) -> Mat4 {
        let frame = self.frame();
        let frame = if flags.contains(InstanceFlags::FACING_CAMERA) {
            frame.facing_point(eye)
        } else {
            frame
        };
        match extra {
            Some(extra) => frame.model_matrix() * extra,
            None => frame.model_matrix(),
        }
    }
}

impl InstanceTransform for UniqueTransform {
    fn variant(&self) -> TransformVariant {
        TransformVariant::Unique
    }

    fn instance_count(&self) -> u32 {
        1
    }

    fn instance_layout(&self) -> Option<InstanceDataLayout> {
        None
    }

    fn uses_model_uniform_buffer(&self) -> bool {
        false
    }

    fn uses_model_vertex_buffer(&self) -> bool {
        false
    }

    fn is_model_matrices_created(&self) -> bool {
        true
    }

    fn update_video_memory(
        &self,
        _device: &dyn GraphicsDevice,
        _transfer: &TransferService,
        flags: &AtomicInstanceFlags,
    ) -> Result<bool, InstanceError> {
        // Nothing lives on the device; the matrices travel as push constants.
        flags.insert(InstanceFlags::POSITIONS_SYNCHRONIZED);
        Ok(false)
    }

    fn bind_instance_model_layer(&self, _recorder: &mut dyn CommandRecorder, _slot: u32) -> bool {
        false
    }

    fn push_matrices(&self, recorder: &mut dyn CommandRecorder, context: &PushContext<'_>) {
        let model = self.model_matrix(context.view.position(), context.flags, context.extra);
        match context.layout {
            MatrixPushLayout::ModelViewProjection | MatrixPushLayout::InfinityModelViewProjection => {
                let view_projection = if context.layout.uses_infinity_view() {
                    context.view.infinity_view_projection()
                } else {
                    context.view.view_projection()
                };
                let block = ModelViewProjectionBlock {
                    mvp: view_projection * model,
                    model,
                };
                recorder.push_constants(ShaderStageFlags::VERTEX, 0, bytemuck::bytes_of(&block));
            }
            MatrixPushLayout::ShadowCaster => {
                let block = ViewProjectionBlock {
                    view_projection: context.view.view_projection() * model,
                };
                recorder.push_constants(ShaderStageFlags::VERTEX, 0, bytemuck::bytes_of(&block));
            }
            other => log::error!("UniqueTransform: cannot fill push layout {other:?}"),
        }
    }

    fn reset_model_matrices(&self) {
        self.set_frame(CartesianFrame::default());
    }

    fn destroy_model_matrices(&self, _device: &dyn GraphicsDevice) -> usize {
        0
    }

    fn world_position(&self) -> Vec3 {
        self.frame().position()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn extra_transformation_applies_in_local_space() {
        let transform = UniqueTransform::new(CartesianFrame::at(Vec3::new(10.0, 0.0, 0.0)));
        let extra = Mat4::from_translation(Vec3::new(0.0, 1.0, 0.0));
        let model = transform.model_matrix(Vec3::ZERO, InstanceFlags::NONE, Some(extra));
        assert_relative_eq!(model.translation(), Vec3::new(10.0, 1.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn facing_camera_turns_forward_towards_the_eye() {
        let transform = UniqueTransform::new(CartesianFrame::at(Vec3::ZERO));
        let model = transform.model_matrix(Vec3::new(5.0, 0.0, 0.0), InstanceFlags::FACING_CAMERA, None);
        // Local -Z maps onto forward.
        let forward = model.transform_point(Vec3::new(0.0, 0.0, -1.0));
        assert_relative_eq!(forward, Vec3::X, epsilon = 1e-5);
    }
}

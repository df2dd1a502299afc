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
use super::push::{FacingCameraBlock, MatrixPushLayout, TransformVariant, ViewProjectionBlock};
use super::{InstanceError, InstanceTransform, PushContext};
use crate::services::TransferService;
use lumen_core::math::{CartesianFrame, Mat4, Vec3};
use lumen_core::renderer::api::{BufferDescriptor, BufferId, BufferUsage, ShaderStageFlags};
use lumen_core::renderer::{CommandRecorder, GraphicsDevice};
use std::borrow::Cow;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Many instances of one renderable, streamed through an instance vertex
/// buffer and drawn with a single call per material layer.
///
/// The host copy is a flat array of atomics: logic threads write disjoint
/// ranges without locking while the render thread uploads. Every write
/// bumps `version`; the upload re-checks it after the device write, so a
/// write racing with an upload always leaves the data flagged as stale.
#[derive(Debug)]
pub struct MultipleTransform {
    layout: InstanceDataLayout,
    capacity: u32,
    data: Box<[AtomicU32]>,
    active_count: AtomicU32,
    version: AtomicU64,
    buffer: Mutex<Option<BufferId>>,
}

impl MultipleTransform {
    /// Room for `capacity` instances, every record at the identity frame.
    /// All of them are active.
    pub fn new(capacity: u32, layout: InstanceDataLayout) -> Self {
        let identity = layout.identity();
        let data = (0..capacity)
            .flat_map(|_| identity.iter().map(|value| AtomicU32::new(value.to_bits())))
            .collect();
        Self {
            layout,
            capacity,
            data,
            active_count: AtomicU32::new(capacity),
            version: AtomicU64::new(0),
            buffer: Mutex::new(None),
        }
    }

    /// Maximum number of instances.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Record layout.
    pub fn layout(&self) -> InstanceDataLayout {
        self.layout
    }

    /// Instances currently drawn.
    pub fn active_count(&self) -> u32 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Host data version, bumped by every write.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// The device buffer, once created.
    pub fn device_buffer(&self) -> Option<BufferId> {
        *self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clamps `count` to the capacity and makes it the number of drawn
    /// instances.
    ///
    /// ## Returns
    /// The clamped count, and whether newly activated records need an upload.
    pub(crate) fn set_active_count(&self, count: u32) -> (u32, bool) {
        let count = count.min(self.capacity);
        let previous = self.active_count.swap(count, Ordering::SeqCst);
        (count, count > previous)
    }

    /// Writes the records `start..start + frames.len()`.
    pub(crate) fn write_frames(
        &self,
        start: u32,
        frames: &[CartesianFrame],
    ) -> Result<(), InstanceError> {
        if frames.is_empty() {
            return Err(InstanceError::EmptyRange);
        }
        let end = start as usize + frames.len();
        if end > self.capacity as usize {
            return Err(InstanceError::IndexOutOfRange {
                index: end as u32 - 1,
                capacity: self.capacity,
            });
        }
        let floats = self.layout.floats_per_instance();
        for (index, frame) in (start as usize..end).zip(frames) {
            let record = self.layout.encode(frame);
            let slots = &self.data[index * floats..(index + 1) * floats];
            for (slot, value) in slots.iter().zip(record) {
                slot.store(value.to_bits(), Ordering::Relaxed);
            }
        }
        self.version.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// A copy of the first `count` records.
    pub fn local_data(&self, count: u32) -> Vec<f32> {
        let floats = self.layout.floats_per_instance() * count.min(self.capacity) as usize;
        self.data[..floats]
            .iter()
            .map(|slot| f32::from_bits(slot.load(Ordering::Relaxed)))
            .collect()
    }

    fn record_position(&self, index: usize) -> Vec3 {
        let floats = self.layout.floats_per_instance();
        let read = |offset: usize| f32::from_bits(self.data[index * floats + offset].load(Ordering::Relaxed));
        match self.layout {
            // Translation column of the model matrix.
            InstanceDataLayout::ModelMatrices => Vec3::new(read(12), read(13), read(14)),
            InstanceDataLayout::PositionScale => Vec3::new(read(0), read(1), read(2)),
        }
    }

    fn push(recorder: &mut dyn CommandRecorder, bytes: &[u8]) {
        recorder.push_constants(ShaderStageFlags::VERTEX, 0, bytes);
    }
}

impl InstanceTransform for MultipleTransform {
    fn variant(&self) -> TransformVariant {
        TransformVariant::Multiple
    }

    fn instance_count(&self) -> u32 {
        self.active_count()
    }

    fn instance_layout(&self) -> Option<InstanceDataLayout> {
        Some(self.layout)
    }

    fn uses_model_uniform_buffer(&self) -> bool {
        false
    }

    fn uses_model_vertex_buffer(&self) -> bool {
        true
    }

    fn is_model_matrices_created(&self) -> bool {
        self.device_buffer().is_some()
    }

    fn update_video_memory(
        &self,
        device: &dyn GraphicsDevice,
        transfer: &TransferService,
        flags: &AtomicInstanceFlags,
    ) -> Result<bool, InstanceError> {
        if self.capacity == 0 {
            return Err(InstanceError::Broken(
                "multiple instance created without capacity".to_string(),
            ));
        }
        let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let buffer = match *buffer {
            Some(id) => id,
            None => {
                let id = device.create_buffer(&BufferDescriptor {
                    label: Some(Cow::Borrowed("Instance Model Buffer")),
                    size: self.layout.stride() * self.capacity as u64,
                    usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
                })?;
                *buffer = Some(id);
                flags.remove(InstanceFlags::POSITIONS_SYNCHRONIZED);
                id
            }
        };
        if flags.contains(InstanceFlags::POSITIONS_SYNCHRONIZED) {
            return Ok(false);
        }
        let count = self.active_count();
        if count == 0 {
            flags.insert(InstanceFlags::POSITIONS_SYNCHRONIZED);
            return Ok(false);
        }

        let version = self.version();
        let data = self.local_data(count);
        transfer.upload(device, buffer, 0, bytemuck::cast_slice(&data))?;
        flags.insert(InstanceFlags::POSITIONS_SYNCHRONIZED);
        if self.version() != version {
            // A writer got in between the copy and the flag.
            flags.remove(InstanceFlags::POSITIONS_SYNCHRONIZED);
        }
        log::trace!("MultipleTransform: uploaded {count} instance record(s) to {buffer:?}");
        Ok(true)
    }

    fn bind_instance_model_layer(&self, recorder: &mut dyn CommandRecorder, slot: u32) -> bool {
        match self.device_buffer() {
            Some(buffer) => {
                recorder.set_vertex_buffer(slot, buffer, 0);
                true
            }
            None => false,
        }
    }

    fn push_matrices(&self, recorder: &mut dyn CommandRecorder, context: &PushContext<'_>) {
        // The extra transformation is applied in world space to the whole batch.
        let with_extra = |view_projection: Mat4| match context.extra {
            Some(extra) => view_projection * extra,
            None => view_projection,
        };
        match context.layout {
            MatrixPushLayout::ViewProjection | MatrixPushLayout::InstancedShadowCaster => {
                let block = ViewProjectionBlock {
                    view_projection: with_extra(context.view.view_projection()),
                };
                Self::push(recorder, bytemuck::bytes_of(&block));
            }
            MatrixPushLayout::InfinityViewProjection => {
                let block = ViewProjectionBlock {
                    view_projection: with_extra(context.view.infinity_view_projection()),
                };
                Self::push(recorder, bytemuck::bytes_of(&block));
            }
            MatrixPushLayout::FacingCamera => {
                let block = FacingCameraBlock {
                    view_projection: with_extra(context.view.view_projection()),
                    view: context.view.view(),
                };
                Self::push(recorder, bytemuck::bytes_of(&block));
            }
            other => log::error!("MultipleTransform: cannot fill push layout {other:?}"),
        }
    }

    fn reset_model_matrices(&self) {
        let identity = self.layout.identity();
        for record in self.data.chunks(identity.len()) {
            for (slot, value) in record.iter().zip(&identity) {
                slot.store(value.to_bits(), Ordering::Relaxed);
            }
        }
        self.version.fetch_add(1, Ordering::SeqCst);
    }

    fn destroy_model_matrices(&self, device: &dyn GraphicsDevice) -> usize {
        let buffer = self
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match buffer.map(|id| (id, device.destroy_buffer(id))) {
            Some((id, Err(e))) => {
                log::error!("MultipleTransform: failed to destroy {id:?}: {e}");
                1
            }
            _ => 0,
        }
    }

    fn world_position(&self) -> Vec3 {
        if self.active_count() == 0 {
            return Vec3::ZERO;
        }
        self.record_position(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::renderer::testing::RecordingDevice;

    #[test]
    fn new_records_start_at_identity() {
        let transform = MultipleTransform::new(3, InstanceDataLayout::PositionScale);
        assert_eq!(
            transform.local_data(3),
            [0.0, 0.0, 0.0, 1.0, 1.0, 1.0].repeat(3)
        );
        assert_eq!(transform.active_count(), 3);
    }

    #[test]
    fn writes_outside_capacity_are_rejected() {
        let transform = MultipleTransform::new(2, InstanceDataLayout::PositionScale);
        let frames = [CartesianFrame::default(); 2];
        assert!(matches!(
            transform.write_frames(1, &frames),
            Err(InstanceError::IndexOutOfRange { index: 2, capacity: 2 })
        ));
        assert!(matches!(
            transform.write_frames(0, &[]),
            Err(InstanceError::EmptyRange)
        ));
        assert_eq!(transform.version(), 0);
    }

    #[test]
    fn upload_marks_synchronized_and_skips_clean_data() {
        let device = RecordingDevice::new();
        let transfer = TransferService::default();
        let flags = AtomicInstanceFlags::default();
        let transform = MultipleTransform::new(4, InstanceDataLayout::PositionScale);
        transform
            .write_frames(1, &[CartesianFrame::at(Vec3::new(1.0, 2.0, 3.0))])
            .unwrap();

        assert!(transform.update_video_memory(&device, &transfer, &flags).unwrap());
        assert!(flags.contains(InstanceFlags::POSITIONS_SYNCHRONIZED));
        assert!(!transform.update_video_memory(&device, &transfer, &flags).unwrap());
        assert_eq!(transfer.stats().uploads, 1);

        let buffer = transform.device_buffer().unwrap();
        let bytes = device.buffer_contents(buffer).unwrap();
        let floats: Vec<f32> = bytes[..24 * 2]
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
            .collect();
        assert_eq!(&floats[6..9], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn failed_upload_keeps_data_stale() {
        let device = RecordingDevice::new();
        let transfer = TransferService::default();
        let flags = AtomicInstanceFlags::default();
        let transform = MultipleTransform::new(2, InstanceDataLayout::ModelMatrices);
        device.set_fail_buffer_writes(true);
        assert!(transform.update_video_memory(&device, &transfer, &flags).is_err());
        assert!(!flags.contains(InstanceFlags::POSITIONS_SYNCHRONIZED));
        device.set_fail_buffer_writes(false);
        assert!(transform.update_video_memory(&device, &transfer, &flags).unwrap());
        assert!(flags.contains(InstanceFlags::POSITIONS_SYNCHRONIZED));
    }

    #[test]
    fn world_position_reads_the_first_record() {
        let transform = MultipleTransform::new(2, InstanceDataLayout::ModelMatrices);
        transform
            .write_frames(0, &[CartesianFrame::at(Vec3::new(4.0, 5.0, 6.0))])
            .unwrap();
        assert_eq!(transform.world_position(), Vec3::new(4.0, 5.0, 6.0));
    }
}

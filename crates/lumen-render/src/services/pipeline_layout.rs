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

use super::{RenderService, ServiceError};
use ahash::AHashMap;
use lumen_core::renderer::api::{
    DescriptorSetLayoutDescriptor, DescriptorSetLayoutEntry, DescriptorSetLayoutId,
    DescriptorType, PipelineLayoutDescriptor, PipelineLayoutId, ShaderStageFlags,
};
use lumen_core::renderer::GraphicsDevice;
use std::borrow::Cow;
use std::sync::{Arc, Mutex, PoisonError};

/// Get-or-create descriptor set layouts and pipeline layouts.
///
/// Also owns the layout of set 0, the per-target view uniform block shared
/// by every program.
#[derive(Debug, Default)]
pub struct PipelineLayoutService {
    set_layouts: Mutex<AHashMap<DescriptorSetLayoutDescriptor, DescriptorSetLayoutId>>,
    pipeline_layouts: Mutex<AHashMap<PipelineLayoutDescriptor, PipelineLayoutId>>,
    view_set_layout: Option<DescriptorSetLayoutId>,
}

impl PipelineLayoutService {
    /// The descriptor of the view uniform set layout.
    pub fn view_set_layout_descriptor() -> DescriptorSetLayoutDescriptor {
        DescriptorSetLayoutDescriptor {
            label: Some(Cow::Borrowed("View Uniform Set Layout")),
            entries: vec![DescriptorSetLayoutEntry {
                binding: 0,
                ty: DescriptorType::UniformBuffer,
                visibility: ShaderStageFlags::VERTEX_FRAGMENT,
            }],
        }
    }

    /// Layout of set 0.
    pub fn view_set_layout(&self) -> Result<DescriptorSetLayoutId, ServiceError> {
        self.view_set_layout
            .ok_or(ServiceError::NotInitialized("PipelineLayoutService"))
    }

    /// Returns the set layout matching `descriptor`, creating it on a miss.
    pub fn set_layout(
        &self,
        device: &dyn GraphicsDevice,
        descriptor: &DescriptorSetLayoutDescriptor,
    ) -> Result<DescriptorSetLayoutId, ServiceError> {
        let mut layouts = self
            .set_layouts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = layouts.get(descriptor) {
            return Ok(*id);
        }
        let id = device.create_descriptor_set_layout(descriptor)?;
        layouts.insert(descriptor.clone(), id);
        Ok(id)
    }

    /// Returns the pipeline layout matching `descriptor`, creating it on a miss.
    pub fn pipeline_layout(
        &self,
        device: &dyn GraphicsDevice,
        descriptor: &PipelineLayoutDescriptor,
    ) -> Result<PipelineLayoutId, ServiceError> {
        let mut layouts = self
            .pipeline_layouts
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = layouts.get(descriptor) {
            return Ok(*id);
        }
        let id = device.create_pipeline_layout(descriptor)?;
        log::debug!(
            "PipelineLayoutService: created '{}' ({id:?})",
            descriptor.label.as_deref().unwrap_or("unnamed")
        );
        layouts.insert(descriptor.clone(), id);
        Ok(id)
    }

    /// Number of pipeline layouts created.
    pub fn pipeline_layout_count(&self) -> usize {
        self.pipeline_layouts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl RenderService for PipelineLayoutService {
    fn name(&self) -> &'static str {
        "PipelineLayoutService"
    }

    fn initialize(&mut self, device: &Arc<dyn GraphicsDevice>) -> Result<(), ServiceError> {
        let id = self.set_layout(device.as_ref(), &Self::view_set_layout_descriptor())?;
        self.view_set_layout = Some(id);
        Ok(())
    }

    fn terminate(&mut self, device: &dyn GraphicsDevice) -> usize {
        self.view_set_layout = None;
        let pipeline_failures = self
            .pipeline_layouts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .filter(|(_, id)| device.destroy_pipeline_layout(*id).is_err())
            .count();
        let set_failures = self
            .set_layouts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .filter(|(_, id)| device.destroy_descriptor_set_layout(*id).is_err())
            .count();
        pipeline_failures + set_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::renderer::api::PushConstantRange;
    use lumen_core::renderer::testing::RecordingDevice;

    #[test]
    fn layouts_are_shared() {
        let recording = Arc::new(RecordingDevice::new());
        let device: Arc<dyn GraphicsDevice> = recording.clone();
        let mut service = PipelineLayoutService::default();
        service.initialize(&device).unwrap();
        let view = service.view_set_layout().unwrap();
        let descriptor = PipelineLayoutDescriptor {
            label: None,
            set_layouts: vec![view],
            push_constant_ranges: vec![PushConstantRange {
                stages: ShaderStageFlags::VERTEX,
                range: 0..128,
            }],
        };
        let a = service.pipeline_layout(device.as_ref(), &descriptor).unwrap();
        let b = service.pipeline_layout(device.as_ref(), &descriptor).unwrap();
        assert_eq!(a, b);
        assert_eq!(recording.counters().pipeline_layouts_created, 1);
        assert_eq!(
            service
                .set_layout(device.as_ref(), &PipelineLayoutService::view_set_layout_descriptor())
                .unwrap(),
            view
        );
        assert_eq!(service.terminate(device.as_ref()), 0);
        assert!(service.view_set_layout().is_err());
    }
}

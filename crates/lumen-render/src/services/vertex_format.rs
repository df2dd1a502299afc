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
use crate::instance::InstanceDataLayout;
use ahash::AHashMap;
use lumen_core::renderer::api::VertexBufferLayout;
use lumen_core::renderer::GraphicsDevice;
use std::sync::{Arc, Mutex, PoisonError};

type FormatKey = (VertexBufferLayout, Option<InstanceDataLayout>);

/// Resolves the vertex input of a program: the geometry stream in slot 0,
/// followed by the instance stream in slot 1 when the renderable has one.
///
/// Instance attribute locations continue after the highest geometry
/// location. Resolved formats are shared between every program that asks
/// for the same combination.
#[derive(Debug, Default)]
pub struct VertexFormatService {
    formats: Mutex<AHashMap<FormatKey, Arc<Vec<VertexBufferLayout>>>>,
    active: bool,
}

impl VertexFormatService {
    /// Buffer layouts for `geometry` combined with an optional instance stream.
    pub fn vertex_layouts(
        &self,
        geometry: &VertexBufferLayout,
        instance: Option<InstanceDataLayout>,
    ) -> Result<Arc<Vec<VertexBufferLayout>>, ServiceError> {
        if !self.active {
            return Err(ServiceError::NotInitialized(self.name()));
        }
        let mut formats = self.formats.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (geometry.clone(), instance);
        if let Some(layouts) = formats.get(&key) {
            return Ok(layouts.clone());
        }
        let mut layouts = vec![geometry.clone()];
        if let Some(instance) = instance {
            let first_location = geometry
                .attributes
                .iter()
                .map(|attribute| attribute.shader_location + 1)
                .max()
                .unwrap_or(0);
            layouts.push(instance.vertex_layout(first_location));
        }
        let layouts = Arc::new(layouts);
        formats.insert(key, layouts.clone());
        Ok(layouts)
    }

    /// Number of distinct formats resolved so far.
    pub fn format_count(&self) -> usize {
        self.formats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl RenderService for VertexFormatService {
    fn name(&self) -> &'static str {
        "VertexFormatService"
    }

    fn initialize(&mut self, _device: &Arc<dyn GraphicsDevice>) -> Result<(), ServiceError> {
        self.active = true;
        Ok(())
    }

    fn terminate(&mut self, _device: &dyn GraphicsDevice) -> usize {
        self.active = false;
        self.formats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::renderer::api::{VertexAttribute, VertexFormat, VertexStepMode};
    use lumen_core::renderer::testing::RecordingDevice;

    fn position_normal() -> VertexBufferLayout {
        VertexBufferLayout {
            array_stride: 24,
            step_mode: VertexStepMode::Vertex,
            attributes: vec![
                VertexAttribute {
                    format: VertexFormat::Float32x3,
                    offset: 0,
                    shader_location: 0,
                },
                VertexAttribute {
                    format: VertexFormat::Float32x3,
                    offset: 12,
                    shader_location: 1,
                },
            ],
        }
    }

    #[test]
    fn instance_locations_follow_geometry() {
        let device: Arc<dyn GraphicsDevice> = Arc::new(RecordingDevice::new());
        let mut service = VertexFormatService::default();
        service.initialize(&device).unwrap();

        let layouts = service
            .vertex_layouts(&position_normal(), Some(InstanceDataLayout::ModelMatrices))
            .unwrap();
        assert_eq!(layouts.len(), 2);
        assert_eq!(layouts[1].attributes[0].shader_location, 2);
        assert_eq!(layouts[1].attributes.len(), 7);

        let again = service
            .vertex_layouts(&position_normal(), Some(InstanceDataLayout::ModelMatrices))
            .unwrap();
        assert!(Arc::ptr_eq(&layouts, &again));
        let single = service.vertex_layouts(&position_normal(), None).unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(service.format_count(), 2);
    }
}

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
use lumen_core::renderer::api::{ShaderModuleDescriptor, ShaderModuleId};
use lumen_core::renderer::{GraphicsDevice, ResourceError};
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Compiles shader modules and shares them between programs with the same
/// source text.
#[derive(Debug, Default)]
pub struct ShaderModuleService {
    modules: Mutex<AHashMap<u64, ShaderModuleId>>,
    hasher: ahash::RandomState,
    hits: AtomicUsize,
    active: bool,
}

impl ShaderModuleService {
    fn source_hash(&self, descriptor: &ShaderModuleDescriptor) -> u64 {
        let mut hasher = self.hasher.build_hasher();
        descriptor.source.hash(&mut hasher);
        hasher.finish()
    }

    /// Returns the module compiled from this source, compiling it on first use.
    pub fn get_or_create(
        &self,
        device: &dyn GraphicsDevice,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ServiceError> {
        if !self.active {
            return Err(ServiceError::NotInitialized(self.name()));
        }
        let key = self.source_hash(descriptor);
        let mut modules = self.modules.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = modules.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(*id);
        }
        let id = device.create_shader_module(descriptor)?;
        log::debug!(
            "ShaderModuleService: compiled '{}' ({id:?})",
            descriptor.label.as_deref().unwrap_or("unnamed")
        );
        modules.insert(key, id);
        Ok(id)
    }

    /// Number of compiled modules.
    pub fn module_count(&self) -> usize {
        self.modules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Requests answered by an already compiled module.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }
}

impl RenderService for ShaderModuleService {
    fn name(&self) -> &'static str {
        "ShaderModuleService"
    }

    fn initialize(&mut self, _device: &Arc<dyn GraphicsDevice>) -> Result<(), ServiceError> {
        self.active = true;
        Ok(())
    }

    fn terminate(&mut self, device: &dyn GraphicsDevice) -> usize {
        self.active = false;
        let mut modules = self.modules.lock().unwrap_or_else(PoisonError::into_inner);
        modules
            .drain()
            .filter(|(_, id)| {
                let result: Result<(), ResourceError> = device.destroy_shader_module(*id);
                result.is_err()
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::renderer::api::ShaderSource;
    use lumen_core::renderer::testing::RecordingDevice;
    use std::borrow::Cow;

    fn wgsl(text: &'static str) -> ShaderModuleDescriptor {
        ShaderModuleDescriptor {
            label: None,
            source: ShaderSource::Wgsl(Cow::Borrowed(text)),
        }
    }

    #[test]
    fn identical_sources_compile_once() {
        let device: Arc<dyn GraphicsDevice> = Arc::new(RecordingDevice::new());
        let mut service = ShaderModuleService::default();
        service.initialize(&device).unwrap();
        let a = service.get_or_create(device.as_ref(), &wgsl("a")).unwrap();
        let b = service.get_or_create(device.as_ref(), &wgsl("a")).unwrap();
        let c = service.get_or_create(device.as_ref(), &wgsl("c")).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(service.module_count(), 2);
        assert_eq!(service.hits(), 1);
        assert_eq!(service.terminate(device.as_ref()), 0);
    }

    #[test]
    fn unusable_before_initialization() {
        let device = RecordingDevice::new();
        let service = ShaderModuleService::default();
        assert!(matches!(
            service.get_or_create(&device, &wgsl("a")),
            Err(ServiceError::NotInitialized(_))
        ));
    }
}

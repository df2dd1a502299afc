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

//! Ordered sub-services the renderer brings up before its swap chain.
//!
//! Services initialize in declaration order and terminate in reverse. A
//! failing service aborts the renderer initialization; the services already
//! brought up are torn down again.

mod pipeline_layout;
mod shader_module;
mod transfer;
mod uniform_buffer;
mod vertex_format;

pub use self::pipeline_layout::PipelineLayoutService;
pub use self::shader_module::ShaderModuleService;
pub use self::transfer::{TransferService, TransferStats};
pub use self::uniform_buffer::{
    SharedUniformBufferService, UniformSlot, ELEMENTS_PER_BUFFER, UNIFORM_ELEMENT_SIZE,
};
pub use self::vertex_format::VertexFormatService;

use lumen_core::renderer::{GraphicsDevice, ResourceError};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by a render service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A device object could not be created.
    #[error("device resource error: {0}")]
    Resource(#[from] ResourceError),
    /// The service was used before initialization.
    #[error("service '{0}' is not initialized")]
    NotInitialized(&'static str),
    /// The service cannot hand out more of its resource.
    #[error("service exhausted: {0}")]
    Exhausted(String),
}

/// A renderer sub-service with an explicit lifecycle.
pub trait RenderService: Send + Sync {
    /// A human-readable name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Creates the service's device objects.
    fn initialize(&mut self, device: &Arc<dyn GraphicsDevice>) -> Result<(), ServiceError>;

    /// Releases every device object.
    ///
    /// ## Returns
    /// The number of objects that failed to be released.
    fn terminate(&mut self, device: &dyn GraphicsDevice) -> usize;
}

/// The renderer's sub-services, in initialization order.
#[derive(Debug, Default)]
pub struct RenderServices {
    /// Shader module compilation and caching.
    pub shader_modules: ShaderModuleService,
    /// Buffer uploads.
    pub transfer: TransferService,
    /// Descriptor set and pipeline layouts.
    pub pipeline_layouts: PipelineLayoutService,
    /// Slots in shared uniform buffers.
    pub uniform_buffers: SharedUniformBufferService,
    /// Vertex and instance input layouts.
    pub vertex_formats: VertexFormatService,
    initialized: usize,
}

impl RenderServices {
    fn services_mut(&mut self) -> [&mut dyn RenderService; 5] {
        [
            &mut self.shader_modules,
            &mut self.transfer,
            &mut self.pipeline_layouts,
            &mut self.uniform_buffers,
            &mut self.vertex_formats,
        ]
    }

    /// Initializes every service in order.
    ///
    /// ## Errors
    /// The name of the failing service and its error. Services initialized
    /// before it have already been terminated again.
    pub fn initialize(
        &mut self,
        device: &Arc<dyn GraphicsDevice>,
    ) -> Result<(), (&'static str, ServiceError)> {
        let mut failure = None;
        let mut initialized = 0;
        for service in self.services_mut() {
            log::debug!("RenderServices: initializing '{}'", service.name());
            if let Err(e) = service.initialize(device) {
                log::error!("RenderServices: '{}' failed to initialize: {e}", service.name());
                failure = Some((service.name(), e));
                break;
            }
            initialized += 1;
        }
        self.initialized = initialized;
        match failure {
            Some(failure) => {
                self.terminate(device.as_ref());
                Err(failure)
            }
            None => Ok(()),
        }
    }

    /// Terminates the initialized services in reverse order.
    ///
    /// ## Returns
    /// The total number of release failures.
    pub fn terminate(&mut self, device: &dyn GraphicsDevice) -> usize {
        let initialized = std::mem::take(&mut self.initialized);
        let mut errors = 0;
        for service in self.services_mut().into_iter().take(initialized).rev() {
            log::debug!("RenderServices: terminating '{}'", service.name());
            errors += service.terminate(device);
        }
        errors
    }

    /// Whether every service is up.
    pub fn is_initialized(&self) -> bool {
        self.initialized == 5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::renderer::testing::RecordingDevice;

    #[test]
    fn services_come_up_and_go_down_cleanly() {
        let device: Arc<dyn GraphicsDevice> = Arc::new(RecordingDevice::new());
        let mut services = RenderServices::default();
        services.initialize(&device).unwrap();
        assert!(services.is_initialized());
        assert_eq!(services.terminate(device.as_ref()), 0);
        assert!(!services.is_initialized());
        // A second terminate has nothing left to release.
        assert_eq!(services.terminate(device.as_ref()), 0);
    }
}

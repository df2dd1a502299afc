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

//! Adapter selection for the wgpu backend.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use lumen_core::platform::LumenWindowHandle;
use lumen_core::renderer::api::DeviceRequest;
use lumen_core::renderer::{DeviceSelector, GraphicsDevice, RenderError};
use wgpu::{Instance, RequestAdapterOptions};

use super::context::WgpuGraphicsContext;
use super::conversions::{backend_name, IntoWgpu};
use super::device::WgpuDevice;

/// wgpu implementation of [`DeviceSelector`].
///
/// The surface is created before the adapter is requested, so the chosen
/// adapter is guaranteed to be able to present to the window.
pub struct WgpuDeviceSelector {
    instance: Instance,
    window: Option<LumenWindowHandle>,
}

impl WgpuDeviceSelector {
    /// A selector presenting to `window`.
    pub fn new(window: LumenWindowHandle) -> Self {
        Self::with_instance(
            Instance::new(&wgpu::InstanceDescriptor::default()),
            Some(window),
        )
    }

    /// A selector without a window, for off-screen use.
    pub fn headless() -> Self {
        Self::with_instance(Instance::new(&wgpu::InstanceDescriptor::default()), None)
    }

    /// A selector sharing an existing instance.
    pub fn with_instance(instance: Instance, window: Option<LumenWindowHandle>) -> Self {
        Self { instance, window }
    }
}

#[async_trait]
impl DeviceSelector for WgpuDeviceSelector {
    async fn select_device(
        &self,
        request: &DeviceRequest,
    ) -> Result<Arc<dyn GraphicsDevice>, RenderError> {
        let start_time = Instant::now();
        log::info!("Starting WGPU device selection...");

        // --- 1. Surface ---
        let surface = match (&self.window, request.require_presentation) {
            (Some(window), _) => Some(
                WgpuGraphicsContext::create_surface(&self.instance, window)
                    .map_err(|e| RenderError::InitializationFailed(e.to_string()))?,
            ),
            (None, true) => {
                return Err(RenderError::NoSuitableDevice(
                    "presentation requested without a window".to_string(),
                ))
            }
            (None, false) => None,
        };

        // --- 2. Adapter ---
        let adapter = self
            .instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: request.power_preference.into_wgpu(),
                compatible_surface: surface.as_ref(),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RenderError::NoSuitableDevice(format!("No suitable adapter: {e}")))?;
        let info = adapter.get_info();
        log::info!(
            "Selected {} adapter \"{}\" ({:?})",
            backend_name(info.backend),
            info.name,
            info.device_type
        );

        // --- 3. Logical device ---
        let context = WgpuGraphicsContext::new(adapter, surface, request)
            .await
            .map_err(|e| RenderError::NoSuitableDevice(e.to_string()))?;

        log::info!(
            "WGPU device ready in {} ms.",
            start_time.elapsed().as_millis()
        );
        Ok(Arc::new(WgpuDevice::new(context)))
    }
}

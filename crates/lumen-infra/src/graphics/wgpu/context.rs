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

use std::sync::Arc;

use anyhow::{anyhow, Result};
use lumen_core::platform::LumenWindowHandle;
use lumen_core::renderer::api::{DeviceRequest, Extent2D, PresentMode, TextureFormat};
use wgpu::SurfaceTargetUnsafe;
use wgpu::{Adapter, Features, Instance};

use super::conversions::{from_wgpu_texture_format, IntoWgpu};

/// Holds the core wgpu state objects of one logical device.
///
/// The context is passive: the adapter has already been selected, and the
/// surface (if any) was created against the same instance before selection.
#[derive(Debug)]
pub struct WgpuGraphicsContext {
    /// Window surface, `None` for headless devices.
    pub surface: Option<wgpu::Surface<'static>>,
    /// The selected adapter.
    pub adapter: wgpu::Adapter,
    /// The logical device.
    pub device: wgpu::Device,
    /// The device's only queue.
    pub queue: wgpu::Queue,

    // Store info for easy access
    /// Adapter name.
    pub adapter_name: String,
    /// Adapter backend.
    pub adapter_backend: wgpu::Backend,
    /// Adapter class.
    pub adapter_device_type: wgpu::DeviceType,
    /// Limits granted to the device.
    pub device_limits: wgpu::Limits,
}

impl WgpuGraphicsContext {
    /// Creates a presentation surface for a window.
    ///
    /// ## Arguments
    /// * `instance` - The instance the adapter will later be requested from.
    /// * `window_handle` - Any shared object exposing raw window and display handles.
    pub fn create_surface(
        instance: &Instance,
        window_handle: &LumenWindowHandle,
    ) -> Result<wgpu::Surface<'static>> {
        // SAFETY: the handle is reference counted and the caller keeps the
        // window alive for as long as the device that owns the surface.
        let surface_target = unsafe {
            SurfaceTargetUnsafe::from_window(window_handle)
                .map_err(|e| anyhow!("Failed to create surface target: {}", e))?
        };
        let surface = unsafe { instance.create_surface_unsafe(surface_target)? };
        log::debug!("WGPU surface created for the window.");
        Ok(surface)
    }

    /// Opens the logical device and its queue on a pre-selected adapter.
    ///
    /// ## Arguments
    /// * `adapter` - The adapter to use.
    /// * `surface` - The window surface, absent for headless devices.
    /// * `request` - Label and push constant requirements.
    ///
    /// ## Errors
    /// Fails when the adapter cannot provide the requested push constant
    /// block or when device creation is rejected.
    pub async fn new(
        adapter: Adapter,
        surface: Option<wgpu::Surface<'static>>,
        request: &DeviceRequest,
    ) -> Result<Self> {
        let adapter_info = adapter.get_info();
        log::info!(
            "Using graphics adapter: \"{}\" (Backend: {:?})",
            adapter_info.name,
            adapter_info.backend
        );

        // --- 1. Check push constant support ---
        let mut required_features = Features::empty();
        let mut required_limits = wgpu::Limits::default();
        if request.min_push_constant_size > 0 {
            if !adapter.features().contains(Features::PUSH_CONSTANTS) {
                return Err(anyhow!(
                    "Adapter \"{}\" does not support push constants",
                    adapter_info.name
                ));
            }
            let supported = adapter.limits().max_push_constant_size;
            if supported < request.min_push_constant_size {
                return Err(anyhow!(
                    "Adapter \"{}\" offers {} bytes of push constants, {} required",
                    adapter_info.name,
                    supported,
                    request.min_push_constant_size
                ));
            }
            required_features |= Features::PUSH_CONSTANTS;
            required_limits.max_push_constant_size = request.min_push_constant_size;
        }

        // --- 2. Create Logical Device and Command Queue ---
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: request.label.as_deref(),
                required_features,
                required_limits,
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::default(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
            })
            .await
            .map_err(|e| anyhow!("Failed to create logical device: {}", e))?;
        log::info!("Logical device and command queue created.");

        device.on_uncaptured_error(Arc::new(|e| {
            log::error!("WGPU Uncaptured Error: {e:?}");
        }));

        let device_limits = device.limits();
        log::debug!("Device limits: {device_limits:?}");

        Ok(Self {
            surface,
            adapter,
            device,
            queue,
            adapter_name: adapter_info.name,
            adapter_backend: adapter_info.backend,
            adapter_device_type: adapter_info.device_type,
            device_limits,
        })
    }

    /// Configures the surface for presentation.
    ///
    /// Prefers an sRGB format Lumen knows, and falls back to FIFO when the
    /// requested present mode is unsupported (FIFO always is).
    ///
    /// ## Returns
    /// The applied configuration and the Lumen view of its format.
    pub fn configure_surface(
        &self,
        extent: Extent2D,
        present_mode: PresentMode,
        frame_latency: u32,
    ) -> Result<(wgpu::SurfaceConfiguration, TextureFormat)> {
        let surface = self
            .surface
            .as_ref()
            .ok_or_else(|| anyhow!("The device was opened without a presentation surface"))?;
        if extent.is_empty() {
            return Err(anyhow!(
                "Cannot configure a {}x{} surface",
                extent.width,
                extent.height
            ));
        }

        let caps = surface.get_capabilities(&self.adapter);
        let (surface_format, format) = caps
            .formats
            .iter()
            .copied()
            .filter(|f| f.is_srgb())
            .chain(caps.formats.iter().copied())
            .find_map(|f| from_wgpu_texture_format(f).map(|ours| (f, ours)))
            .ok_or_else(|| anyhow!("No supported surface format in {:?}", caps.formats))?;

        let requested: wgpu::PresentMode = present_mode.into_wgpu();
        let present_mode = if caps.present_modes.contains(&requested) {
            requested
        } else {
            log::warn!("Present mode {requested:?} unsupported, falling back to Fifo.");
            wgpu::PresentMode::Fifo
        };
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: extent.width,
            height: extent.height,
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: frame_latency.max(1),
        };
        surface.configure(&self.device, &config);
        log::info!(
            "WgpuGraphicsContext: Surface configured at {}x{} ({:?}, {:?})",
            extent.width,
            extent.height,
            surface_format,
            present_mode
        );
        Ok((config, format))
    }

    /// Acquires the next surface texture.
    pub fn get_current_texture(&self) -> Option<Result<wgpu::SurfaceTexture, wgpu::SurfaceError>> {
        self.surface.as_ref().map(|s| s.get_current_texture())
    }
}

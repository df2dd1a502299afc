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

//! Adapter information and device selection requests.

use std::borrow::Cow;

/// Graphics API behind a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendType {
    /// Vulkan.
    Vulkan,
    /// Metal.
    Metal,
    /// DirectX 12.
    Dx12,
    /// OpenGL / GLES.
    OpenGl,
    /// Browser WebGPU.
    WebGpu,
    /// Headless or mock backends.
    Other,
}

/// Physical device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// Integrated GPU.
    IntegratedGpu,
    /// Discrete GPU.
    DiscreteGpu,
    /// Virtualized GPU.
    VirtualGpu,
    /// Software rasterizer.
    Cpu,
    /// Unknown.
    Unknown,
}

/// Information about the adapter a device runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    /// Human-readable name.
    pub name: String,
    /// Graphics API.
    pub backend: BackendType,
    /// Device class.
    pub device_type: DeviceType,
}

/// Preference used when several adapters are suitable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PowerPreference {
    /// Prefer an integrated GPU.
    LowPower,
    /// Prefer a discrete GPU.
    #[default]
    HighPerformance,
}

/// What the renderer asks of the platform when selecting a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRequest {
    /// Label of the logical device.
    pub label: Option<Cow<'static, str>>,
    /// Adapter preference.
    pub power_preference: PowerPreference,
    /// The device must be able to present to the window surface.
    pub require_presentation: bool,
    /// Minimum push constant block size in bytes.
    pub min_push_constant_size: u32,
}

impl Default for DeviceRequest {
    fn default() -> Self {
        Self {
            label: Some(Cow::Borrowed("Lumen Logical Device")),
            power_preference: PowerPreference::HighPerformance,
            require_presentation: true,
            min_push_constant_size: 128,
        }
    }
}

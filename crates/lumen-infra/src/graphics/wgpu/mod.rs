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

//! The wgpu backend.
//!
//! [`WgpuDeviceSelector`] opens a [`WgpuDevice`] on the best adapter for a
//! window surface. The device keeps every wgpu object behind the opaque IDs
//! of `lumen-core`, and hands out [`WgpuCommandRecorder`]s that record into
//! a `wgpu::CommandEncoder`.

mod context;
mod conversions;
mod device;
mod recorder;
mod selector;

pub use self::context::WgpuGraphicsContext;
pub use self::conversions::{backend_name, from_wgpu_texture_format, IntoWgpu};
pub use self::device::WgpuDevice;
pub use self::recorder::WgpuCommandRecorder;
pub use self::selector::WgpuDeviceSelector;

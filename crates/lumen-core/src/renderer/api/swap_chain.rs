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

//! Presentable image chain descriptors.

use super::texture::{Extent2D, TextureFormat, TextureViewId};
use serde::{Deserialize, Serialize};

/// An opaque handle to a device swap chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SwapChainId(pub usize);

/// Presentation pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresentMode {
    /// Wait for vertical blank, never tears.
    Fifo,
    /// Replace the queued image, low latency without tearing.
    Mailbox,
    /// Present immediately, may tear.
    Immediate,
}

/// Describes a swap chain to create or recreate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainDescriptor {
    /// Image size.
    pub extent: Extent2D,
    /// Requested number of images; the device may clamp it.
    pub image_count: u32,
    /// Presentation mode.
    pub present_mode: PresentMode,
}

/// What the device actually created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainInfo {
    /// Image size.
    pub extent: Extent2D,
    /// Number of images in the chain.
    pub image_count: u32,
    /// Image format.
    pub format: TextureFormat,
}

/// An image handed out by `acquire_next_image`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Index inside the chain.
    pub index: u32,
    /// View to render into.
    pub view: TextureViewId,
    /// The chain still works but no longer matches the surface.
    pub suboptimal: bool,
}

/// Result of a successful presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    /// Presented and the chain matches the surface.
    Optimal,
    /// Presented, but the chain should be recreated.
    Suboptimal,
}

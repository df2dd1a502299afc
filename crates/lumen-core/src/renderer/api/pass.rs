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

//! Render pass objects and the per-frame begin information.

use super::texture::{Extent2D, TextureFormat, TextureViewId};
use std::borrow::Cow;

/// An opaque handle to a render pass (attachment layout + load/store policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderPassId(pub usize);

/// What happens to an attachment when the pass begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOp {
    /// Clear to the value supplied in [`ClearValues`].
    Clear,
    /// Keep the previous contents.
    Load,
}

/// What happens to an attachment when the pass ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// Keep the rendered contents.
    Store,
    /// The contents may be thrown away.
    Discard,
}

/// Load and store policy of one attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentOps {
    /// Load policy.
    pub load: LoadOp,
    /// Store policy.
    pub store: StoreOp,
}

impl AttachmentOps {
    /// Clear on load, store at the end.
    pub const CLEAR_STORE: Self = Self {
        load: LoadOp::Clear,
        store: StoreOp::Store,
    };
    /// Clear on load, discard at the end.
    pub const CLEAR_DISCARD: Self = Self {
        load: LoadOp::Clear,
        store: StoreOp::Discard,
    };
    /// Load, store at the end.
    pub const LOAD_STORE: Self = Self {
        load: LoadOp::Load,
        store: StoreOp::Store,
    };
}

/// One attachment slot of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentDescriptor {
    /// Pixel format of the attached view.
    pub format: TextureFormat,
    /// Load/store policy.
    pub ops: AttachmentOps,
}

/// Describes a render pass to create.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RenderPassDescriptor {
    /// Debug label.
    pub label: Option<Cow<'static, str>>,
    /// Color attachment, absent for depth-only passes such as shadow maps.
    pub color: Option<AttachmentDescriptor>,
    /// Depth/stencil attachment.
    pub depth_stencil: Option<AttachmentDescriptor>,
    /// Whether the color attachment ends up presented.
    pub present: bool,
}

/// Clear values used when a pass begins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearValues {
    /// RGBA clear color.
    pub color: [f32; 4],
    /// Depth clear value.
    pub depth: f32,
    /// Stencil clear value.
    pub stencil: u32,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.0, 1.0],
            depth: 1.0,
            stencil: 0,
        }
    }
}

/// Everything a [`CommandRecorder`] needs to begin a render pass.
///
/// [`CommandRecorder`]: crate::renderer::traits::CommandRecorder
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPassBeginInfo {
    /// Render pass to begin.
    pub render_pass: RenderPassId,
    /// View for the color attachment.
    pub color_view: Option<TextureViewId>,
    /// View for the depth/stencil attachment.
    pub depth_view: Option<TextureViewId>,
    /// Rendered area, starting at the origin.
    pub extent: Extent2D,
    /// Clear values for attachments with [`LoadOp::Clear`].
    pub clear: ClearValues,
}

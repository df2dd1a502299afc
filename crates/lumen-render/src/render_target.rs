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

//! Render targets: the swap chain, shadow maps and render-to-texture
//! surfaces, each with its own view matrices and render pass.

use crate::cache::{RenderPassFlags, RenderPassHandle};
use crate::services::UniformSlot;
use bytemuck::{Pod, Zeroable};
use lumen_core::math::{Mat4, Vec3};
use lumen_core::renderer::api::{
    ClearValues, DescriptorSetId, Extent2D, RenderPassBeginInfo, RenderPassId, SubmissionId,
    TextureDescriptor, TextureFormat, TextureId, TextureUsage, TextureViewId,
};
use lumen_core::renderer::{GraphicsDevice, RenderError, ResourceError};
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

static NEXT_TARGET_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderTargetId(pub u64);

impl RenderTargetId {
    pub(crate) fn next() -> Self {
        Self(NEXT_TARGET_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// What a render target renders into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTargetKind {
    /// The presentable swap chain images.
    SwapChain,
    /// A depth-only texture rendered from a light.
    ShadowMap,
    /// An off-screen color texture.
    Texture,
}

impl RenderTargetKind {
    /// Render pass flags used for this kind of target.
    pub fn pass_flags(&self) -> RenderPassFlags {
        match self {
            Self::SwapChain => {
                RenderPassFlags::CLEAR_COLOR
                    | RenderPassFlags::CLEAR_DEPTH_STENCIL
                    | RenderPassFlags::PRESENT
            }
            Self::ShadowMap => RenderPassFlags::CLEAR_DEPTH_STENCIL | RenderPassFlags::STORE_DEPTH,
            Self::Texture => RenderPassFlags::CLEAR_COLOR | RenderPassFlags::CLEAR_DEPTH_STENCIL,
        }
    }

    /// Whether the target is rendered outside the main frame.
    pub fn is_offscreen(&self) -> bool {
        !matches!(self, Self::SwapChain)
    }
}

/// Describes a render target to register with the renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetDescriptor {
    /// Name, also used as the render pass id.
    pub label: Cow<'static, str>,
    /// Target kind.
    pub kind: RenderTargetKind,
    /// Attachment size.
    pub extent: Extent2D,
    /// Color format; `None` for shadow maps.
    pub color_format: Option<TextureFormat>,
    /// Depth format.
    pub depth_format: Option<TextureFormat>,
}

impl RenderTargetDescriptor {
    /// A square depth-only shadow map.
    pub fn shadow_map(label: impl Into<Cow<'static, str>>, size: u32) -> Self {
        Self {
            label: label.into(),
            kind: RenderTargetKind::ShadowMap,
            extent: Extent2D::new(size, size),
            color_format: None,
            depth_format: Some(TextureFormat::Depth32Float),
        }
    }

    /// An off-screen color texture with a depth buffer.
    pub fn texture(
        label: impl Into<Cow<'static, str>>,
        extent: Extent2D,
        color_format: TextureFormat,
    ) -> Self {
        Self {
            label: label.into(),
            kind: RenderTargetKind::Texture,
            extent,
            color_format: Some(color_format),
            depth_format: Some(TextureFormat::Depth32Float),
        }
    }
}

/// Identifies the exact attachment configuration programs were built for.
///
/// The generation changes whenever the attachments are rebuilt, which
/// invalidates every program built against the previous signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetSignature {
    /// Target identity.
    pub id: RenderTargetId,
    /// Attachment generation.
    pub generation: u64,
    /// Render pass the attachments are used with.
    pub render_pass: RenderPassId,
}

/// View and projection of a render target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewMatrices {
    view: Mat4,
    projection: Mat4,
    position: Vec3,
}

impl Default for ViewMatrices {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            position: Vec3::ZERO,
        }
    }
}

/// The view uniform block bound at set 0, binding 0.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct ViewUniform {
    /// Clip-from-world.
    pub view_projection: Mat4,
    /// Clip-from-world without the camera translation.
    pub infinity_view_projection: Mat4,
    /// View-from-world.
    pub view: Mat4,
    /// Camera position, `w = 1`.
    pub position: [f32; 4],
}

impl ViewMatrices {
    /// Points the view from `eye` at `target`.
    ///
    /// ## Returns
    /// `false`, leaving the view untouched, if the direction is degenerate.
    pub fn look_at(&mut self, eye: Vec3, target: Vec3, up: Vec3) -> bool {
        match Mat4::look_at_rh(eye, target, up) {
            Some(view) => {
                self.view = view;
                self.position = eye;
                true
            }
            None => false,
        }
    }

    /// Sets a right-handed perspective projection with a `[0, 1]` depth range.
    pub fn set_perspective(&mut self, fov_y_radians: f32, aspect: f32, near: f32, far: f32) {
        self.projection = Mat4::perspective_rh_zo(fov_y_radians, aspect, near, far);
    }

    /// Sets an orthographic projection, typically for directional lights.
    pub fn set_orthographic(
        &mut self,
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    ) {
        self.projection = Mat4::orthographic_rh_zo(left, right, bottom, top, near, far);
    }

    /// View-from-world.
    pub fn view(&self) -> Mat4 {
        self.view
    }

    /// Clip-from-view.
    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    /// Eye position.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Clip-from-world.
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Clip-from-world with the camera translation removed, so geometry
    /// stays at an infinite distance.
    pub fn infinity_view_projection(&self) -> Mat4 {
        self.projection * self.view.without_translation()
    }

    /// The uniform block for these matrices.
    pub fn uniform(&self) -> ViewUniform {
        ViewUniform {
            view_projection: self.view_projection(),
            infinity_view_projection: self.infinity_view_projection(),
            view: self.view,
            position: [self.position.x, self.position.y, self.position.z, 1.0],
        }
    }
}

/// Remembers the last submission that wrote a render target so readers can
/// wait for it.
#[derive(Debug, Default)]
pub struct CompletionSignal {
    last: Mutex<Option<SubmissionId>>,
}

impl CompletionSignal {
    /// Records `submission` as the latest write.
    pub fn signal(&self, submission: SubmissionId) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(submission);
    }

    /// The latest recorded write.
    pub fn last(&self) -> Option<SubmissionId> {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until the latest write has completed on the device.
    pub fn wait(&self, device: &dyn GraphicsDevice) -> Result<(), RenderError> {
        match self.last() {
            Some(submission) => device.wait_for_submission(submission),
            None => Ok(()),
        }
    }
}

/// The view uniform element of a target and the set that binds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewBinding {
    /// Element in a shared uniform buffer.
    pub slot: UniformSlot,
    /// Set 0 contents.
    pub set: DescriptorSetId,
}

#[derive(Debug, Clone, Copy, Default)]
struct Attachments {
    extent: Extent2D,
    color: Option<(TextureId, TextureViewId)>,
    depth: Option<(TextureId, TextureViewId)>,
}

/// Something the renderer draws into.
#[derive(Debug)]
pub struct RenderTarget {
    id: RenderTargetId,
    label: String,
    kind: RenderTargetKind,
    color_format: Option<TextureFormat>,
    depth_format: Option<TextureFormat>,
    render_pass: Arc<RenderPassHandle>,
    attachments: RwLock<Attachments>,
    generation: AtomicU64,
    view: RwLock<ViewMatrices>,
    view_binding: ViewBinding,
    completion: CompletionSignal,
}

fn create_attachment(
    device: &dyn GraphicsDevice,
    label: String,
    extent: Extent2D,
    format: TextureFormat,
    usage: TextureUsage,
) -> Result<(TextureId, TextureViewId), ResourceError> {
    let texture = device.create_texture(&TextureDescriptor {
        label: Some(Cow::Owned(label)),
        extent,
        format,
        usage,
    })?;
    match device.create_texture_view(texture) {
        Ok(view) => Ok((texture, view)),
        Err(e) => {
            if let Err(destroy) = device.destroy_texture(texture) {
                log::error!("RenderTarget: failed to release {texture:?}: {destroy}");
            }
            Err(e)
        }
    }
}

fn destroy_attachment(device: &dyn GraphicsDevice, (texture, view): (TextureId, TextureViewId)) -> usize {
    let mut failures = 0;
    if let Err(e) = device.destroy_texture_view(view) {
        log::error!("RenderTarget: failed to destroy {view:?}: {e}");
        failures += 1;
    }
    if let Err(e) = device.destroy_texture(texture) {
        log::error!("RenderTarget: failed to destroy {texture:?}: {e}");
        failures += 1;
    }
    failures
}

impl RenderTarget {
    pub(crate) fn create(
        device: &dyn GraphicsDevice,
        descriptor: &RenderTargetDescriptor,
        render_pass: Arc<RenderPassHandle>,
        view_binding: ViewBinding,
    ) -> Result<Self, ResourceError> {
        let target = Self {
            id: RenderTargetId::next(),
            label: descriptor.label.to_string(),
            kind: descriptor.kind,
            color_format: descriptor.color_format,
            depth_format: descriptor.depth_format,
            render_pass,
            attachments: RwLock::new(Attachments::default()),
            generation: AtomicU64::new(0),
            view: RwLock::new(ViewMatrices::default()),
            view_binding,
            completion: CompletionSignal::default(),
        };
        let attachments = target.create_attachments(device, descriptor.extent)?;
        *target
            .attachments
            .write()
            .unwrap_or_else(PoisonError::into_inner) = attachments;
        log::debug!(
            "RenderTarget: created '{}' ({:?}, {}x{})",
            target.label,
            target.kind,
            descriptor.extent.width,
            descriptor.extent.height
        );
        Ok(target)
    }

    fn create_attachments(
        &self,
        device: &dyn GraphicsDevice,
        extent: Extent2D,
    ) -> Result<Attachments, ResourceError> {
        // Swap chain images are owned by the swap chain.
        let color = match (self.kind, self.color_format) {
            (RenderTargetKind::Texture, Some(format)) => Some(create_attachment(
                device,
                format!("{} Color", self.label),
                extent,
                format,
                TextureUsage::RenderTarget,
            )?),
            _ => None,
        };
        let depth = match self.depth_format {
            Some(format) => match create_attachment(
                device,
                format!("{} Depth", self.label),
                extent,
                format,
                TextureUsage::DepthAttachment,
            ) {
                Ok(depth) => Some(depth),
                Err(e) => {
                    if let Some(color) = color {
                        destroy_attachment(device, color);
                    }
                    return Err(e);
                }
            },
            None => None,
        };
        Ok(Attachments {
            extent,
            color,
            depth,
        })
    }

    /// Identity of the target.
    pub fn id(&self) -> RenderTargetId {
        self.id
    }

    /// Name of the target.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Target kind.
    pub fn kind(&self) -> RenderTargetKind {
        self.kind
    }

    /// Color format, if the target has a color attachment.
    pub fn color_format(&self) -> Option<TextureFormat> {
        self.color_format
    }

    /// Depth format, if the target has a depth attachment.
    pub fn depth_format(&self) -> Option<TextureFormat> {
        self.depth_format
    }

    /// The render pass drawing into this target.
    pub fn render_pass(&self) -> &Arc<RenderPassHandle> {
        &self.render_pass
    }

    /// Current attachment size.
    pub fn extent(&self) -> Extent2D {
        self.attachments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .extent
    }

    /// The color texture of an off-screen target.
    pub fn color_view(&self) -> Option<TextureViewId> {
        self.attachments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .color
            .map(|(_, view)| view)
    }

    /// The depth texture, sampled by shadow receivers for shadow maps.
    pub fn depth_view(&self) -> Option<TextureViewId> {
        self.attachments
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .depth
            .map(|(_, view)| view)
    }

    /// Number of times the attachments were rebuilt.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// The signature programs are validated against.
    pub fn signature(&self) -> TargetSignature {
        TargetSignature {
            id: self.id,
            generation: self.generation(),
            render_pass: self.render_pass.id,
        }
    }

    /// A copy of the current view matrices.
    pub fn view_matrices(&self) -> ViewMatrices {
        *self.view.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Edits the view matrices in place.
    pub fn update_view<R>(&self, update: impl FnOnce(&mut ViewMatrices) -> R) -> R {
        update(&mut self.view.write().unwrap_or_else(PoisonError::into_inner))
    }

    /// The view uniform binding of set 0.
    pub fn view_binding(&self) -> ViewBinding {
        self.view_binding
    }

    /// Completion of the latest submission that rendered into this target.
    pub fn completion(&self) -> &CompletionSignal {
        &self.completion
    }

    /// Begin info for a pass into this target.
    ///
    /// `color_view` overrides the target's own color attachment; the main
    /// target passes the acquired swap chain image here.
    pub fn begin_info(
        &self,
        color_view: Option<TextureViewId>,
        clear: ClearValues,
    ) -> RenderPassBeginInfo {
        let attachments = *self.attachments.read().unwrap_or_else(PoisonError::into_inner);
        RenderPassBeginInfo {
            render_pass: self.render_pass.id,
            color_view: color_view.or(attachments.color.map(|(_, view)| view)),
            depth_view: attachments.depth.map(|(_, view)| view),
            extent: attachments.extent,
            clear,
        }
    }

    /// Rebuilds the attachments at `extent` and bumps the generation.
    ///
    /// The old attachments are only released once the new ones exist.
    pub(crate) fn resize(
        &self,
        device: &dyn GraphicsDevice,
        extent: Extent2D,
    ) -> Result<(), ResourceError> {
        let fresh = self.create_attachments(device, extent)?;
        let old = std::mem::replace(
            &mut *self
                .attachments
                .write()
                .unwrap_or_else(PoisonError::into_inner),
            fresh,
        );
        for attachment in [old.color, old.depth].into_iter().flatten() {
            destroy_attachment(device, attachment);
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        log::debug!(
            "RenderTarget: '{}' resized to {}x{} (generation {generation})",
            self.label,
            extent.width,
            extent.height
        );
        Ok(())
    }

    /// Releases the attachments. Returns the number of failures.
    pub(crate) fn destroy_attachments(&self, device: &dyn GraphicsDevice) -> usize {
        let old = std::mem::take(
            &mut *self
                .attachments
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        );
        [old.color, old.depth]
            .into_iter()
            .flatten()
            .map(|attachment| destroy_attachment(device, attachment))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn infinity_view_projection_ignores_camera_translation() {
        let mut near = ViewMatrices::default();
        let mut far = ViewMatrices::default();
        assert!(near.look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y));
        assert!(far.look_at(Vec3::new(0.0, 0.0, 500.0), Vec3::new(0.0, 0.0, 495.0), Vec3::Y));
        near.set_perspective(1.0, 1.5, 0.1, 100.0);
        far.set_perspective(1.0, 1.5, 0.1, 100.0);
        assert_relative_eq!(
            near.infinity_view_projection(),
            far.infinity_view_projection(),
            epsilon = 1e-4
        );
        assert!(near.view_projection() != far.view_projection());
    }

    #[test]
    fn degenerate_look_at_keeps_previous_view() {
        let mut view = ViewMatrices::default();
        assert!(!view.look_at(Vec3::ONE, Vec3::ONE, Vec3::Y));
        assert_eq!(view, ViewMatrices::default());
    }

    #[test]
    fn view_uniform_fits_one_uniform_element() {
        assert!(
            std::mem::size_of::<ViewUniform>() as u64
                <= crate::services::UNIFORM_ELEMENT_SIZE
        );
    }

    #[test]
    fn pass_flags_per_kind() {
        assert!(RenderTargetKind::SwapChain
            .pass_flags()
            .contains(RenderPassFlags::PRESENT));
        assert!(RenderTargetKind::ShadowMap
            .pass_flags()
            .contains(RenderPassFlags::STORE_DEPTH));
        assert!(!RenderTargetKind::ShadowMap
            .pass_flags()
            .contains(RenderPassFlags::CLEAR_COLOR));
    }
}

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

//! Renderable instances: one renderable placed in the world once
//! ([`UniqueInstance`]) or many times ([`MultipleInstance`]).
//!
//! An instance owns its programs per render target. Programs are generated
//! lazily by [`Drawable::get_ready`] and regenerated whenever the target's
//! signature changes. Any unrecoverable failure marks the instance broken
//! once; broken instances never draw and are pruned by their scene.

mod data;
mod flags;
mod multiple;
mod programs;
mod push;
mod renderable;
mod unique;

pub use self::data::{InstanceDataLayout, InstanceMatrices, InstancePositionScale};
pub use self::flags::{AtomicInstanceFlags, InstanceFlags};
pub use self::multiple::MultipleTransform;
pub use self::programs::{LayerProgram, ProgramState, ProgramsCache};
pub use self::push::{
    FacingCameraBlock, MatrixPushLayout, ModelViewProjectionBlock, TransformVariant,
    ViewProjectionBlock,
};
pub use self::renderable::{GeometryBinding, IndexBinding, LoadState, MaterialLayer, Renderable};
pub use self::unique::UniqueTransform;

use crate::program::{PassKind, PipelineState, Program, ProgramError, ProgramRequest};
use crate::render_target::{RenderTarget, RenderTargetId, ViewMatrices};
use crate::renderer::Renderer;
use crate::services::{ServiceError, TransferService};
use lumen_core::math::{CartesianFrame, Mat4, Vec3};
use lumen_core::renderer::api::{PipelineLayoutDescriptor, ShaderEntry};
use lumen_core::renderer::{CommandRecorder, GraphicsDevice, ResourceError};
use std::borrow::Cow;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use thiserror::Error;

/// Errors raised by instance operations.
#[derive(Debug, Error)]
pub enum InstanceError {
    /// An instance index past the capacity.
    #[error("instance index {index} is out of range (capacity {capacity})")]
    IndexOutOfRange {
        /// The offending index.
        index: u32,
        /// Number of instances available.
        capacity: u32,
    },
    /// A write covering no instance.
    #[error("empty instance range")]
    EmptyRange,
    /// The instance can no longer be used.
    #[error("instance is broken: {0}")]
    Broken(String),
    /// The renderer has no device.
    #[error("renderer is not initialized")]
    NotInitialized,
    /// A device object could not be created or written.
    #[error("device resource error: {0}")]
    Resource(#[from] ResourceError),
}

/// Outcome of preparing an instance for a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Programs exist; the instance can be recorded.
    Ready,
    /// Not yet; try again next frame.
    Pending,
    /// The instance does not take part in this pass.
    Disabled,
    /// The instance is broken and should be dropped.
    Broken,
}

/// What a transform needs to fill a push constant block.
#[derive(Debug, Clone, Copy)]
pub struct PushContext<'a> {
    /// Matrices of the target being drawn.
    pub view: &'a ViewMatrices,
    /// Block the program expects.
    pub layout: MatrixPushLayout,
    /// Instance flags.
    pub flags: InstanceFlags,
    /// Extra transformation of the instance.
    pub extra: Option<Mat4>,
}

/// Placement strategy of an instance.
pub trait InstanceTransform: Send + Sync {
    /// Which variant this is.
    fn variant(&self) -> TransformVariant;

    /// Instances drawn per call.
    fn instance_count(&self) -> u32;

    /// Layout of the instance stream, if the variant has one.
    fn instance_layout(&self) -> Option<InstanceDataLayout>;

    /// Whether model data lives in a uniform buffer.
    fn uses_model_uniform_buffer(&self) -> bool;

    /// Whether model data lives in an instance vertex buffer.
    fn uses_model_vertex_buffer(&self) -> bool;

    /// Whether the device side of the model data exists.
    fn is_model_matrices_created(&self) -> bool;

    /// Brings the device copy of the model data up to date.
    ///
    /// ## Returns
    /// `true` if anything was written to the device.
    fn update_video_memory(
        &self,
        device: &dyn GraphicsDevice,
        transfer: &TransferService,
        flags: &AtomicInstanceFlags,
    ) -> Result<bool, InstanceError>;

    /// Binds the instance stream to `slot`. Returns `false` if there is none.
    fn bind_instance_model_layer(&self, recorder: &mut dyn CommandRecorder, slot: u32) -> bool;

    /// Records the push constants of one draw.
    fn push_matrices(&self, recorder: &mut dyn CommandRecorder, context: &PushContext<'_>);

    /// Puts every model frame back to identity.
    fn reset_model_matrices(&self);

    /// Releases the device side of the model data. Returns the failure count.
    fn destroy_model_matrices(&self, device: &dyn GraphicsDevice) -> usize;

    /// Position used for sorting and culling.
    fn world_position(&self) -> Vec3;
}

/// The object-safe face of an instance, as seen by scenes.
pub trait Drawable: Send + Sync {
    /// Name of the drawn renderable.
    fn name(&self) -> &str;

    /// Current flags.
    fn flags(&self) -> InstanceFlags;

    /// Whether the instance failed for good.
    fn is_broken(&self) -> bool;

    /// Instances drawn per call.
    fn instance_count(&self) -> u32;

    /// Position used for sorting and culling.
    fn world_position(&self) -> Vec3;

    /// Generates missing programs for `target` and `pass`.
    fn get_ready(&self, renderer: &Renderer, target: &RenderTarget, pass: PassKind) -> Readiness;

    /// Whether programs for the current signature of `target` exist.
    fn is_ready(&self, target: &RenderTarget, pass: PassKind) -> bool;

    /// Uploads stale model data.
    fn update_video_memory(&self, renderer: &Renderer) -> Result<bool, InstanceError>;

    /// Records one draw per material layer into an open pass.
    ///
    /// ## Returns
    /// The number of draw calls recorded.
    fn record(&self, target: &RenderTarget, recorder: &mut dyn CommandRecorder, pass: PassKind)
        -> usize;

    /// Forgets the programs built for `target`.
    fn destroy_programs(&self, target: RenderTargetId) -> usize;

    /// Releases every device object of the instance.
    fn destroy(&self, renderer: &Renderer) -> usize;

    /// [`Drawable::get_ready`] for color passes.
    fn get_ready_for_render(&self, renderer: &Renderer, target: &RenderTarget) -> Readiness {
        self.get_ready(renderer, target, PassKind::Render)
    }

    /// [`Drawable::get_ready`] for shadow map passes.
    fn get_ready_for_shadow_casting(&self, renderer: &Renderer, target: &RenderTarget) -> Readiness {
        self.get_ready(renderer, target, PassKind::ShadowCasting)
    }

    /// Whether the instance can be rendered into `target`.
    fn is_ready_to_render(&self, target: &RenderTarget) -> bool {
        self.is_ready(target, PassKind::Render)
    }

    /// Whether the instance can be rendered into the shadow map `target`.
    fn is_ready_to_cast_shadows(&self, target: &RenderTarget) -> bool {
        self.is_ready(target, PassKind::ShadowCasting)
    }

    /// [`Drawable::record`] for color passes.
    fn render(&self, target: &RenderTarget, recorder: &mut dyn CommandRecorder) -> usize {
        self.record(target, recorder, PassKind::Render)
    }

    /// [`Drawable::record`] for shadow map passes.
    fn cast_shadows(&self, target: &RenderTarget, recorder: &mut dyn CommandRecorder) -> usize {
        self.record(target, recorder, PassKind::ShadowCasting)
    }
}

/// A renderable placed in the world through a transform variant.
pub struct RenderableInstance<T: InstanceTransform> {
    renderable: Arc<dyn Renderable>,
    transform: T,
    flags: AtomicInstanceFlags,
    programs: Mutex<ProgramsCache>,
    extra: RwLock<Option<Mat4>>,
    animation_frame: AtomicU32,
    broken_reason: OnceLock<String>,
}

/// One instance, its matrices pushed with every draw.
pub type UniqueInstance = RenderableInstance<UniqueTransform>;
/// Many instances drawn with one call per material layer.
pub type MultipleInstance = RenderableInstance<MultipleTransform>;

impl<T: InstanceTransform> std::fmt::Debug for RenderableInstance<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderableInstance")
            .field("renderable", &self.renderable.name())
            .field("variant", &self.transform.variant())
            .field("flags", &self.flags.load())
            .finish()
    }
}

impl<T: InstanceTransform> RenderableInstance<T> {
    /// Places `renderable` through `transform`. Only option bits of `flags`
    /// are kept.
    pub fn new(renderable: Arc<dyn Renderable>, transform: T, flags: InstanceFlags) -> Self {
        Self {
            renderable,
            transform,
            flags: AtomicInstanceFlags::new(flags.intersection(InstanceFlags::OPTIONS)),
            programs: Mutex::new(ProgramsCache::default()),
            extra: RwLock::new(None),
            animation_frame: AtomicU32::new(0),
            broken_reason: OnceLock::new(),
        }
    }

    /// The drawn renderable.
    pub fn renderable(&self) -> &Arc<dyn Renderable> {
        &self.renderable
    }

    /// The placement.
    pub fn transform(&self) -> &T {
        &self.transform
    }

    /// Why the instance broke, if it did.
    pub fn broken_reason(&self) -> Option<&str> {
        self.broken_reason.get().map(String::as_str)
    }

    /// Sets or clears option flags. Every program is dropped, since the
    /// options shape the pipeline state.
    pub fn set_option(&self, option: InstanceFlags, enabled: bool) {
        let before = self.flags.load();
        self.flags
            .set(option.intersection(InstanceFlags::OPTIONS), enabled);
        if self.flags.load() == before {
            return;
        }
        self.programs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.flags
            .remove(InstanceFlags::READY_TO_RENDER | InstanceFlags::READY_TO_CAST_SHADOWS);
    }

    /// Extra transformation combined with the model data of every draw.
    pub fn set_extra_transformation(&self, extra: Option<Mat4>) {
        let mut current = self.extra.write().unwrap_or_else(PoisonError::into_inner);
        *current = extra;
        self.flags
            .set(InstanceFlags::APPLY_TRANSFORMATION_MATRIX, extra.is_some());
    }

    /// The extra transformation.
    pub fn extra_transformation(&self) -> Option<Mat4> {
        *self.extra.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Selects the skeletal animation frame.
    pub fn set_animation_frame(&self, frame: u32) {
        self.animation_frame.store(frame, Ordering::Relaxed);
    }

    /// The skeletal animation frame.
    pub fn animation_frame(&self) -> u32 {
        self.animation_frame.load(Ordering::Relaxed)
    }

    /// Marks the instance broken. Only the first reason is kept and logged.
    pub fn mark_broken(&self, reason: impl Into<String>) {
        self.flags.insert(InstanceFlags::BROKEN);
        let reason = reason.into();
        if self.broken_reason.set(reason.clone()).is_ok() {
            log::error!(
                "RenderableInstance: '{}' is broken: {reason}",
                self.renderable.name()
            );
        }
    }

    fn build_layer(
        &self,
        renderer: &Renderer,
        target: &RenderTarget,
        pass: PassKind,
        layer_index: usize,
        flags: InstanceFlags,
    ) -> Result<LayerProgram, ProgramError> {
        let device = renderer
            .device()
            .ok_or(ProgramError::Service(ServiceError::NotInitialized("Renderer")))?;
        let layer = &self.renderable.layers()[layer_index];
        let geometry = self.renderable.geometry();
        let push_layout = MatrixPushLayout::select(self.transform.variant(), flags, pass);
        let instance_layout = self.transform.instance_layout();
        let request = ProgramRequest {
            renderable: self.renderable.as_ref(),
            layer_index,
            layer,
            pass,
            target_kind: target.kind(),
            flags,
            push_layout,
            instance_layout,
        };
        let source = renderer.program_generator().generate(&request)?;

        let services = renderer.services();
        let vertex = ShaderEntry {
            module: services
                .shader_modules
                .get_or_create(device.as_ref(), &source.vertex.module)?,
            entry_point: source.vertex.entry_point.clone(),
        };
        let fragment = match &source.fragment {
            Some(stage) => Some(ShaderEntry {
                module: services
                    .shader_modules
                    .get_or_create(device.as_ref(), &stage.module)?,
                entry_point: stage.entry_point.clone(),
            }),
            None => None,
        };

        let mut set_layouts = vec![services.pipeline_layouts.view_set_layout()?];
        set_layouts.extend(layer.set_layout);
        let layout = services.pipeline_layouts.pipeline_layout(
            device.as_ref(),
            &PipelineLayoutDescriptor {
                label: Some(Cow::Borrowed("Instance Pipeline Layout")),
                set_layouts,
                push_constant_ranges: vec![push_layout.push_constant_range()],
            },
        )?;
        let vertex_buffers = services
            .vertex_formats
            .vertex_layouts(&geometry.vertex_layout, instance_layout)?;

        let program = Program {
            vertex,
            fragment,
            layout,
            vertex_buffers: vertex_buffers.as_ref().clone(),
        };
        let state = PipelineState::for_layer(flags, layer, geometry.topology, pass);
        let pipeline = renderer.finalize_graphics_pipeline(target, &program, &state)?;
        Ok(LayerProgram {
            pipeline,
            push_layout,
            material_set: layer.descriptor_set,
        })
    }
}

impl<T: InstanceTransform> Drawable for RenderableInstance<T> {
    fn name(&self) -> &str {
        self.renderable.name()
    }

    fn flags(&self) -> InstanceFlags {
        self.flags.load()
    }

    fn is_broken(&self) -> bool {
        self.flags.contains(InstanceFlags::BROKEN)
    }

    fn instance_count(&self) -> u32 {
        self.transform.instance_count()
    }

    fn world_position(&self) -> Vec3 {
        self.transform.world_position()
    }

    fn get_ready(&self, renderer: &Renderer, target: &RenderTarget, pass: PassKind) -> Readiness {
        if self.is_broken() {
            return Readiness::Broken;
        }
        let flags = self.flags.load().intersection(InstanceFlags::OPTIONS);
        if flags.contains(InstanceFlags::HIDDEN)
            || (pass == PassKind::ShadowCasting && !flags.contains(InstanceFlags::CASTS_SHADOWS))
        {
            return Readiness::Disabled;
        }
        match self.renderable.load_state() {
            LoadState::Loading => return Readiness::Pending,
            LoadState::Failed => {
                self.mark_broken(format!("renderable '{}' failed to load", self.renderable.name()));
                return Readiness::Broken;
            }
            LoadState::Loaded => {}
        }

        let signature = target.signature();
        let mut programs = self.programs.lock().unwrap_or_else(PoisonError::into_inner);
        match programs.state(&signature, pass) {
            ProgramState::Ready => return Readiness::Ready,
            ProgramState::Broken => return Readiness::Broken,
            ProgramState::NotReady | ProgramState::Generating => {}
        }
        programs.begin(signature, pass);

        let layer_count = self.renderable.layers().len();
        let built = if layer_count == 0 {
            Err(ProgramError::Generation("renderable has no material layer".to_string()))
        } else {
            (0..layer_count)
                .map(|index| self.build_layer(renderer, target, pass, index, flags))
                .collect::<Result<Vec<_>, _>>()
        };
        match built {
            Ok(layers) => {
                log::debug!(
                    "RenderableInstance: '{}' ready for '{}' ({pass:?}, {} layer(s))",
                    self.renderable.name(),
                    target.label(),
                    layers.len()
                );
                programs.complete(signature, pass, layers);
                self.flags.insert(match pass {
                    PassKind::Render => InstanceFlags::READY_TO_RENDER,
                    PassKind::ShadowCasting => InstanceFlags::READY_TO_CAST_SHADOWS,
                });
                Readiness::Ready
            }
            Err(e) => {
                programs.fail(signature, pass);
                drop(programs);
                self.mark_broken(format!("programs for '{}' failed: {e}", target.label()));
                Readiness::Broken
            }
        }
    }

    fn is_ready(&self, target: &RenderTarget, pass: PassKind) -> bool {
        !self.is_broken()
            && self
                .programs
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .state(&target.signature(), pass)
                == ProgramState::Ready
    }

    fn update_video_memory(&self, renderer: &Renderer) -> Result<bool, InstanceError> {
        if self.is_broken() {
            return Ok(false);
        }
        let device = renderer.device().ok_or(InstanceError::NotInitialized)?;
        match self
            .transform
            .update_video_memory(device.as_ref(), &renderer.services().transfer, &self.flags)
        {
            Err(InstanceError::Broken(reason)) => {
                self.mark_broken(reason.clone());
                Err(InstanceError::Broken(reason))
            }
            other => other,
        }
    }

    fn record(
        &self,
        target: &RenderTarget,
        recorder: &mut dyn CommandRecorder,
        pass: PassKind,
    ) -> usize {
        let flags = self.flags.load();
        if flags.contains(InstanceFlags::BROKEN) || flags.contains(InstanceFlags::HIDDEN) {
            return 0;
        }
        let instances = self.transform.instance_count();
        if instances == 0 {
            return 0;
        }
        let layers = self
            .programs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ready_layers(&target.signature(), pass);
        let Some(layers) = layers else {
            log::trace!(
                "RenderableInstance: '{}' has no programs for '{}'",
                self.renderable.name(),
                target.label()
            );
            return 0;
        };

        let geometry = self.renderable.geometry();
        recorder.set_vertex_buffer(0, geometry.vertex_buffer, 0);
        if self.transform.uses_model_vertex_buffer()
            && !self.transform.bind_instance_model_layer(recorder, 1)
        {
            log::trace!(
                "RenderableInstance: '{}' has no instance buffer yet",
                self.renderable.name()
            );
            return 0;
        }
        if let Some(index) = geometry.index {
            recorder.set_index_buffer(index.buffer, 0, index.format);
        }

        let view = target.view_matrices();
        let extra = self.extra_transformation();
        let view_set = target.view_binding().set;
        for layer in layers.iter() {
            recorder.set_pipeline(layer.pipeline.id);
            recorder.set_descriptor_set(0, view_set);
            if let Some(set) = layer.material_set {
                recorder.set_descriptor_set(1, set);
            }
            self.transform.push_matrices(
                recorder,
                &PushContext {
                    view: &view,
                    layout: layer.push_layout,
                    flags,
                    extra,
                },
            );
            match geometry.index {
                Some(_) => recorder.draw_indexed(geometry.element_range(), 0, 0..instances),
                None => recorder.draw(geometry.element_range(), 0..instances),
            }
        }
        layers.len()
    }

    fn destroy_programs(&self, target: RenderTargetId) -> usize {
        self.programs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove_target(target)
    }

    fn destroy(&self, renderer: &Renderer) -> usize {
        self.programs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.flags.remove(
            InstanceFlags::READY_TO_RENDER
                | InstanceFlags::READY_TO_CAST_SHADOWS
                | InstanceFlags::POSITIONS_SYNCHRONIZED,
        );
        match renderer.device() {
            Some(device) => self.transform.destroy_model_matrices(device.as_ref()),
            None => 0,
        }
    }
}

impl RenderableInstance<UniqueTransform> {
    /// A single instance at `frame`.
    pub fn unique(renderable: Arc<dyn Renderable>, frame: CartesianFrame, flags: InstanceFlags) -> Self {
        Self::new(renderable, UniqueTransform::new(frame), flags)
    }

    /// The model frame.
    pub fn frame(&self) -> CartesianFrame {
        self.transform.frame()
    }

    /// Moves the instance.
    pub fn set_frame(&self, frame: CartesianFrame) {
        self.transform.set_frame(frame);
    }
}

impl RenderableInstance<MultipleTransform> {
    /// `capacity` instances laid out as `layout`, all active at identity.
    /// A batch without capacity is broken from the start.
    pub fn multiple(
        renderable: Arc<dyn Renderable>,
        capacity: u32,
        layout: InstanceDataLayout,
        flags: InstanceFlags,
    ) -> Self {
        let instance = Self::new(
            renderable,
            MultipleTransform::new(capacity, layout),
            flags | InstanceFlags::ENABLE_INSTANCING,
        );
        if capacity == 0 {
            instance.mark_broken("instance batch created with capacity 0");
        }
        instance
    }

    /// Writes the frame of instance `index`.
    pub fn update_local_data(&self, index: u32, frame: &CartesianFrame) -> Result<(), InstanceError> {
        self.update_local_data_range(index, std::slice::from_ref(frame))
    }

    /// Writes the frames of instances `start..start + frames.len()`.
    ///
    /// Safe to call from several threads on disjoint ranges while the render
    /// thread uploads.
    pub fn update_local_data_range(
        &self,
        start: u32,
        frames: &[CartesianFrame],
    ) -> Result<(), InstanceError> {
        self.transform.write_frames(start, frames)?;
        self.flags.remove(InstanceFlags::POSITIONS_SYNCHRONIZED);
        Ok(())
    }

    /// Sets how many instances are drawn, clamped to the capacity.
    pub fn set_active_instance_count(&self, count: u32) -> u32 {
        let (count, grew) = self.transform.set_active_count(count);
        if grew {
            self.flags.remove(InstanceFlags::POSITIONS_SYNCHRONIZED);
        }
        count
    }

    /// Instances currently drawn.
    pub fn active_instance_count(&self) -> u32 {
        self.transform.active_count()
    }

    /// Puts every instance back to identity.
    pub fn reset_model_matrices(&self) {
        self.transform.reset_model_matrices();
        self.flags.remove(InstanceFlags::POSITIONS_SYNCHRONIZED);
    }

    /// Whether the device data matches the host data.
    pub fn is_synchronized(&self) -> bool {
        self.flags.contains(InstanceFlags::POSITIONS_SYNCHRONIZED)
    }
}

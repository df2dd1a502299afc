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

//! The frame orchestrator: device, swap chain, caches, render targets and
//! the per-frame record/submit/present cycle.

use crate::cache::{
    AttachmentFormats, CacheStats, GraphicsPipeline, PipelineCache, RenderPassCache,
    RenderPassFlags, RenderPassHandle, RenderPassKey, SamplerCache, SamplerFlags, SamplerHandle,
    SamplerKind,
};
use crate::config::RendererConfig;
use crate::program::{PipelineState, Program, ProgramGenerator};
use crate::render_target::{
    RenderTarget, RenderTargetDescriptor, RenderTargetId, RenderTargetKind, ViewBinding,
};
use crate::scene::{Overlay, Scene, ShutdownSignal};
use crate::services::{RenderServices, ServiceError};
use crate::statistics::{FrameStatistics, StatisticsSnapshot, Stopwatch};
use crate::swap_chain::{SwapChain, SwapChainFrame, SwapChainStatus};
use ahash::AHashMap;
use lumen_core::event::NotificationHub;
use lumen_core::platform::RenderWindow;
use lumen_core::renderer::api::{
    BlendMode, ClearValues, CommandBufferId, CommandBufferUsage, CommandPoolDescriptor,
    CommandPoolId, CompareFunction, DepthStencilState, DescriptorBinding, DescriptorPoolId,
    DescriptorResource, DeviceRequest, Extent2D, GraphicsPipelineDescriptor, SubmissionId,
    SubmitInfo, SwapChainDescriptor,
};
use lumen_core::renderer::{
    DeviceSelector, GraphicsDevice, PipelineError, RenderError, ResourceError,
};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;

/// Notifications published to [`Renderer::subscribe`] receivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendererEvent {
    /// The swap chain was rebuilt; per-target state keyed by the old
    /// generation is stale.
    SwapChainRecreated {
        /// New swap chain generation.
        generation: u64,
        /// New image size.
        extent: Extent2D,
    },
    /// An off-screen target was registered.
    RenderTargetRegistered(RenderTargetId),
    /// A target was destroyed; programs built for it must be dropped.
    RenderTargetDestroyed(RenderTargetId),
    /// The renderer hit a fatal error and asked the engine to stop.
    ShutdownRequested {
        /// What went wrong.
        reason: String,
    },
}

/// Fatal renderer errors.
#[derive(Debug, Error)]
pub enum RendererError {
    /// `initialize` was called twice.
    #[error("renderer is already initialized")]
    AlreadyInitialized,
    /// The operation needs an initialized renderer.
    #[error("renderer is not initialized")]
    NotInitialized,
    /// No device could be selected.
    #[error("device selection failed: {0}")]
    DeviceSelection(RenderError),
    /// A sub-service failed.
    #[error("render service '{service}' failed: {source}")]
    Service {
        /// The failing service.
        service: &'static str,
        /// Its error.
        #[source]
        source: ServiceError,
    },
    /// The swap chain could not be created or recreated.
    #[error("swap chain failure: {0}")]
    SwapChain(RenderError),
    /// The window kept a zero-sized framebuffer.
    #[error("framebuffer stayed empty after {polls} polls")]
    EmptyFramebuffer {
        /// Number of polls made.
        polls: u32,
    },
    /// A device object could not be created.
    #[error("device resource error: {0}")]
    Resource(#[from] ResourceError),
    /// Any other device failure.
    #[error("render error: {0}")]
    Render(#[from] RenderError),
}

/// What happened to one call of [`Renderer::render_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was submitted and presented.
    Rendered {
        /// Draw calls recorded by the scene and the overlay.
        draws: usize,
        /// The submission of the frame.
        submission: SubmissionId,
    },
    /// The frame was dropped; the next one is attempted normally.
    Skipped,
    /// Video output is disabled by configuration.
    Disabled,
    /// The renderer stopped for good.
    ShutdownRequested,
}

/// Owns the device connection and everything built on it.
///
/// The renderer is shared by reference with every object that needs it;
/// all per-frame operations take `&self`. Caches are populated lazily and
/// only released by [`Renderer::terminate`].
pub struct Renderer {
    config: RendererConfig,
    selector: Arc<dyn DeviceSelector>,
    window: Arc<dyn RenderWindow>,
    program_generator: Arc<dyn ProgramGenerator>,
    device: Option<Arc<dyn GraphicsDevice>>,
    services: RenderServices,
    descriptor_pool: Option<DescriptorPoolId>,
    offscreen_pool: Option<CommandPoolId>,
    swap_chain: Mutex<Option<SwapChain>>,
    main_target: Option<Arc<RenderTarget>>,
    targets: RwLock<AHashMap<RenderTargetId, Arc<RenderTarget>>>,
    offscreen_buffers: Mutex<AHashMap<RenderTargetId, CommandBufferId>>,
    render_passes: RenderPassCache,
    samplers: SamplerCache,
    pipelines: PipelineCache,
    statistics: Mutex<FrameStatistics>,
    clear: Mutex<ClearValues>,
    events: NotificationHub<RendererEvent>,
    shutdown: ShutdownSignal,
    resize_pending: AtomicBool,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("initialized", &self.is_initialized())
            .field("window", &self.window.id())
            .field("descriptor_pool", &self.descriptor_pool)
            .field("render_passes", &self.render_passes.stats())
            .field("samplers", &self.samplers.stats())
            .field("pipelines", &self.pipelines.stats())
            .finish()
    }
}

impl Renderer {
    /// Builds an uninitialized renderer.
    ///
    /// ## Arguments
    /// * `config` - Renderer settings.
    /// * `selector` - Picks the device during [`Renderer::initialize`].
    /// * `window` - The window presented into.
    /// * `program_generator` - Produces shader code for material layers.
    pub fn new(
        config: RendererConfig,
        selector: Arc<dyn DeviceSelector>,
        window: Arc<dyn RenderWindow>,
        program_generator: Arc<dyn ProgramGenerator>,
    ) -> Self {
        log::info!("Renderer created (uninitialized).");
        Self {
            statistics: Mutex::new(FrameStatistics::new(config.statistics_window)),
            clear: Mutex::new(ClearValues {
                color: config.clear_color,
                depth: config.clear_depth,
                stencil: config.clear_stencil,
            }),
            config,
            selector,
            window,
            program_generator,
            device: None,
            services: RenderServices::default(),
            descriptor_pool: None,
            offscreen_pool: None,
            swap_chain: Mutex::new(None),
            main_target: None,
            targets: RwLock::new(AHashMap::new()),
            offscreen_buffers: Mutex::new(AHashMap::new()),
            render_passes: RenderPassCache::new(),
            samplers: SamplerCache::new(),
            pipelines: PipelineCache::new(),
            events: NotificationHub::new(),
            shutdown: ShutdownSignal::new(),
            resize_pending: AtomicBool::new(false),
        }
    }

    /// Selects a device and brings up services, swap chain, descriptor pool
    /// and the main render target, in that order.
    ///
    /// ## Errors
    /// Any failure is fatal. Whatever was created before it is released
    /// again and the renderer stays uninitialized.
    pub fn initialize(&mut self) -> Result<(), RendererError> {
        if self.device.is_some() {
            return Err(RendererError::AlreadyInitialized);
        }
        log::info!("Renderer: Initializing...");
        match self.initialize_inner() {
            Ok(()) => {
                log::info!("Renderer: initialized.");
                Ok(())
            }
            Err(e) => {
                log::error!("Renderer: initialization failed: {e}");
                let leaked = self.terminate();
                if leaked > 0 {
                    log::warn!("Renderer: {leaked} object(s) could not be released after the failure");
                }
                Err(e)
            }
        }
    }

    fn initialize_inner(&mut self) -> Result<(), RendererError> {
        // --- 1. Device selection ---
        let device = pollster::block_on(self.selector.select_device(&DeviceRequest::default()))
            .map_err(RendererError::DeviceSelection)?;
        let adapter = device.adapter_info();
        log::info!(
            "Renderer: using '{}' ({:?}, {:?})",
            adapter.name,
            adapter.backend,
            adapter.device_type
        );
        self.device = Some(device.clone());

        // --- 2. Sub-services ---
        self.services
            .initialize(&device)
            .map_err(|(service, source)| RendererError::Service { service, source })?;

        // --- 3. Swap chain with one command pool and buffer per image ---
        let extent = self.wait_for_framebuffer()?;
        let chain = SwapChain::create(
            device.as_ref(),
            &SwapChainDescriptor {
                extent,
                image_count: self.config.swap_chain.preferred_image_count,
                present_mode: self.config.swap_chain.present_mode(),
            },
        )
        .map_err(RendererError::SwapChain)?;
        let color_format = chain.format();
        let extent = chain.extent();
        *self
            .swap_chain
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner) = Some(chain);

        // --- 4. Descriptor pool ---
        self.descriptor_pool =
            Some(device.create_descriptor_pool(&self.config.descriptor_pool.descriptor())?);

        // --- 5. Off-screen command pool ---
        self.offscreen_pool = Some(device.create_command_pool(&CommandPoolDescriptor {
            label: Some(Cow::Borrowed("Off-screen Command Pool")),
            transient: true,
            resettable: true,
        })?);

        // --- 6. Main render target ---
        let main = self.create_render_target(&RenderTargetDescriptor {
            label: Cow::Borrowed("main"),
            kind: RenderTargetKind::SwapChain,
            extent,
            color_format: Some(color_format),
            depth_format: self.config.swap_chain.depth_format,
        })?;
        self.main_target = Some(Arc::new(main));
        Ok(())
    }

    /// Releases everything the renderer created, in reverse dependency
    /// order, and drops the device.
    ///
    /// ## Returns
    /// The number of objects that failed to be released.
    pub fn terminate(&mut self) -> usize {
        let Some(device) = self.device.clone() else {
            return 0;
        };
        log::info!("Renderer shutting down...");
        let mut errors = 0;
        if let Err(e) = device.wait_idle() {
            log::warn!("Renderer: wait_idle failed during shutdown: {e}");
            errors += 1;
        }

        // --- 1. Render targets ---
        let mut targets: Vec<_> = self
            .targets
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, target)| target)
            .collect();
        targets.extend(self.main_target.take());
        for target in targets {
            errors += self.release_render_target(device.as_ref(), &target);
            self.events
                .publish(RendererEvent::RenderTargetDestroyed(target.id()));
        }

        // --- 2. Caches ---
        errors += self.pipelines.release(device.as_ref());
        errors += self.render_passes.release(device.as_ref());
        errors += self.samplers.release(device.as_ref());

        // --- 3. Command system ---
        self.offscreen_buffers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        if let Some(pool) = self.offscreen_pool.take() {
            if let Err(e) = device.destroy_command_pool(pool) {
                log::error!("Renderer: failed to destroy the off-screen command pool: {e}");
                errors += 1;
            }
        }

        // --- 4. Swap chain ---
        if let Some(mut chain) = self
            .swap_chain
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            errors += chain.destroy(device.as_ref());
        }

        // --- 5. Descriptor pool ---
        if let Some(pool) = self.descriptor_pool.take() {
            if let Err(e) = device.destroy_descriptor_pool(pool) {
                log::error!("Renderer: failed to destroy the descriptor pool: {e}");
                errors += 1;
            }
        }

        // --- 6. Sub-services, in reverse order ---
        errors += self.services.terminate(device.as_ref());

        self.device = None;
        if errors > 0 {
            log::warn!("Renderer: terminated with {errors} error(s).");
        } else {
            log::info!("Renderer: terminated.");
        }
        errors
    }

    fn wait_for_framebuffer(&self) -> Result<Extent2D, RendererError> {
        let interval = Duration::from_millis(self.config.resize_poll_interval_ms);
        let mut polls = 0;
        loop {
            let extent = self.window.framebuffer_extent();
            if !extent.is_empty() {
                return Ok(extent);
            }
            if polls >= self.config.resize_max_polls {
                return Err(RendererError::EmptyFramebuffer { polls });
            }
            if polls == 0 {
                log::debug!("Renderer: framebuffer is empty, waiting for the window to be restored");
            }
            polls += 1;
            std::thread::sleep(interval);
        }
    }

    // --- Accessors ---

    /// Whether the renderer holds a device.
    pub fn is_initialized(&self) -> bool {
        self.device.is_some()
    }

    /// The selected device.
    pub fn device(&self) -> Option<&Arc<dyn GraphicsDevice>> {
        self.device.as_ref()
    }

    /// The sub-services.
    pub fn services(&self) -> &RenderServices {
        &self.services
    }

    /// The program generator.
    pub fn program_generator(&self) -> &dyn ProgramGenerator {
        self.program_generator.as_ref()
    }

    /// Renderer settings.
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// The fixed-size descriptor pool.
    pub fn descriptor_pool(&self) -> Option<DescriptorPoolId> {
        self.descriptor_pool
    }

    /// The swap chain target.
    pub fn main_render_target(&self) -> Option<&Arc<RenderTarget>> {
        self.main_target.as_ref()
    }

    /// Health of the swap chain.
    pub fn swap_chain_status(&self) -> Option<SwapChainStatus> {
        self.lock_swap_chain().as_ref().map(SwapChain::status)
    }

    /// Generation of the swap chain.
    pub fn swap_chain_generation(&self) -> Option<u64> {
        self.lock_swap_chain().as_ref().map(SwapChain::generation)
    }

    /// A new receiver of [`RendererEvent`]s.
    pub fn subscribe(&self) -> flume::Receiver<RendererEvent> {
        self.events.subscribe()
    }

    /// The stop request shared with the engine loops.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Frame timing and counters.
    pub fn statistics(&self) -> StatisticsSnapshot {
        self.lock_statistics().snapshot()
    }

    /// Pipeline cache counters.
    pub fn pipeline_cache_stats(&self) -> CacheStats {
        self.pipelines.stats()
    }

    /// Render pass cache counters.
    pub fn render_pass_cache_stats(&self) -> CacheStats {
        self.render_passes.stats()
    }

    /// Sampler cache counters.
    pub fn sampler_cache_stats(&self) -> CacheStats {
        self.samplers.stats()
    }

    fn lock_swap_chain(&self) -> MutexGuard<'_, Option<SwapChain>> {
        self.swap_chain.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_statistics(&self) -> MutexGuard<'_, FrameStatistics> {
        self.statistics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_clear(&self) -> MutexGuard<'_, ClearValues> {
        self.clear.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Values the next render passes clear their attachments to. Starts out
    /// from the configuration.
    pub fn clear_values(&self) -> ClearValues {
        *self.lock_clear()
    }

    /// Sets the color attachments are cleared to from the next frame on.
    pub fn set_clear_color(&self, color: [f32; 4]) {
        self.lock_clear().color = color;
    }

    /// Sets the depth and stencil values cleared to from the next frame on.
    pub fn set_clear_depth_stencil(&self, depth: f32, stencil: u32) {
        let mut clear = self.lock_clear();
        clear.depth = depth;
        clear.stencil = stencil;
    }

    /// Stops the engine loops and tells subscribers why.
    pub fn request_shutdown(&self, reason: impl Into<String>) {
        self.shutdown.request();
        self.events.publish(RendererEvent::ShutdownRequested {
            reason: reason.into(),
        });
    }

    // --- Caches ---

    /// Returns the render pass for `(id, flags, formats)`, creating it on
    /// first use.
    ///
    /// ## Returns
    /// `None` if the renderer is not initialized or creation failed; the
    /// failure is logged and the caller must treat its target as unusable.
    pub fn get_render_pass(
        &self,
        id: &str,
        flags: RenderPassFlags,
        formats: AttachmentFormats,
    ) -> Option<Arc<RenderPassHandle>> {
        let Some(device) = self.device.as_ref() else {
            log::error!("Renderer: render pass '{id}' requested before initialization");
            return None;
        };
        let key = RenderPassKey {
            id: id.to_string(),
            flags,
            formats,
        };
        match self.render_passes.get_or_create(device.as_ref(), key) {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("Renderer: render pass '{id}' unavailable: {e}");
                None
            }
        }
    }

    /// Returns the sampler for `(kind, flags)`, creating it on first use.
    ///
    /// ## Returns
    /// `None` if the renderer is not initialized or creation failed.
    pub fn get_sampler(&self, kind: SamplerKind, flags: SamplerFlags) -> Option<Arc<SamplerHandle>> {
        let Some(device) = self.device.as_ref() else {
            log::error!("Renderer: sampler {kind:?} requested before initialization");
            return None;
        };
        match self.samplers.get_or_create(device.as_ref(), kind, flags) {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("Renderer: sampler {kind:?} unavailable: {e}");
                None
            }
        }
    }

    /// Binds `program` and `state` to the render pass and formats of
    /// `target`, returning the cached pipeline with the same structural
    /// signature or compiling a new one.
    ///
    /// ## Errors
    /// Blending into a target without a color attachment, or a device
    /// compilation failure.
    pub fn finalize_graphics_pipeline(
        &self,
        target: &RenderTarget,
        program: &Program,
        state: &PipelineState,
    ) -> Result<Arc<GraphicsPipeline>, ResourceError> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| ResourceError::BackendError("renderer is not initialized".to_string()))?;
        if state.blend != BlendMode::Opaque && target.color_format().is_none() {
            return Err(PipelineError::IncompatibleColorTarget(format!(
                "'{}' has no color attachment to blend into",
                target.label()
            ))
            .into());
        }
        let depth_stencil = target.depth_format().map(|format| DepthStencilState {
            format,
            depth_test_enabled: state.depth_test,
            depth_write_enabled: state.depth_write,
            depth_compare: CompareFunction::LessEqual,
            stencil_test_enabled: state.stencil_test && format.has_stencil(),
            stencil_write_enabled: state.stencil_write && format.has_stencil(),
        });
        let descriptor = GraphicsPipelineDescriptor {
            label: Some(Cow::Owned(format!("{} Pipeline", target.label()))),
            layout: program.layout,
            render_pass: target.render_pass().id,
            vertex: program.vertex.clone(),
            fragment: program.fragment.clone(),
            vertex_buffers: program.vertex_buffers.clone(),
            topology: state.topology,
            cull_mode: state.cull_mode,
            front_face: state.front_face,
            blend: state.blend,
            color_format: target.color_format(),
            depth_stencil,
            sample_count: 1,
        };
        self.pipelines.get_or_create(device.as_ref(), &descriptor)
    }

    /// The command buffer of an off-screen target, allocated on first use
    /// from the off-screen pool.
    pub fn get_command_buffer(&self, target: &RenderTarget) -> Result<CommandBufferId, RenderError> {
        if !target.kind().is_offscreen() {
            return Err(RenderError::Internal(
                "swap chain targets record into the frame command buffer".to_string(),
            ));
        }
        let device = self.device.as_ref().ok_or(RenderError::NotInitialized)?;
        let pool = self.offscreen_pool.ok_or(RenderError::NotInitialized)?;
        let mut buffers = self
            .offscreen_buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(buffer) = buffers.get(&target.id()) {
            return Ok(*buffer);
        }
        let buffer = device.allocate_command_buffer(pool)?;
        log::debug!(
            "Renderer: allocated {buffer:?} for off-screen target '{}'",
            target.label()
        );
        buffers.insert(target.id(), buffer);
        Ok(buffer)
    }

    // --- Render targets ---

    fn create_render_target(
        &self,
        descriptor: &RenderTargetDescriptor,
    ) -> Result<RenderTarget, RendererError> {
        let device = self.device.as_ref().ok_or(RendererError::NotInitialized)?;
        let pool = self.descriptor_pool.ok_or(RendererError::NotInitialized)?;
        let render_pass = self
            .get_render_pass(
                &descriptor.label,
                descriptor.kind.pass_flags(),
                AttachmentFormats {
                    color: descriptor.color_format,
                    depth_stencil: descriptor.depth_format,
                },
            )
            .ok_or_else(|| {
                ResourceError::BackendError(format!(
                    "render pass for '{}' is unavailable",
                    descriptor.label
                ))
            })?;

        let service_error = |source| RendererError::Service {
            service: "SharedUniformBufferService",
            source,
        };
        let slot = self
            .services
            .uniform_buffers
            .allocate(device.as_ref())
            .map_err(service_error)?;
        let layout = match self.services.pipeline_layouts.view_set_layout() {
            Ok(layout) => layout,
            Err(e) => {
                self.services.uniform_buffers.free(slot);
                return Err(service_error(e));
            }
        };
        let set = match device.allocate_descriptor_set(
            pool,
            layout,
            &[DescriptorBinding {
                binding: 0,
                resource: DescriptorResource::UniformBuffer {
                    buffer: slot.buffer,
                    offset: slot.offset,
                    size: slot.size,
                },
            }],
        ) {
            Ok(set) => set,
            Err(e) => {
                self.services.uniform_buffers.free(slot);
                return Err(e.into());
            }
        };

        match RenderTarget::create(device.as_ref(), descriptor, render_pass, ViewBinding { slot, set }) {
            Ok(target) => Ok(target),
            Err(e) => {
                if let Err(free) = device.free_descriptor_set(pool, set) {
                    log::error!("Renderer: failed to free {set:?}: {free}");
                }
                self.services.uniform_buffers.free(slot);
                Err(e.into())
            }
        }
    }

    fn release_render_target(&self, device: &dyn GraphicsDevice, target: &RenderTarget) -> usize {
        let mut errors = target.destroy_attachments(device);
        let binding = target.view_binding();
        if let Some(pool) = self.descriptor_pool {
            if let Err(e) = device.free_descriptor_set(pool, binding.set) {
                log::error!("Renderer: failed to free {:?}: {e}", binding.set);
                errors += 1;
            }
        }
        self.services.uniform_buffers.free(binding.slot);
        errors
    }

    /// Creates and registers an off-screen target.
    ///
    /// ## Errors
    /// Swap chain targets cannot be registered; the renderer owns the only one.
    pub fn register_render_target(
        &self,
        descriptor: RenderTargetDescriptor,
    ) -> Result<Arc<RenderTarget>, RendererError> {
        if !descriptor.kind.is_offscreen() {
            return Err(RendererError::Render(RenderError::Internal(
                "only the renderer creates swap chain targets".to_string(),
            )));
        }
        let target = Arc::new(self.create_render_target(&descriptor)?);
        self.targets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(target.id(), target.clone());
        self.events
            .publish(RendererEvent::RenderTargetRegistered(target.id()));
        Ok(target)
    }

    /// Destroys an off-screen target once its last submission completed.
    ///
    /// ## Returns
    /// The number of device objects that failed to release, or `None` if no
    /// such target is registered.
    pub fn unregister_render_target(&self, id: RenderTargetId) -> Option<usize> {
        let target = self
            .targets
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)?;
        // The command buffer stays in the off-screen pool until teardown.
        self.offscreen_buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        let mut errors = 0;
        if let Some(device) = self.device.as_ref() {
            if let Err(e) = target.completion().wait(device.as_ref()) {
                log::warn!("Renderer: waiting for '{}' failed: {e}", target.label());
            }
            errors = self.release_render_target(device.as_ref(), &target);
            if errors > 0 {
                log::error!(
                    "Renderer: {errors} object(s) of '{}' failed to release",
                    target.label()
                );
            }
        }
        self.events.publish(RendererEvent::RenderTargetDestroyed(id));
        Some(errors)
    }

    /// A registered off-screen target.
    pub fn render_target(&self, id: RenderTargetId) -> Option<Arc<RenderTarget>> {
        self.targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Every registered off-screen target of `kind`, ordered by id.
    pub fn render_targets(&self, kind: RenderTargetKind) -> Vec<Arc<RenderTarget>> {
        let mut targets: Vec<_> = self
            .targets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|target| target.kind() == kind)
            .cloned()
            .collect();
        targets.sort_by_key(|target| target.id());
        targets
    }

    fn upload_view(&self, target: &RenderTarget) -> Result<(), ResourceError> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| ResourceError::BackendError("renderer is not initialized".to_string()))?;
        let uniform = target.view_matrices().uniform();
        self.services.uniform_buffers.write(
            device.as_ref(),
            &self.services.transfer,
            &target.view_binding().slot,
            bytemuck::bytes_of(&uniform),
        )
    }

    // --- Swap chain ---

    /// Schedules a swap chain recreation before the next frame.
    ///
    /// Called by the platform layer on framebuffer resize; safe from any thread.
    pub fn notify_framebuffer_resized(&self) {
        if !self.resize_pending.swap(true, Ordering::AcqRel) {
            log::debug!("Renderer: framebuffer resized, swap chain recreation scheduled");
        }
    }

    /// Recreates the swap chain now.
    pub fn recreate_swap_chain(&self) -> Result<(), RendererError> {
        let device = self.device.as_ref().ok_or(RendererError::NotInitialized)?;
        let main = self.main_target.as_ref().ok_or(RendererError::NotInitialized)?;
        let mut guard = self.lock_swap_chain();
        let chain = guard.as_mut().ok_or(RendererError::NotInitialized)?;
        self.recreate_locked(device.as_ref(), chain, main)
    }

    fn recreate_locked(
        &self,
        device: &dyn GraphicsDevice,
        chain: &mut SwapChain,
        main: &RenderTarget,
    ) -> Result<(), RendererError> {
        let extent = self.wait_for_framebuffer()?;
        chain
            .recreate(device, extent)
            .map_err(RendererError::SwapChain)?;
        main.resize(device, chain.extent())?;
        self.lock_statistics().record_recreation();
        self.events.publish(RendererEvent::SwapChainRecreated {
            generation: chain.generation(),
            extent: chain.extent(),
        });
        Ok(())
    }

    // --- Frames ---

    /// Renders and presents one frame of `scene`, with `overlay` drawn on top.
    ///
    /// A degraded swap chain is recreated first; if that fails the renderer
    /// requests shutdown. Acquire, record and submit failures drop only this
    /// frame.
    pub fn render_frame(&self, scene: &dyn Scene, overlay: Option<&dyn Overlay>) -> FrameOutcome {
        if self.shutdown.is_requested() {
            return FrameOutcome::ShutdownRequested;
        }
        if !self.config.video_enabled {
            return FrameOutcome::Disabled;
        }
        let (Some(device), Some(main)) = (self.device.as_ref(), self.main_target.as_ref()) else {
            log::warn!("Renderer: render_frame called before initialization");
            return FrameOutcome::Skipped;
        };
        let frame_timer = Stopwatch::new();
        let mut guard = self.lock_swap_chain();
        let Some(chain) = guard.as_mut() else {
            return FrameOutcome::Skipped;
        };

        // --- 1. Handle Pending Resizes and Degraded Swap Chains ---
        if self.resize_pending.swap(false, Ordering::AcqRel) {
            chain.mark_degraded();
        }
        if chain.status() == SwapChainStatus::Degraded {
            if let Err(e) = self.recreate_locked(device.as_ref(), chain, main) {
                log::error!("Renderer: swap chain recreation failed: {e}");
                self.request_shutdown(format!("swap chain recreation failed: {e}"));
                return FrameOutcome::ShutdownRequested;
            }
        }

        // --- 2. Acquire Frame from Swap Chain ---
        let frame = match chain.acquire_next_image(device.as_ref()) {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("Renderer: frame skipped, image acquisition failed: {e}");
                self.lock_statistics().skip_frame();
                return FrameOutcome::Skipped;
            }
        };

        // --- 3. Update Device Data ---
        scene.update_video_memory(self);
        if let Err(e) = self.upload_view(main) {
            log::warn!("Renderer: view uniform upload for '{}' failed: {e}", main.label());
        }

        // --- 4. Record the Main Pass ---
        let draws = match self.record_main_pass(device.as_ref(), main, &frame, scene, overlay) {
            Ok(draws) => draws,
            Err(e) => {
                log::warn!("Renderer: frame dropped, recording failed: {e}");
                chain.release(device.as_ref(), &frame);
                self.lock_statistics().skip_frame();
                return FrameOutcome::Skipped;
            }
        };

        // --- 5. Submit and Present ---
        match chain.submit_and_present(device.as_ref(), &frame) {
            Ok(submission) => {
                main.completion().signal(submission);
                self.lock_statistics().record(frame_timer.elapsed());
                FrameOutcome::Rendered { draws, submission }
            }
            Err(e) => {
                log::warn!("Renderer: frame dropped, submission failed: {e}");
                self.lock_statistics().skip_frame();
                FrameOutcome::Skipped
            }
        }
    }

    fn record_main_pass(
        &self,
        device: &dyn GraphicsDevice,
        main: &RenderTarget,
        frame: &SwapChainFrame,
        scene: &dyn Scene,
        overlay: Option<&dyn Overlay>,
    ) -> Result<usize, RenderError> {
        let mut recorder =
            device.begin_command_buffer(frame.command_buffer, CommandBufferUsage::OneTimeSubmit)?;
        recorder.begin_render_pass(&main.begin_info(Some(frame.view), self.clear_values()))?;
        let mut draws = scene.render(self, main, recorder.as_mut());
        if let Some(overlay) = overlay {
            draws += overlay.render(self, main, recorder.as_mut());
        }
        recorder.end_render_pass();
        recorder.finish()?;
        Ok(draws)
    }

    /// Renders every registered shadow map and signals its completion.
    ///
    /// ## Returns
    /// The number of shadow maps submitted.
    pub fn render_shadow_maps(&self, scene: &dyn Scene) -> usize {
        if !self.config.shadow_maps_enabled {
            return 0;
        }
        self.render_offscreen(scene, RenderTargetKind::ShadowMap)
    }

    /// Renders every registered render-to-texture target and signals its
    /// completion.
    ///
    /// ## Returns
    /// The number of targets submitted.
    pub fn render_render_to_textures(&self, scene: &dyn Scene) -> usize {
        if !self.config.render_to_textures_enabled {
            return 0;
        }
        self.render_offscreen(scene, RenderTargetKind::Texture)
    }

    fn render_offscreen(&self, scene: &dyn Scene, kind: RenderTargetKind) -> usize {
        if !self.config.video_enabled || self.shutdown.is_requested() {
            return 0;
        }
        let mut submitted = 0;
        for target in self.render_targets(kind) {
            match self.render_offscreen_target(scene, &target) {
                Ok(submission) => {
                    target.completion().signal(submission);
                    submitted += 1;
                }
                Err(e) => log::warn!(
                    "Renderer: off-screen pass '{}' dropped: {e}",
                    target.label()
                ),
            }
        }
        submitted
    }

    fn render_offscreen_target(
        &self,
        scene: &dyn Scene,
        target: &RenderTarget,
    ) -> Result<SubmissionId, RenderError> {
        let device = self.device.as_ref().ok_or(RenderError::NotInitialized)?;
        let command_buffer = self.get_command_buffer(target)?;
        self.upload_view(target)?;

        let mut recorder = device.begin_command_buffer(command_buffer, CommandBufferUsage::Reusable)?;
        recorder.begin_render_pass(&target.begin_info(None, self.clear_values()))?;
        let draws = match target.kind() {
            RenderTargetKind::ShadowMap => scene.cast_shadows(self, target, recorder.as_mut()),
            _ => scene.render(self, target, recorder.as_mut()),
        };
        recorder.end_render_pass();
        let command_buffer = recorder.finish()?;
        log::trace!(
            "Renderer: '{}' recorded {draws} draw call(s)",
            target.label()
        );
        device.submit(&SubmitInfo {
            command_buffer,
            wait_image: None,
        })
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if self.is_initialized() {
            log::warn!("Renderer dropped while initialized; terminating.");
            self.terminate();
        }
    }
}

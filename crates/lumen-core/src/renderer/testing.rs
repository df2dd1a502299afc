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

//! An in-memory [`GraphicsDevice`] used by tests.
//!
//! [`RecordingDevice`] creates no GPU objects. It hands out IDs, keeps buffer
//! contents in memory, records every command into a log and counts object
//! creations so that caching and idempotence can be asserted. Failures of
//! acquisition, presentation, recreation, pipeline compilation and buffer
//! writes can be scripted.

use crate::renderer::api::*;
use crate::renderer::error::{
    PipelineError, RenderError, ResourceError, ShaderError, SurfaceError,
};
use crate::renderer::traits::{CommandRecorder, DeviceSelector, GraphicsDevice};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One command captured by a [`RecordingDevice`] recorder.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    /// A render pass was begun.
    BeginRenderPass {
        /// The pass.
        render_pass: RenderPassId,
        /// The color attachment.
        color_view: Option<TextureViewId>,
        /// The clear values.
        clear: ClearValues,
    },
    /// A pipeline was bound.
    SetPipeline(RenderPipelineId),
    /// A descriptor set was bound.
    SetDescriptorSet {
        /// Set index.
        index: u32,
        /// The bound set.
        set: DescriptorSetId,
    },
    /// A vertex buffer was bound.
    SetVertexBuffer {
        /// Binding slot.
        slot: u32,
        /// The bound buffer.
        buffer: BufferId,
    },
    /// An index buffer was bound.
    SetIndexBuffer {
        /// The bound buffer.
        buffer: BufferId,
        /// Index width.
        format: IndexFormat,
    },
    /// Push constant bytes were written.
    PushConstants {
        /// Visible stages.
        stages: ShaderStageFlags,
        /// Byte offset.
        offset: u32,
        /// The bytes.
        data: Vec<u8>,
    },
    /// A non-indexed draw.
    Draw {
        /// Vertex range.
        vertices: Range<u32>,
        /// Instance range.
        instances: Range<u32>,
    },
    /// An indexed draw.
    DrawIndexed {
        /// Index range.
        indices: Range<u32>,
        /// Instance range.
        instances: Range<u32>,
    },
    /// The open render pass was ended.
    EndRenderPass,
}

impl RecordedCommand {
    /// Instance count of a draw command, `None` for anything else.
    pub fn instance_count(&self) -> Option<u32> {
        match self {
            RecordedCommand::Draw { instances, .. }
            | RecordedCommand::DrawIndexed { instances, .. } => Some(instances.end - instances.start),
            _ => None,
        }
    }
}

/// Creation and usage counters of a [`RecordingDevice`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCounters {
    /// Buffers created.
    pub buffers_created: usize,
    /// Successful calls to `write_buffer`.
    pub buffer_writes: usize,
    /// Textures created.
    pub textures_created: usize,
    /// Samplers created.
    pub samplers_created: usize,
    /// Shader modules created.
    pub shader_modules_created: usize,
    /// Render passes created.
    pub render_passes_created: usize,
    /// Pipeline layouts created.
    pub pipeline_layouts_created: usize,
    /// Graphics pipelines created.
    pub pipelines_created: usize,
    /// Descriptor set layouts created.
    pub set_layouts_created: usize,
    /// Descriptor sets allocated.
    pub descriptor_sets_allocated: usize,
    /// Command buffers allocated.
    pub command_buffers_allocated: usize,
    /// Command buffers submitted.
    pub submissions: usize,
    /// Images acquired.
    pub acquisitions: usize,
    /// Images presented.
    pub presents: usize,
    /// Images given back without being presented.
    pub releases: usize,
    /// Swap chains created.
    pub swap_chains_created: usize,
    /// Swap chain recreations.
    pub swap_chains_recreated: usize,
}

#[derive(Debug)]
struct PoolState {
    descriptor: DescriptorPoolDescriptor,
    sets: HashMap<DescriptorSetId, Vec<DescriptorType>>,
}

impl PoolState {
    fn used(&self, ty: DescriptorType) -> u32 {
        self.sets
            .values()
            .flat_map(|types| types.iter())
            .filter(|t| **t == ty)
            .count() as u32
    }
}

#[derive(Debug)]
struct SwapChainState {
    descriptor: SwapChainDescriptor,
    images: Vec<TextureViewId>,
    next_image: u32,
    /// The image handed out and not yet presented or released.
    held: Option<u32>,
}

#[derive(Debug, Default)]
struct Script {
    acquire_failures: VecDeque<SurfaceError>,
    suboptimal_acquires: usize,
    present_failures: VecDeque<SurfaceError>,
    finish_failures: usize,
    submit_failures: usize,
    recreate_failures: usize,
    fail_pipelines: bool,
    fail_buffer_writes: bool,
}

#[derive(Debug, Default)]
struct State {
    counters: DeviceCounters,
    script: Script,
    buffers: HashMap<BufferId, Vec<u8>>,
    textures: HashSet<TextureId>,
    views: HashSet<TextureViewId>,
    samplers: HashSet<SamplerId>,
    shader_modules: HashSet<ShaderModuleId>,
    render_passes: HashMap<RenderPassId, RenderPassDescriptor>,
    pipeline_layouts: HashSet<PipelineLayoutId>,
    pipelines: HashMap<RenderPipelineId, GraphicsPipelineDescriptor>,
    set_layouts: HashSet<DescriptorSetLayoutId>,
    descriptor_pools: HashMap<DescriptorPoolId, PoolState>,
    command_pools: HashMap<CommandPoolId, Vec<CommandBufferId>>,
    finished: HashMap<CommandBufferId, Vec<RecordedCommand>>,
    submitted: Vec<Vec<RecordedCommand>>,
    swap_chains: HashMap<SwapChainId, SwapChainState>,
}

/// A [`GraphicsDevice`] that records instead of rendering.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    state: Arc<Mutex<State>>,
    next_id: AtomicUsize,
}

impl RecordingDevice {
    /// Creates an empty device.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            next_id: AtomicUsize::new(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// A snapshot of the counters.
    pub fn counters(&self) -> DeviceCounters {
        self.state().counters
    }

    /// The current contents of a buffer.
    pub fn buffer_contents(&self, id: BufferId) -> Option<Vec<u8>> {
        self.state().buffers.get(&id).cloned()
    }

    /// Number of buffers currently alive.
    pub fn live_buffers(&self) -> usize {
        self.state().buffers.len()
    }

    /// Number of graphics pipelines currently alive.
    pub fn live_pipelines(&self) -> usize {
        self.state().pipelines.len()
    }

    /// Number of descriptor sets currently allocated across all pools.
    pub fn live_descriptor_sets(&self) -> usize {
        self.state()
            .descriptor_pools
            .values()
            .map(|pool| pool.sets.len())
            .sum()
    }

    /// The descriptor a pipeline was created with.
    pub fn pipeline_descriptor(&self, id: RenderPipelineId) -> Option<GraphicsPipelineDescriptor> {
        self.state().pipelines.get(&id).cloned()
    }

    /// Commands of every submitted command buffer, in submission order.
    pub fn submitted(&self) -> Vec<Vec<RecordedCommand>> {
        self.state().submitted.clone()
    }

    /// Commands recorded into `command_buffer` and finished but not yet submitted.
    pub fn finished_commands(&self, command_buffer: CommandBufferId) -> Vec<RecordedCommand> {
        self.state()
            .finished
            .get(&command_buffer)
            .cloned()
            .unwrap_or_default()
    }

    /// Makes the next acquisitions fail with the given errors, in order.
    pub fn fail_next_acquire(&self, error: SurfaceError) {
        self.state().script.acquire_failures.push_back(error);
    }

    /// Makes the next `count` acquisitions succeed but report a suboptimal image.
    pub fn suboptimal_next_acquires(&self, count: usize) {
        self.state().script.suboptimal_acquires = count;
    }

    /// Makes the next presentation fail.
    pub fn fail_next_present(&self, error: SurfaceError) {
        self.state().script.present_failures.push_back(error);
    }

    /// Makes the next `count` command buffer recordings fail in `finish`.
    pub fn fail_next_finish(&self, count: usize) {
        self.state().script.finish_failures = count;
    }

    /// Makes the next `count` submissions fail.
    pub fn fail_next_submit(&self, count: usize) {
        self.state().script.submit_failures = count;
    }

    /// The image of `id` acquired and not yet presented or released.
    pub fn held_image(&self, id: SwapChainId) -> Option<u32> {
        self.state().swap_chains.get(&id).and_then(|chain| chain.held)
    }

    /// Makes the next `count` swap chain recreations fail.
    pub fn fail_recreations(&self, count: usize) {
        self.state().script.recreate_failures = count;
    }

    /// Makes pipeline compilation fail until reset.
    pub fn set_fail_pipelines(&self, fail: bool) {
        self.state().script.fail_pipelines = fail;
    }

    /// Makes buffer writes fail until reset.
    pub fn set_fail_buffer_writes(&self, fail: bool) {
        self.state().script.fail_buffer_writes = fail;
    }

    fn swap_chain_info(&self, descriptor: &SwapChainDescriptor) -> SwapChainInfo {
        SwapChainInfo {
            extent: descriptor.extent,
            image_count: descriptor.image_count.max(1),
            format: TextureFormat::Bgra8UnormSrgb,
        }
    }

    fn swap_chain_images(&self, count: u32) -> Vec<TextureViewId> {
        (0..count.max(1)).map(|_| TextureViewId(self.next())).collect()
    }
}

impl GraphicsDevice for RecordingDevice {
    fn adapter_info(&self) -> AdapterInfo {
        AdapterInfo {
            name: "Recording Device".to_string(),
            backend: BackendType::Other,
            device_type: DeviceType::Cpu,
        }
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        let id = BufferId(self.next());
        let mut state = self.state();
        state.buffers.insert(id, vec![0; descriptor.size as usize]);
        state.counters.buffers_created += 1;
        Ok(id)
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        let mut state = self.state();
        if state.script.fail_buffer_writes {
            return Err(ResourceError::BackendError("scripted write failure".into()));
        }
        let buffer = state.buffers.get_mut(&id).ok_or(ResourceError::NotFound)?;
        let start = offset as usize;
        let end = start + data.len();
        if end > buffer.len() {
            return Err(ResourceError::OutOfBounds);
        }
        buffer[start..end].copy_from_slice(data);
        state.counters.buffer_writes += 1;
        Ok(())
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        self.state()
            .buffers
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_texture(&self, _descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        let id = TextureId(self.next());
        let mut state = self.state();
        state.textures.insert(id);
        state.counters.textures_created += 1;
        Ok(id)
    }

    fn create_texture_view(&self, texture: TextureId) -> Result<TextureViewId, ResourceError> {
        let id = TextureViewId(self.next());
        let mut state = self.state();
        if !state.textures.contains(&texture) {
            return Err(ResourceError::NotFound);
        }
        state.views.insert(id);
        Ok(id)
    }

    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError> {
        self.state()
            .views
            .remove(&id)
            .then_some(())
            .ok_or(ResourceError::NotFound)
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        self.state()
            .textures
            .remove(&id)
            .then_some(())
            .ok_or(ResourceError::NotFound)
    }

    fn create_sampler(&self, _descriptor: &SamplerDescriptor) -> Result<SamplerId, ResourceError> {
        let id = SamplerId(self.next());
        let mut state = self.state();
        state.samplers.insert(id);
        state.counters.samplers_created += 1;
        Ok(id)
    }

    fn destroy_sampler(&self, id: SamplerId) -> Result<(), ResourceError> {
        self.state()
            .samplers
            .remove(&id)
            .then_some(())
            .ok_or(ResourceError::NotFound)
    }

    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError> {
        if descriptor.source.text().trim().is_empty() {
            return Err(ShaderError::EmptySource {
                label: descriptor.label.as_deref().map(str::to_owned),
            }
            .into());
        }
        let id = ShaderModuleId(self.next());
        let mut state = self.state();
        state.shader_modules.insert(id);
        state.counters.shader_modules_created += 1;
        Ok(id)
    }

    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError> {
        self.state()
            .shader_modules
            .remove(&id)
            .then_some(())
            .ok_or(ResourceError::NotFound)
    }

    fn create_render_pass(
        &self,
        descriptor: &RenderPassDescriptor,
    ) -> Result<RenderPassId, ResourceError> {
        let id = RenderPassId(self.next());
        let mut state = self.state();
        state.render_passes.insert(id, descriptor.clone());
        state.counters.render_passes_created += 1;
        Ok(id)
    }

    fn destroy_render_pass(&self, id: RenderPassId) -> Result<(), ResourceError> {
        self.state()
            .render_passes
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_pipeline_layout(
        &self,
        _descriptor: &PipelineLayoutDescriptor,
    ) -> Result<PipelineLayoutId, ResourceError> {
        let id = PipelineLayoutId(self.next());
        let mut state = self.state();
        state.pipeline_layouts.insert(id);
        state.counters.pipeline_layouts_created += 1;
        Ok(id)
    }

    fn destroy_pipeline_layout(&self, id: PipelineLayoutId) -> Result<(), ResourceError> {
        self.state()
            .pipeline_layouts
            .remove(&id)
            .then_some(())
            .ok_or(ResourceError::NotFound)
    }

    fn create_render_pipeline(
        &self,
        descriptor: &GraphicsPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        let mut state = self.state();
        if state.script.fail_pipelines {
            return Err(PipelineError::CompilationFailed {
                label: descriptor.label.as_ref().map(|l| l.to_string()),
                details: "scripted compilation failure".to_string(),
            }
            .into());
        }
        if !state.render_passes.contains_key(&descriptor.render_pass) {
            return Err(PipelineError::InvalidRenderPass {
                id: descriptor.render_pass,
            }
            .into());
        }
        if !state.pipeline_layouts.contains(&descriptor.layout) {
            return Err(PipelineError::InvalidLayout {
                id: descriptor.layout,
            }
            .into());
        }
        let id = RenderPipelineId(self.next());
        state.pipelines.insert(id, descriptor.clone());
        state.counters.pipelines_created += 1;
        Ok(id)
    }

    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError> {
        self.state()
            .pipelines
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_descriptor_pool(
        &self,
        descriptor: &DescriptorPoolDescriptor,
    ) -> Result<DescriptorPoolId, ResourceError> {
        let id = DescriptorPoolId(self.next());
        self.state().descriptor_pools.insert(
            id,
            PoolState {
                descriptor: descriptor.clone(),
                sets: HashMap::new(),
            },
        );
        Ok(id)
    }

    fn destroy_descriptor_pool(&self, id: DescriptorPoolId) -> Result<(), ResourceError> {
        self.state()
            .descriptor_pools
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_descriptor_set_layout(
        &self,
        _descriptor: &DescriptorSetLayoutDescriptor,
    ) -> Result<DescriptorSetLayoutId, ResourceError> {
        let id = DescriptorSetLayoutId(self.next());
        let mut state = self.state();
        state.set_layouts.insert(id);
        state.counters.set_layouts_created += 1;
        Ok(id)
    }

    fn destroy_descriptor_set_layout(
        &self,
        id: DescriptorSetLayoutId,
    ) -> Result<(), ResourceError> {
        self.state()
            .set_layouts
            .remove(&id)
            .then_some(())
            .ok_or(ResourceError::NotFound)
    }

    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolId,
        layout: DescriptorSetLayoutId,
        bindings: &[DescriptorBinding],
    ) -> Result<DescriptorSetId, ResourceError> {
        let id = DescriptorSetId(self.next());
        let mut state = self.state();
        if !state.set_layouts.contains(&layout) {
            return Err(ResourceError::InvalidHandle);
        }
        let pool_state = state
            .descriptor_pools
            .get_mut(&pool)
            .ok_or(ResourceError::NotFound)?;
        if pool_state.sets.len() as u32 >= pool_state.descriptor.max_sets {
            return Err(ResourceError::Exhausted(format!(
                "descriptor pool {pool:?} has no free sets"
            )));
        }
        let types: Vec<DescriptorType> = bindings
            .iter()
            .map(|b| b.resource.descriptor_type())
            .collect();
        for ty in &types {
            let requested = types.iter().filter(|t| *t == ty).count() as u32;
            if pool_state.used(*ty) + requested > pool_state.descriptor.capacity_of(*ty) {
                return Err(ResourceError::Exhausted(format!(
                    "descriptor pool {pool:?} has no free {ty:?} descriptors"
                )));
            }
        }
        pool_state.sets.insert(id, types);
        state.counters.descriptor_sets_allocated += 1;
        Ok(id)
    }

    fn free_descriptor_set(
        &self,
        pool: DescriptorPoolId,
        set: DescriptorSetId,
    ) -> Result<(), ResourceError> {
        self.state()
            .descriptor_pools
            .get_mut(&pool)
            .and_then(|p| p.sets.remove(&set))
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_command_pool(
        &self,
        _descriptor: &CommandPoolDescriptor,
    ) -> Result<CommandPoolId, ResourceError> {
        let id = CommandPoolId(self.next());
        self.state().command_pools.insert(id, Vec::new());
        Ok(id)
    }

    fn allocate_command_buffer(
        &self,
        pool: CommandPoolId,
    ) -> Result<CommandBufferId, ResourceError> {
        let id = CommandBufferId(self.next() as u64);
        let mut state = self.state();
        state
            .command_pools
            .get_mut(&pool)
            .ok_or(ResourceError::NotFound)?
            .push(id);
        state.counters.command_buffers_allocated += 1;
        Ok(id)
    }

    fn reset_command_pool(&self, pool: CommandPoolId) -> Result<(), ResourceError> {
        let mut state = self.state();
        let buffers = state
            .command_pools
            .get(&pool)
            .cloned()
            .ok_or(ResourceError::NotFound)?;
        for buffer in buffers {
            state.finished.remove(&buffer);
        }
        Ok(())
    }

    fn destroy_command_pool(&self, pool: CommandPoolId) -> Result<(), ResourceError> {
        let mut state = self.state();
        let buffers = state
            .command_pools
            .remove(&pool)
            .ok_or(ResourceError::NotFound)?;
        for buffer in buffers {
            state.finished.remove(&buffer);
        }
        Ok(())
    }

    fn begin_command_buffer(
        &self,
        command_buffer: CommandBufferId,
        _usage: CommandBufferUsage,
    ) -> Result<Box<dyn CommandRecorder>, RenderError> {
        let mut state = self.state();
        let known = state
            .command_pools
            .values()
            .any(|buffers| buffers.contains(&command_buffer));
        if !known {
            return Err(RenderError::ResourceError(ResourceError::NotFound));
        }
        state.finished.remove(&command_buffer);
        Ok(Box::new(RecordingRecorder {
            command_buffer,
            commands: Vec::new(),
            pass_open: false,
            state: Arc::clone(&self.state),
        }))
    }

    fn submit(&self, info: &SubmitInfo) -> Result<SubmissionId, RenderError> {
        let mut state = self.state();
        if state.script.submit_failures > 0 {
            state.script.submit_failures -= 1;
            return Err(RenderError::RenderingFailed("scripted submit failure".to_string()));
        }
        let commands = state
            .finished
            .get(&info.command_buffer)
            .cloned()
            .ok_or_else(|| {
                RenderError::RenderingFailed(format!(
                    "command buffer {:?} was not finished",
                    info.command_buffer
                ))
            })?;
        state.submitted.push(commands);
        state.counters.submissions += 1;
        Ok(SubmissionId(state.counters.submissions as u64))
    }

    fn wait_for_submission(&self, submission: SubmissionId) -> Result<(), RenderError> {
        if submission.0 as usize > self.state().counters.submissions {
            return Err(RenderError::Internal(format!(
                "unknown submission {submission:?}"
            )));
        }
        Ok(())
    }

    fn wait_idle(&self) -> Result<(), RenderError> {
        Ok(())
    }

    fn create_swap_chain(
        &self,
        descriptor: &SwapChainDescriptor,
    ) -> Result<(SwapChainId, SwapChainInfo), RenderError> {
        let info = self.swap_chain_info(descriptor);
        let id = SwapChainId(self.next());
        let images = self.swap_chain_images(info.image_count);
        let mut state = self.state();
        state.swap_chains.insert(
            id,
            SwapChainState {
                descriptor: *descriptor,
                images,
                next_image: 0,
                held: None,
            },
        );
        state.counters.swap_chains_created += 1;
        Ok((id, info))
    }

    fn recreate_swap_chain(
        &self,
        id: SwapChainId,
        descriptor: &SwapChainDescriptor,
    ) -> Result<SwapChainInfo, RenderError> {
        let info = self.swap_chain_info(descriptor);
        let images = self.swap_chain_images(info.image_count);
        let mut state = self.state();
        if state.script.recreate_failures > 0 {
            state.script.recreate_failures -= 1;
            return Err(RenderError::Surface(SurfaceError::Lost));
        }
        let chain = state
            .swap_chains
            .get_mut(&id)
            .ok_or(RenderError::ResourceError(ResourceError::NotFound))?;
        chain.descriptor = *descriptor;
        chain.images = images;
        chain.next_image = 0;
        chain.held = None;
        state.counters.swap_chains_recreated += 1;
        Ok(info)
    }

    fn acquire_next_image(&self, id: SwapChainId) -> Result<AcquiredImage, SurfaceError> {
        let mut state = self.state();
        if let Some(error) = state.script.acquire_failures.pop_front() {
            return Err(error);
        }
        let suboptimal = state.script.suboptimal_acquires > 0;
        if suboptimal {
            state.script.suboptimal_acquires -= 1;
        }
        let chain = state
            .swap_chains
            .get_mut(&id)
            .ok_or_else(|| SurfaceError::Other(format!("unknown swap chain {id:?}")))?;
        if let Some(held) = chain.held {
            return Err(SurfaceError::Other(format!(
                "image {held} is still acquired"
            )));
        }
        let index = chain.next_image % chain.descriptor.image_count.max(1);
        chain.next_image = chain.next_image.wrapping_add(1);
        chain.held = Some(index);
        let view = chain.images[index as usize % chain.images.len()];
        state.counters.acquisitions += 1;
        Ok(AcquiredImage {
            index,
            view,
            suboptimal,
        })
    }

    fn present(&self, id: SwapChainId, image_index: u32) -> Result<PresentStatus, SurfaceError> {
        let mut state = self.state();
        take_held(&mut state, id, image_index)?;
        // A presentation consumes the image even when it fails.
        if let Some(error) = state.script.present_failures.pop_front() {
            return Err(error);
        }
        state.counters.presents += 1;
        Ok(PresentStatus::Optimal)
    }

    fn release_image(&self, id: SwapChainId, image_index: u32) -> Result<(), SurfaceError> {
        let mut state = self.state();
        take_held(&mut state, id, image_index)?;
        state.counters.releases += 1;
        Ok(())
    }

    fn destroy_swap_chain(&self, id: SwapChainId) -> Result<(), RenderError> {
        self.state()
            .swap_chains
            .remove(&id)
            .map(|_| ())
            .ok_or(RenderError::ResourceError(ResourceError::NotFound))
    }
}

fn take_held(state: &mut State, id: SwapChainId, image_index: u32) -> Result<(), SurfaceError> {
    let chain = state
        .swap_chains
        .get_mut(&id)
        .ok_or_else(|| SurfaceError::Other(format!("unknown swap chain {id:?}")))?;
    if chain.held != Some(image_index) {
        return Err(SurfaceError::Other(format!(
            "image {image_index} is not acquired"
        )));
    }
    chain.held = None;
    Ok(())
}

struct RecordingRecorder {
    command_buffer: CommandBufferId,
    commands: Vec<RecordedCommand>,
    pass_open: bool,
    state: Arc<Mutex<State>>,
}

impl CommandRecorder for RecordingRecorder {
    fn command_buffer(&self) -> CommandBufferId {
        self.command_buffer
    }

    fn begin_render_pass(&mut self, info: &RenderPassBeginInfo) -> Result<(), RenderError> {
        if self.pass_open {
            return Err(RenderError::RenderingFailed(
                "a render pass is already open".to_string(),
            ));
        }
        let known = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .render_passes
            .contains_key(&info.render_pass);
        if !known {
            return Err(RenderError::ResourceError(ResourceError::NotFound));
        }
        self.pass_open = true;
        self.commands.push(RecordedCommand::BeginRenderPass {
            render_pass: info.render_pass,
            color_view: info.color_view,
            clear: info.clear,
        });
        Ok(())
    }

    fn set_pipeline(&mut self, pipeline: RenderPipelineId) {
        self.commands.push(RecordedCommand::SetPipeline(pipeline));
    }

    fn set_descriptor_set(&mut self, index: u32, set: DescriptorSetId) {
        self.commands
            .push(RecordedCommand::SetDescriptorSet { index, set });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, _offset: u64) {
        self.commands
            .push(RecordedCommand::SetVertexBuffer { slot, buffer });
    }

    fn set_index_buffer(&mut self, buffer: BufferId, _offset: u64, format: IndexFormat) {
        self.commands
            .push(RecordedCommand::SetIndexBuffer { buffer, format });
    }

    fn push_constants(&mut self, stages: ShaderStageFlags, offset: u32, data: &[u8]) {
        self.commands.push(RecordedCommand::PushConstants {
            stages,
            offset,
            data: data.to_vec(),
        });
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.commands
            .push(RecordedCommand::Draw { vertices, instances });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, _base_vertex: i32, instances: Range<u32>) {
        self.commands
            .push(RecordedCommand::DrawIndexed { indices, instances });
    }

    fn end_render_pass(&mut self) {
        if self.pass_open {
            self.pass_open = false;
            self.commands.push(RecordedCommand::EndRenderPass);
        }
    }

    fn finish(mut self: Box<Self>) -> Result<CommandBufferId, RenderError> {
        self.end_render_pass();
        let commands = std::mem::take(&mut self.commands);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.script.finish_failures > 0 {
            state.script.finish_failures -= 1;
            return Err(RenderError::RenderingFailed("scripted finish failure".to_string()));
        }
        state.finished.insert(self.command_buffer, commands);
        Ok(self.command_buffer)
    }
}

/// A [`DeviceSelector`] that hands out a shared [`RecordingDevice`], or fails.
#[derive(Debug, Clone)]
pub struct RecordingSelector {
    device: Option<Arc<RecordingDevice>>,
}

impl RecordingSelector {
    /// A selector that always returns `device`.
    pub fn new(device: Arc<RecordingDevice>) -> Self {
        Self {
            device: Some(device),
        }
    }

    /// A selector that never finds a suitable device.
    pub fn failing() -> Self {
        Self { device: None }
    }
}

#[async_trait]
impl DeviceSelector for RecordingSelector {
    async fn select_device(
        &self,
        request: &DeviceRequest,
    ) -> Result<Arc<dyn GraphicsDevice>, RenderError> {
        match &self.device {
            Some(device) => {
                log::debug!(
                    "RecordingSelector: serving '{}'",
                    request.label.as_deref().unwrap_or("unnamed")
                );
                Ok(device.clone() as Arc<dyn GraphicsDevice>)
            }
            None => Err(RenderError::NoSuitableDevice(
                "no adapter satisfies the request".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(device: &RecordingDevice, max_sets: u32, uniforms: u32) -> DescriptorPoolId {
        device
            .create_descriptor_pool(&DescriptorPoolDescriptor {
                label: None,
                max_sets,
                sizes: vec![DescriptorPoolSize {
                    ty: DescriptorType::UniformBuffer,
                    count: uniforms,
                }],
            })
            .unwrap()
    }

    #[test]
    fn test_descriptor_pool_runs_out() {
        let device = RecordingDevice::new();
        let pool = pool(&device, 1, 4);
        let layout = device
            .create_descriptor_set_layout(&DescriptorSetLayoutDescriptor {
                label: None,
                entries: vec![],
            })
            .unwrap();
        let set = device.allocate_descriptor_set(pool, layout, &[]).unwrap();
        assert!(matches!(
            device.allocate_descriptor_set(pool, layout, &[]),
            Err(ResourceError::Exhausted(_))
        ));
        device.free_descriptor_set(pool, set).unwrap();
        assert!(device.allocate_descriptor_set(pool, layout, &[]).is_ok());
    }

    #[test]
    fn test_recorder_commands_reach_submission() {
        let device = RecordingDevice::new();
        let cmd_pool = device
            .create_command_pool(&CommandPoolDescriptor {
                label: None,
                transient: true,
                resettable: true,
            })
            .unwrap();
        let cb = device.allocate_command_buffer(cmd_pool).unwrap();
        let mut recorder = device
            .begin_command_buffer(cb, CommandBufferUsage::OneTimeSubmit)
            .unwrap();
        recorder.draw(0..3, 0..2);
        let cb = recorder.finish().unwrap();
        device
            .submit(&SubmitInfo {
                command_buffer: cb,
                wait_image: None,
            })
            .unwrap();
        let submitted = device.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0][0].instance_count(), Some(2));
    }

    #[test]
    fn test_scripted_acquire_failure_is_returned_once() {
        let device = RecordingDevice::new();
        let (id, _) = device
            .create_swap_chain(&SwapChainDescriptor {
                extent: Extent2D::new(8, 8),
                image_count: 2,
                present_mode: PresentMode::Fifo,
            })
            .unwrap();
        device.fail_next_acquire(SurfaceError::OutOfDate);
        assert_eq!(device.acquire_next_image(id), Err(SurfaceError::OutOfDate));
        for expected in [0, 1, 0] {
            let image = device.acquire_next_image(id).unwrap();
            assert_eq!(image.index, expected);
            device.present(id, image.index).unwrap();
        }
    }

    #[test]
    fn test_empty_shader_source_is_rejected() {
        let device = RecordingDevice::new();
        let result = device.create_shader_module(&ShaderModuleDescriptor {
            label: Some("blank".into()),
            source: ShaderSource::Wgsl("  \n".into()),
        });
        assert!(matches!(
            result,
            Err(ResourceError::Shader(ShaderError::EmptySource { .. }))
        ));
        assert_eq!(device.counters().shader_modules_created, 0);
    }

    #[test]
    fn test_unreleased_image_blocks_the_next_acquire() {
        let device = RecordingDevice::new();
        let (id, _) = device
            .create_swap_chain(&SwapChainDescriptor {
                extent: Extent2D::new(8, 8),
                image_count: 2,
                present_mode: PresentMode::Fifo,
            })
            .unwrap();
        let image = device.acquire_next_image(id).unwrap();
        assert_eq!(device.held_image(id), Some(image.index));
        assert!(matches!(
            device.acquire_next_image(id),
            Err(SurfaceError::Other(_))
        ));

        device.release_image(id, image.index).unwrap();
        assert_eq!(device.held_image(id), None);
        assert_eq!(device.counters().releases, 1);
        assert!(device.release_image(id, image.index).is_err());
        assert_eq!(device.acquire_next_image(id).unwrap().index, 1);
    }
}

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

use crate::renderer::api::{
    AcquiredImage, AdapterInfo, BufferDescriptor, BufferId, CommandBufferId, CommandBufferUsage,
    CommandPoolDescriptor, CommandPoolId, DescriptorBinding, DescriptorPoolDescriptor,
    DescriptorPoolId, DescriptorSetId, DescriptorSetLayoutDescriptor, DescriptorSetLayoutId,
    GraphicsPipelineDescriptor, PipelineLayoutDescriptor, PipelineLayoutId, PresentStatus,
    RenderPassDescriptor, RenderPassId, RenderPipelineId, SamplerDescriptor, SamplerId,
    ShaderModuleDescriptor, ShaderModuleId, SubmissionId, SubmitInfo, SwapChainDescriptor,
    SwapChainId, SwapChainInfo, TextureDescriptor, TextureId, TextureViewId,
};
use crate::renderer::error::{RenderError, ResourceError, SurfaceError};
use crate::renderer::traits::CommandRecorder;
use std::fmt::Debug;

/// A logical GPU connection.
///
/// This trait is the central abstraction over a concrete graphics API. Every
/// object it creates is returned as a lightweight ID; the implementation owns
/// the real objects and releases them on the matching `destroy_*` call.
///
/// Implementations must be thread-safe: the render thread records and submits
/// while other threads may upload instance data through
/// [`GraphicsDevice::write_buffer`].
pub trait GraphicsDevice: Send + Sync + Debug + 'static {
    /// Information about the adapter backing this device.
    fn adapter_info(&self) -> AdapterInfo;

    // --- Buffers ---

    /// Creates a GPU buffer.
    ///
    /// ## Arguments
    /// * `descriptor` - Size and usage of the buffer.
    ///
    /// ## Returns
    /// The ID of the new buffer.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError>;

    /// Copies `data` into a buffer at byte `offset`.
    ///
    /// ## Errors
    /// [`ResourceError::OutOfBounds`] if the write does not fit, and
    /// [`ResourceError::NotFound`] for an unknown buffer.
    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError>;

    /// Destroys a buffer.
    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError>;

    // --- Textures and samplers ---

    /// Creates a 2D texture.
    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError>;

    /// Creates a default view covering the whole texture.
    fn create_texture_view(&self, texture: TextureId) -> Result<TextureViewId, ResourceError>;

    /// Destroys a texture view.
    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError>;

    /// Destroys a texture.
    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError>;

    /// Creates a sampler.
    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<SamplerId, ResourceError>;

    /// Destroys a sampler.
    fn destroy_sampler(&self, id: SamplerId) -> Result<(), ResourceError>;

    // --- Shaders and pipelines ---

    /// Compiles a shader module.
    ///
    /// ## Errors
    /// [`ShaderError::EmptySource`](crate::renderer::ShaderError::EmptySource)
    /// when the source holds no code.
    fn create_shader_module(
        &self,
        descriptor: &ShaderModuleDescriptor,
    ) -> Result<ShaderModuleId, ResourceError>;

    /// Destroys a shader module.
    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError>;

    /// Creates a render pass.
    fn create_render_pass(
        &self,
        descriptor: &RenderPassDescriptor,
    ) -> Result<RenderPassId, ResourceError>;

    /// Destroys a render pass.
    fn destroy_render_pass(&self, id: RenderPassId) -> Result<(), ResourceError>;

    /// Creates a pipeline layout.
    fn create_pipeline_layout(
        &self,
        descriptor: &PipelineLayoutDescriptor,
    ) -> Result<PipelineLayoutId, ResourceError>;

    /// Destroys a pipeline layout.
    fn destroy_pipeline_layout(&self, id: PipelineLayoutId) -> Result<(), ResourceError>;

    /// Compiles a graphics pipeline.
    ///
    /// ## Errors
    /// [`ResourceError::Pipeline`] when the render pass or layout is unknown,
    /// or when the backend rejects the state.
    fn create_render_pipeline(
        &self,
        descriptor: &GraphicsPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError>;

    /// Destroys a graphics pipeline.
    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError>;

    // --- Descriptors ---

    /// Creates a fixed-size descriptor pool.
    fn create_descriptor_pool(
        &self,
        descriptor: &DescriptorPoolDescriptor,
    ) -> Result<DescriptorPoolId, ResourceError>;

    /// Destroys a descriptor pool and every set allocated from it.
    fn destroy_descriptor_pool(&self, id: DescriptorPoolId) -> Result<(), ResourceError>;

    /// Creates a descriptor set layout.
    fn create_descriptor_set_layout(
        &self,
        descriptor: &DescriptorSetLayoutDescriptor,
    ) -> Result<DescriptorSetLayoutId, ResourceError>;

    /// Destroys a descriptor set layout.
    fn destroy_descriptor_set_layout(&self, id: DescriptorSetLayoutId)
        -> Result<(), ResourceError>;

    /// Allocates a set from `pool` and writes `bindings` into it.
    ///
    /// ## Errors
    /// [`ResourceError::Exhausted`] when the pool has no room left.
    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolId,
        layout: DescriptorSetLayoutId,
        bindings: &[DescriptorBinding],
    ) -> Result<DescriptorSetId, ResourceError>;

    /// Returns a set to its pool.
    fn free_descriptor_set(
        &self,
        pool: DescriptorPoolId,
        set: DescriptorSetId,
    ) -> Result<(), ResourceError>;

    // --- Commands ---

    /// Creates a command pool.
    fn create_command_pool(
        &self,
        descriptor: &CommandPoolDescriptor,
    ) -> Result<CommandPoolId, ResourceError>;

    /// Allocates one command buffer from `pool`.
    fn allocate_command_buffer(&self, pool: CommandPoolId)
        -> Result<CommandBufferId, ResourceError>;

    /// Resets every buffer allocated from `pool`.
    fn reset_command_pool(&self, pool: CommandPoolId) -> Result<(), ResourceError>;

    /// Destroys a command pool and the buffers allocated from it.
    fn destroy_command_pool(&self, pool: CommandPoolId) -> Result<(), ResourceError>;

    /// Starts recording into `command_buffer`, discarding previous contents.
    fn begin_command_buffer(
        &self,
        command_buffer: CommandBufferId,
        usage: CommandBufferUsage,
    ) -> Result<Box<dyn CommandRecorder>, RenderError>;

    /// Submits a finished command buffer to the queue.
    fn submit(&self, info: &SubmitInfo) -> Result<SubmissionId, RenderError>;

    /// Blocks until the given submission has completed on the GPU.
    fn wait_for_submission(&self, submission: SubmissionId) -> Result<(), RenderError>;

    /// Blocks until the device is idle.
    fn wait_idle(&self) -> Result<(), RenderError>;

    // --- Swap chain ---

    /// Creates the swap chain for the device's presentation surface.
    fn create_swap_chain(
        &self,
        descriptor: &SwapChainDescriptor,
    ) -> Result<(SwapChainId, SwapChainInfo), RenderError>;

    /// Rebuilds an existing swap chain, e.g. after a resize.
    fn recreate_swap_chain(
        &self,
        id: SwapChainId,
        descriptor: &SwapChainDescriptor,
    ) -> Result<SwapChainInfo, RenderError>;

    /// Acquires the next presentable image.
    ///
    /// May block until a frame-in-flight slot is free.
    fn acquire_next_image(&self, id: SwapChainId) -> Result<AcquiredImage, SurfaceError>;

    /// Presents a previously acquired image.
    fn present(&self, id: SwapChainId, image_index: u32) -> Result<PresentStatus, SurfaceError>;

    /// Gives back an acquired image without presenting it, e.g. when the
    /// frame drawn into it was dropped.
    ///
    /// Until its image is presented or released, a swap chain may refuse to
    /// hand out the next one.
    fn release_image(&self, id: SwapChainId, image_index: u32) -> Result<(), SurfaceError>;

    /// Destroys a swap chain.
    fn destroy_swap_chain(&self, id: SwapChainId) -> Result<(), RenderError>;
}

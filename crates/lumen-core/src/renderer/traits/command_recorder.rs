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
    BufferId, CommandBufferId, DescriptorSetId, IndexFormat, RenderPassBeginInfo,
    RenderPipelineId, ShaderStageFlags,
};
use crate::renderer::error::RenderError;
use std::ops::Range;

/// Records GPU commands into one command buffer.
///
/// A recorder is obtained from [`GraphicsDevice::begin_command_buffer`] and
/// consumed by [`CommandRecorder::finish`]. At most one render pass is open at
/// a time; state-setting and draw commands are only valid inside a pass.
///
/// The interface is deliberately flat (no pass object borrowing the
/// recorder) so that a recorder can be handed through `&mut dyn
/// CommandRecorder` to scenes, overlays and instances.
///
/// [`GraphicsDevice::begin_command_buffer`]: super::GraphicsDevice::begin_command_buffer
pub trait CommandRecorder {
    /// The command buffer being recorded.
    fn command_buffer(&self) -> CommandBufferId;

    /// Begins a render pass.
    ///
    /// ## Errors
    /// Fails if a pass is already open or if the pass or its views are unknown.
    fn begin_render_pass(&mut self, info: &RenderPassBeginInfo) -> Result<(), RenderError>;

    /// Binds a graphics pipeline for subsequent draws.
    fn set_pipeline(&mut self, pipeline: RenderPipelineId);

    /// Binds a descriptor set at set index `index`.
    fn set_descriptor_set(&mut self, index: u32, set: DescriptorSetId);

    /// Binds a vertex buffer to `slot`.
    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, offset: u64);

    /// Binds an index buffer.
    fn set_index_buffer(&mut self, buffer: BufferId, offset: u64, format: IndexFormat);

    /// Writes `data` into the push constant block at byte `offset`.
    fn push_constants(&mut self, stages: ShaderStageFlags, offset: u32, data: &[u8]);

    /// Records a non-indexed draw.
    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);

    /// Records an indexed draw.
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);

    /// Ends the open render pass. Does nothing if no pass is open.
    fn end_render_pass(&mut self);

    /// Finishes recording, making the command buffer ready for submission.
    fn finish(self: Box<Self>) -> Result<CommandBufferId, RenderError>;
}

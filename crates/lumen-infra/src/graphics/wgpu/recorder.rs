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

use std::ops::Range;

use lumen_core::renderer::api::{
    BufferId, CommandBufferId, DescriptorSetId, IndexFormat, LoadOp, RenderPassBeginInfo,
    RenderPipelineId, ShaderStageFlags,
};
use lumen_core::renderer::{CommandRecorder, RenderError, ResourceError};

use super::conversions::{self, IntoWgpu};
use super::device::WgpuDevice;

/// Records into a `wgpu::CommandEncoder` behind the flat [`CommandRecorder`] interface.
///
/// The open pass has its encoder borrow erased with
/// `RenderPass::forget_lifetime`, so pass and encoder can live side by side.
/// Commands issued outside a pass, or naming unknown objects, are skipped and
/// the first such misuse is returned by [`CommandRecorder::finish`].
pub struct WgpuCommandRecorder {
    device: WgpuDevice,
    command_buffer: CommandBufferId,
    encoder: wgpu::CommandEncoder,
    pass: Option<wgpu::RenderPass<'static>>,
    error: Option<RenderError>,
}

impl WgpuCommandRecorder {
    pub(crate) fn new(
        device: WgpuDevice,
        command_buffer: CommandBufferId,
        encoder: wgpu::CommandEncoder,
    ) -> Self {
        Self {
            device,
            command_buffer,
            encoder,
            pass: None,
            error: None,
        }
    }

    fn fail(&mut self, message: String) {
        log::warn!("WgpuCommandRecorder: {message}");
        if self.error.is_none() {
            self.error = Some(RenderError::RenderingFailed(message));
        }
    }

    /// The open pass, or records a misuse for `command`.
    fn pass(&mut self, command: &str) -> Option<&mut wgpu::RenderPass<'static>> {
        if self.pass.is_none() {
            self.fail(format!("{command} recorded outside of a render pass"));
        }
        self.pass.as_mut()
    }
}

impl CommandRecorder for WgpuCommandRecorder {
    fn command_buffer(&self) -> CommandBufferId {
        self.command_buffer
    }

    fn begin_render_pass(&mut self, info: &RenderPassBeginInfo) -> Result<(), RenderError> {
        if self.pass.is_some() {
            return Err(RenderError::RenderingFailed(
                "a render pass is already open".to_string(),
            ));
        }
        let descriptor = self
            .device
            .render_pass_descriptor(info.render_pass)
            .ok_or(ResourceError::NotFound)?;

        // --- 1. Resolve attachment views ---
        let color = match descriptor.color {
            Some(attachment) => {
                let view = info
                    .color_view
                    .and_then(|id| self.device.get_wgpu_texture_view(id))
                    .ok_or(ResourceError::NotFound)?;
                Some((attachment, view))
            }
            None => None,
        };
        let depth = match descriptor.depth_stencil {
            Some(attachment) => {
                let view = info
                    .depth_view
                    .and_then(|id| self.device.get_wgpu_texture_view(id))
                    .ok_or(ResourceError::NotFound)?;
                Some((attachment, view))
            }
            None => None,
        };

        // --- 2. Translate load/store policies ---
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = color
            .iter()
            .map(|(attachment, view)| {
                Some(wgpu::RenderPassColorAttachment {
                    view: view.as_ref(),
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: match attachment.ops.load {
                            LoadOp::Clear => {
                                wgpu::LoadOp::Clear(conversions::clear_color(info.clear.color))
                            }
                            LoadOp::Load => wgpu::LoadOp::Load,
                        },
                        store: attachment.ops.store.into_wgpu(),
                    },
                })
            })
            .collect();
        let depth_stencil_attachment =
            depth
                .as_ref()
                .map(|(attachment, view)| wgpu::RenderPassDepthStencilAttachment {
                    view: view.as_ref(),
                    depth_ops: Some(wgpu::Operations {
                        load: match attachment.ops.load {
                            LoadOp::Clear => wgpu::LoadOp::Clear(info.clear.depth),
                            LoadOp::Load => wgpu::LoadOp::Load,
                        },
                        store: attachment.ops.store.into_wgpu(),
                    }),
                    stencil_ops: attachment.format.has_stencil().then(|| wgpu::Operations {
                        load: match attachment.ops.load {
                            LoadOp::Clear => wgpu::LoadOp::Clear(info.clear.stencil),
                            LoadOp::Load => wgpu::LoadOp::Load,
                        },
                        store: attachment.ops.store.into_wgpu(),
                    }),
                });

        // --- 3. Open the pass ---
        let mut pass = self
            .encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: descriptor.label.as_deref(),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            })
            .forget_lifetime();
        pass.set_viewport(
            0.0,
            0.0,
            info.extent.width as f32,
            info.extent.height as f32,
            0.0,
            1.0,
        );
        self.pass = Some(pass);
        Ok(())
    }

    fn set_pipeline(&mut self, pipeline: RenderPipelineId) {
        let Some(wgpu_pipeline) = self.device.get_wgpu_render_pipeline(pipeline) else {
            self.fail(format!("RenderPipelineId {pipeline:?} not found"));
            return;
        };
        if let Some(pass) = self.pass("set_pipeline") {
            pass.set_pipeline(&wgpu_pipeline);
        }
    }

    fn set_descriptor_set(&mut self, index: u32, set: DescriptorSetId) {
        let Some(bind_group) = self.device.get_wgpu_bind_group(set) else {
            self.fail(format!("DescriptorSetId {set:?} not found"));
            return;
        };
        if let Some(pass) = self.pass("set_descriptor_set") {
            pass.set_bind_group(index, bind_group.as_ref(), &[]);
        }
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferId, offset: u64) {
        let Some(wgpu_buffer) = self.device.get_wgpu_buffer(buffer) else {
            self.fail(format!("Vertex BufferId {buffer:?} not found"));
            return;
        };
        if let Some(pass) = self.pass("set_vertex_buffer") {
            pass.set_vertex_buffer(slot, wgpu_buffer.slice(offset..));
        }
    }

    fn set_index_buffer(&mut self, buffer: BufferId, offset: u64, format: IndexFormat) {
        let Some(wgpu_buffer) = self.device.get_wgpu_buffer(buffer) else {
            self.fail(format!("Index BufferId {buffer:?} not found"));
            return;
        };
        if let Some(pass) = self.pass("set_index_buffer") {
            pass.set_index_buffer(wgpu_buffer.slice(offset..), format.into_wgpu());
        }
    }

    fn push_constants(&mut self, stages: ShaderStageFlags, offset: u32, data: &[u8]) {
        if let Some(pass) = self.pass("push_constants") {
            pass.set_push_constants(stages.into_wgpu(), offset, data);
        }
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        if let Some(pass) = self.pass("draw") {
            pass.draw(vertices, instances);
        }
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        if let Some(pass) = self.pass("draw_indexed") {
            pass.draw_indexed(indices, base_vertex, instances);
        }
    }

    fn end_render_pass(&mut self) {
        self.pass = None;
    }

    fn finish(self: Box<Self>) -> Result<CommandBufferId, RenderError> {
        let WgpuCommandRecorder {
            device,
            command_buffer,
            encoder,
            pass,
            error,
        } = *self;
        // The pass must end before the encoder can finish.
        drop(pass);
        if let Some(error) = error {
            return Err(error);
        }
        device.register_command_buffer(command_buffer, encoder.finish());
        Ok(command_buffer)
    }
}

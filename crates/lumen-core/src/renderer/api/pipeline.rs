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

//! Pipeline layouts, vertex input layouts and graphics pipeline state.

use super::descriptor::DescriptorSetLayoutId;
use super::pass::RenderPassId;
use super::shader::{ShaderModuleId, ShaderStageFlags};
use super::texture::{CompareFunction, TextureFormat};
use std::borrow::Cow;
use std::ops::Range;

/// An opaque handle to a pipeline layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineLayoutId(pub usize);

/// An opaque handle to a compiled graphics pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderPipelineId(pub usize);

/// A byte range of the push constant block visible to some stages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    /// Stages that read the range.
    pub stages: ShaderStageFlags,
    /// Byte range inside the block.
    pub range: Range<u32>,
}

/// Describes a pipeline layout: descriptor set layouts in set order plus push constants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineLayoutDescriptor {
    /// Debug label.
    pub label: Option<Cow<'static, str>>,
    /// Set layouts, index `i` describes set `i`.
    pub set_layouts: Vec<DescriptorSetLayoutId>,
    /// Push constant ranges.
    pub push_constant_ranges: Vec<PushConstantRange>,
}

/// Format of one vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    /// Two `f32`.
    Float32x2,
    /// Three `f32`.
    Float32x3,
    /// Four `f32`.
    Float32x4,
}

impl VertexFormat {
    /// Size in bytes.
    pub const fn size(&self) -> u64 {
        match self {
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

/// Whether a vertex buffer advances per vertex or per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexStepMode {
    /// Advance once per vertex.
    Vertex,
    /// Advance once per instance.
    Instance,
}

/// One attribute inside a vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Attribute format.
    pub format: VertexFormat,
    /// Byte offset inside one element.
    pub offset: u64,
    /// Shader location.
    pub shader_location: u32,
}

/// Layout of one bound vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    /// Bytes between consecutive elements.
    pub array_stride: u64,
    /// Step mode.
    pub step_mode: VertexStepMode,
    /// Attributes read from each element.
    pub attributes: Vec<VertexAttribute>,
}

/// Primitive assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Independent points.
    PointList,
    /// Independent lines.
    LineList,
    /// Independent triangles.
    #[default]
    TriangleList,
    /// Triangle strip.
    TriangleStrip,
}

/// Face culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// Draw both faces.
    None,
    /// Cull front faces.
    Front,
    /// Cull back faces.
    #[default]
    Back,
}

/// Winding of front faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    /// Counter-clockwise.
    #[default]
    Ccw,
    /// Clockwise.
    Cw,
}

/// Color blending presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// No blending.
    #[default]
    Opaque,
    /// Classic `src * a + dst * (1 - a)`.
    AlphaBlend,
    /// `src + dst`.
    Additive,
}

/// Depth and stencil state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    /// Depth attachment format.
    pub format: TextureFormat,
    /// Whether the depth test runs at all.
    pub depth_test_enabled: bool,
    /// Whether passing fragments write depth.
    pub depth_write_enabled: bool,
    /// Depth comparison.
    pub depth_compare: CompareFunction,
    /// Whether the stencil test runs.
    pub stencil_test_enabled: bool,
    /// Whether passing fragments write stencil.
    pub stencil_write_enabled: bool,
}

/// A shader stage entry: module plus entry point name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderEntry {
    /// Compiled module.
    pub module: ShaderModuleId,
    /// Entry point inside the module.
    pub entry_point: Cow<'static, str>,
}

/// Complete description of a graphics pipeline.
///
/// Every field except `label` is pipeline-defining: two descriptors that only
/// differ in their label describe the same pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GraphicsPipelineDescriptor {
    /// Debug label.
    pub label: Option<Cow<'static, str>>,
    /// Layout the pipeline is compiled against.
    pub layout: PipelineLayoutId,
    /// Render pass the pipeline is compatible with.
    pub render_pass: RenderPassId,
    /// Vertex stage.
    pub vertex: ShaderEntry,
    /// Fragment stage, absent for depth-only passes.
    pub fragment: Option<ShaderEntry>,
    /// Bound vertex buffers, slot `i` uses layout `i`.
    pub vertex_buffers: Vec<VertexBufferLayout>,
    /// Primitive assembly.
    pub topology: PrimitiveTopology,
    /// Face culling.
    pub cull_mode: CullMode,
    /// Front-face winding.
    pub front_face: FrontFace,
    /// Color blending.
    pub blend: BlendMode,
    /// Color attachment format, absent for depth-only passes.
    pub color_format: Option<TextureFormat>,
    /// Depth and stencil state.
    pub depth_stencil: Option<DepthStencilState>,
    /// MSAA sample count.
    pub sample_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_format_sizes() {
        assert_eq!(VertexFormat::Float32x2.size(), 8);
        assert_eq!(VertexFormat::Float32x3.size(), 12);
        assert_eq!(VertexFormat::Float32x4.size(), 16);
    }
}

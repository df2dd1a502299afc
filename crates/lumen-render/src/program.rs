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

//! Programs: shader stages, layout and fixed-function state of one material
//! layer, generated on demand for a render target.

use crate::instance::{
    InstanceDataLayout, InstanceFlags, MaterialLayer, MatrixPushLayout, Renderable,
};
use crate::render_target::RenderTargetKind;
use crate::services::ServiceError;
use lumen_core::renderer::api::{
    BlendMode, CullMode, FrontFace, PipelineLayoutId, PrimitiveTopology, ShaderEntry,
    ShaderModuleDescriptor, VertexBufferLayout,
};
use lumen_core::renderer::ResourceError;
use std::borrow::Cow;
use thiserror::Error;

/// The kind of pass a program is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Color rendering into a swap chain image or texture.
    Render,
    /// Depth-only rendering into a shadow map.
    ShadowCasting,
}

/// Errors raised while building a program.
#[derive(Debug, Error)]
pub enum ProgramError {
    /// The generator could not produce shader code.
    #[error("program generation failed: {0}")]
    Generation(String),
    /// A render service refused the request.
    #[error("render service error: {0}")]
    Service(#[from] ServiceError),
    /// A device object could not be created.
    #[error("device resource error: {0}")]
    Resource(#[from] ResourceError),
}

/// Everything a [`ProgramGenerator`] gets to decide the shader code of one
/// material layer.
#[derive(Clone, Copy)]
pub struct ProgramRequest<'a> {
    /// The renderable being drawn.
    pub renderable: &'a dyn Renderable,
    /// Index of `layer` in the renderable.
    pub layer_index: usize,
    /// The layer.
    pub layer: &'a MaterialLayer,
    /// The pass being prepared.
    pub pass: PassKind,
    /// The kind of target drawn into.
    pub target_kind: RenderTargetKind,
    /// Option flags of the instance.
    pub flags: InstanceFlags,
    /// Push constant block the vertex stage must declare.
    pub push_layout: MatrixPushLayout,
    /// Instance stream the vertex stage must declare, if any.
    pub instance_layout: Option<InstanceDataLayout>,
}

impl std::fmt::Debug for ProgramRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgramRequest")
            .field("renderable", &self.renderable.name())
            .field("layer_index", &self.layer_index)
            .field("pass", &self.pass)
            .field("target_kind", &self.target_kind)
            .field("flags", &self.flags)
            .field("push_layout", &self.push_layout)
            .field("instance_layout", &self.instance_layout)
            .finish()
    }
}

/// Source of one shader stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderStageSource {
    /// Module source.
    pub module: ShaderModuleDescriptor,
    /// Entry point inside the module.
    pub entry_point: Cow<'static, str>,
}

/// Shader code returned by a [`ProgramGenerator`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramSource {
    /// Vertex stage.
    pub vertex: ShaderStageSource,
    /// Fragment stage; shadow casting programs usually have none.
    pub fragment: Option<ShaderStageSource>,
}

/// Produces shader code for material layers.
///
/// Shader authoring lives outside the renderer; applications plug their
/// generator in when building it.
pub trait ProgramGenerator: Send + Sync {
    /// Generates the stages for `request`.
    fn generate(&self, request: &ProgramRequest<'_>) -> Result<ProgramSource, ProgramError>;
}

/// Compiled stages, layout and vertex input of a program.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Program {
    /// Vertex stage.
    pub vertex: ShaderEntry,
    /// Fragment stage.
    pub fragment: Option<ShaderEntry>,
    /// Pipeline layout: set 0 view, optional set 1 material, push constants.
    pub layout: PipelineLayoutId,
    /// Vertex buffer layouts, geometry first.
    pub vertex_buffers: Vec<VertexBufferLayout>,
}

/// Fixed-function state of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineState {
    /// Primitive assembly.
    pub topology: PrimitiveTopology,
    /// Face culling.
    pub cull_mode: CullMode,
    /// Winding of front faces.
    pub front_face: FrontFace,
    /// Color blending.
    pub blend: BlendMode,
    /// Depth test.
    pub depth_test: bool,
    /// Depth writes.
    pub depth_write: bool,
    /// Stencil test.
    pub stencil_test: bool,
    /// Stencil writes.
    pub stencil_write: bool,
}

impl PipelineState {
    /// State for drawing `layer` of an instance with `flags` in `pass`.
    ///
    /// Shadow casting ignores blending and always writes depth.
    pub fn for_layer(
        flags: InstanceFlags,
        layer: &MaterialLayer,
        topology: PrimitiveTopology,
        pass: PassKind,
    ) -> Self {
        let cull_mode = if flags.contains(InstanceFlags::DISABLE_BACK_FACE_CULLING) {
            CullMode::None
        } else {
            layer.cull_mode
        };
        match pass {
            PassKind::Render => Self {
                topology,
                cull_mode,
                front_face: FrontFace::Ccw,
                blend: layer.blend,
                depth_test: !flags.contains(InstanceFlags::DISABLE_DEPTH_TEST),
                depth_write: !flags.contains(InstanceFlags::DISABLE_DEPTH_WRITE),
                stencil_test: flags.contains(InstanceFlags::ENABLE_STENCIL_TEST),
                stencil_write: flags.contains(InstanceFlags::ENABLE_STENCIL_WRITE),
            },
            PassKind::ShadowCasting => Self {
                topology,
                cull_mode,
                front_face: FrontFace::Ccw,
                blend: BlendMode::Opaque,
                depth_test: true,
                depth_write: true,
                stencil_test: false,
                stencil_write: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_flags_shape_the_render_state() {
        let layer = MaterialLayer {
            blend: BlendMode::AlphaBlend,
            ..MaterialLayer::opaque("glass")
        };
        let state = PipelineState::for_layer(
            InstanceFlags::DISABLE_DEPTH_WRITE | InstanceFlags::DISABLE_BACK_FACE_CULLING,
            &layer,
            PrimitiveTopology::TriangleList,
            PassKind::Render,
        );
        assert_eq!(state.blend, BlendMode::AlphaBlend);
        assert_eq!(state.cull_mode, CullMode::None);
        assert!(state.depth_test);
        assert!(!state.depth_write);
    }

    #[test]
    fn shadow_casting_is_opaque_and_writes_depth() {
        let layer = MaterialLayer {
            blend: BlendMode::Additive,
            ..MaterialLayer::opaque("flare")
        };
        let state = PipelineState::for_layer(
            InstanceFlags::DISABLE_DEPTH_WRITE,
            &layer,
            PrimitiveTopology::TriangleList,
            PassKind::ShadowCasting,
        );
        assert_eq!(state.blend, BlendMode::Opaque);
        assert!(state.depth_write);
    }
}

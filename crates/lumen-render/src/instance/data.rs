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

//! Per-instance vertex data streamed by multiple-instance renderables.

use bytemuck::{Pod, Zeroable};
use lumen_core::math::{CartesianFrame, Mat3};
use lumen_core::renderer::api::{
    VertexAttribute, VertexBufferLayout, VertexFormat, VertexStepMode,
};

/// How one instance is laid out in the instance vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceDataLayout {
    /// A 4x4 model matrix followed by a 3x3 normal matrix.
    ModelMatrices,
    /// A world position followed by a per-axis scale. Used by
    /// camera-facing sprites.
    PositionScale,
}

/// Instance record of [`InstanceDataLayout::ModelMatrices`].
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct InstanceMatrices {
    /// Column-major model matrix.
    pub model: [f32; 16],
    /// Column-major normal matrix.
    pub normal: [f32; 9],
}

/// Instance record of [`InstanceDataLayout::PositionScale`].
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct InstancePositionScale {
    /// World position.
    pub position: [f32; 3],
    /// Per-axis scale.
    pub scale: [f32; 3],
}

impl InstanceDataLayout {
    /// Number of `f32` values in one instance record.
    pub const fn floats_per_instance(&self) -> usize {
        match self {
            Self::ModelMatrices => 16 + 9,
            Self::PositionScale => 3 + 3,
        }
    }

    /// Byte stride between two instance records.
    pub const fn stride(&self) -> u64 {
        (self.floats_per_instance() * std::mem::size_of::<f32>()) as u64
    }

    /// Encodes `frame` as one instance record.
    pub fn encode(&self, frame: &CartesianFrame) -> Vec<f32> {
        match self {
            Self::ModelMatrices => {
                let model = frame.model_matrix();
                let record = InstanceMatrices {
                    model: model.to_cols_array(),
                    normal: Mat3::normal_matrix(&model).to_cols_array(),
                };
                bytemuck::cast_slice(&[record]).to_vec()
            }
            Self::PositionScale => {
                let record = InstancePositionScale {
                    position: frame.position().to_array(),
                    scale: frame.scale().to_array(),
                };
                bytemuck::cast_slice(&[record]).to_vec()
            }
        }
    }

    /// The record of an instance that has never been written.
    pub fn identity(&self) -> Vec<f32> {
        self.encode(&CartesianFrame::default())
    }

    /// Vertex buffer layout of the instance stream.
    ///
    /// Matrices are split into one attribute per column. Locations start at
    /// `first_location`.
    pub fn vertex_layout(&self, first_location: u32) -> VertexBufferLayout {
        let formats: &[VertexFormat] = match self {
            Self::ModelMatrices => &[
                VertexFormat::Float32x4,
                VertexFormat::Float32x4,
                VertexFormat::Float32x4,
                VertexFormat::Float32x4,
                VertexFormat::Float32x3,
                VertexFormat::Float32x3,
                VertexFormat::Float32x3,
            ],
            Self::PositionScale => &[VertexFormat::Float32x3, VertexFormat::Float32x3],
        };
        let mut offset = 0;
        let attributes = formats
            .iter()
            .zip(first_location..)
            .map(|(format, shader_location)| {
                let attribute = VertexAttribute {
                    format: *format,
                    offset,
                    shader_location,
                };
                offset += format.size();
                attribute
            })
            .collect();
        VertexBufferLayout {
            array_stride: self.stride(),
            step_mode: VertexStepMode::Instance,
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::math::Vec3;

    #[test]
    fn strides_match_record_sizes() {
        assert_eq!(
            InstanceDataLayout::ModelMatrices.stride(),
            std::mem::size_of::<InstanceMatrices>() as u64
        );
        assert_eq!(
            InstanceDataLayout::PositionScale.stride(),
            std::mem::size_of::<InstancePositionScale>() as u64
        );
        assert_eq!(InstanceDataLayout::ModelMatrices.stride(), 100);
    }

    #[test]
    fn attributes_cover_the_whole_record() {
        for layout in [
            InstanceDataLayout::ModelMatrices,
            InstanceDataLayout::PositionScale,
        ] {
            let vertex = layout.vertex_layout(3);
            let last = vertex.attributes.last().unwrap();
            assert_eq!(last.offset + last.format.size(), layout.stride());
            assert_eq!(vertex.attributes[0].shader_location, 3);
            assert_eq!(vertex.step_mode, VertexStepMode::Instance);
        }
    }

    #[test]
    fn position_scale_encodes_frame() {
        let frame = CartesianFrame::at(Vec3::new(1.0, 2.0, 3.0)).with_scale(Vec3::new(4.0, 5.0, 6.0));
        assert_eq!(
            InstanceDataLayout::PositionScale.encode(&frame),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
        );
    }

    #[test]
    fn identity_record_holds_identity_matrix() {
        let record = InstanceDataLayout::ModelMatrices.identity();
        assert_eq!(record.len(), 25);
        assert_eq!(&record[..16], &lumen_core::math::Mat4::IDENTITY.to_cols_array());
    }
}

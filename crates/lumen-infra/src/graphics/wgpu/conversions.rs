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

//! Conversions between the `lumen-core` rendering vocabulary and wgpu types.

use lumen_core::renderer::api::{
    AddressMode, BackendType, BlendMode, BufferUsage, CompareFunction, CullMode, DescriptorType,
    DeviceType, Extent2D, FilterMode, FrontFace, IndexFormat, PowerPreference, PresentMode,
    PrimitiveTopology, ShaderStageFlags, StoreOp, TextureFormat, TextureUsage, VertexFormat,
    VertexStepMode,
};

/// A local extension trait to convert Lumen types into wgpu types.
/// It sidesteps the orphan rule while keeping an `.into_wgpu()` call syntax.
pub trait IntoWgpu<T> {
    /// Consumes self and converts it into the wgpu type.
    fn into_wgpu(self) -> T;
}

/// Returns a human-readable name for a backend.
pub fn backend_name(backend: wgpu::Backend) -> &'static str {
    match backend {
        wgpu::Backend::Vulkan => "Vulkan",
        wgpu::Backend::Metal => "Metal",
        wgpu::Backend::Dx12 => "DirectX 12",
        wgpu::Backend::Gl => "OpenGL",
        wgpu::Backend::BrowserWebGpu => "WebGPU",
        wgpu::Backend::Noop => "No-op",
    }
}

/// Maps a wgpu texture format back to Lumen, `None` for formats Lumen does not use.
pub fn from_wgpu_texture_format(format: wgpu::TextureFormat) -> Option<TextureFormat> {
    match format {
        wgpu::TextureFormat::Bgra8UnormSrgb => Some(TextureFormat::Bgra8UnormSrgb),
        wgpu::TextureFormat::Rgba8UnormSrgb => Some(TextureFormat::Rgba8UnormSrgb),
        wgpu::TextureFormat::Rgba8Unorm => Some(TextureFormat::Rgba8Unorm),
        wgpu::TextureFormat::Rgba16Float => Some(TextureFormat::Rgba16Float),
        wgpu::TextureFormat::Depth32Float => Some(TextureFormat::Depth32Float),
        wgpu::TextureFormat::Depth24PlusStencil8 => Some(TextureFormat::Depth24PlusStencil8),
        _ => None,
    }
}

pub(crate) fn backend_type(backend: wgpu::Backend) -> BackendType {
    match backend {
        wgpu::Backend::Vulkan => BackendType::Vulkan,
        wgpu::Backend::Metal => BackendType::Metal,
        wgpu::Backend::Dx12 => BackendType::Dx12,
        wgpu::Backend::Gl => BackendType::OpenGl,
        wgpu::Backend::BrowserWebGpu => BackendType::WebGpu,
        wgpu::Backend::Noop => BackendType::Other,
    }
}

pub(crate) fn device_type(device_type: wgpu::DeviceType) -> DeviceType {
    match device_type {
        wgpu::DeviceType::IntegratedGpu => DeviceType::IntegratedGpu,
        wgpu::DeviceType::DiscreteGpu => DeviceType::DiscreteGpu,
        wgpu::DeviceType::VirtualGpu => DeviceType::VirtualGpu,
        wgpu::DeviceType::Cpu => DeviceType::Cpu,
        _ => DeviceType::Unknown,
    }
}

/// Linear RGBA clear color.
pub(crate) fn clear_color(color: [f32; 4]) -> wgpu::Color {
    wgpu::Color {
        r: color[0] as f64,
        g: color[1] as f64,
        b: color[2] as f64,
        a: color[3] as f64,
    }
}

// --- Dimensions ---

impl IntoWgpu<wgpu::Extent3d> for Extent2D {
    fn into_wgpu(self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

impl IntoWgpu<winit::dpi::PhysicalSize<u32>> for Extent2D {
    fn into_wgpu(self) -> winit::dpi::PhysicalSize<u32> {
        winit::dpi::PhysicalSize::new(self.width, self.height)
    }
}

// --- Textures and samplers ---

impl IntoWgpu<wgpu::TextureFormat> for TextureFormat {
    fn into_wgpu(self) -> wgpu::TextureFormat {
        match self {
            TextureFormat::Bgra8UnormSrgb => wgpu::TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
            TextureFormat::Depth24PlusStencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
        }
    }
}

impl IntoWgpu<wgpu::TextureUsages> for TextureUsage {
    fn into_wgpu(self) -> wgpu::TextureUsages {
        match self {
            TextureUsage::RenderTarget => {
                wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING
            }
            TextureUsage::DepthAttachment => wgpu::TextureUsages::RENDER_ATTACHMENT,
        }
    }
}

impl IntoWgpu<wgpu::FilterMode> for FilterMode {
    fn into_wgpu(self) -> wgpu::FilterMode {
        match self {
            FilterMode::Nearest => wgpu::FilterMode::Nearest,
            FilterMode::Linear => wgpu::FilterMode::Linear,
        }
    }
}

impl IntoWgpu<wgpu::AddressMode> for AddressMode {
    fn into_wgpu(self) -> wgpu::AddressMode {
        match self {
            AddressMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
            AddressMode::Repeat => wgpu::AddressMode::Repeat,
            AddressMode::MirrorRepeat => wgpu::AddressMode::MirrorRepeat,
        }
    }
}

impl IntoWgpu<wgpu::CompareFunction> for CompareFunction {
    fn into_wgpu(self) -> wgpu::CompareFunction {
        match self {
            CompareFunction::Never => wgpu::CompareFunction::Never,
            CompareFunction::Less => wgpu::CompareFunction::Less,
            CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
            CompareFunction::Greater => wgpu::CompareFunction::Greater,
            CompareFunction::Always => wgpu::CompareFunction::Always,
        }
    }
}

// --- Buffers ---

impl IntoWgpu<wgpu::BufferUsages> for BufferUsage {
    fn into_wgpu(self) -> wgpu::BufferUsages {
        let mut usages = wgpu::BufferUsages::empty();
        for (ours, theirs) in [
            (BufferUsage::VERTEX, wgpu::BufferUsages::VERTEX),
            (BufferUsage::INDEX, wgpu::BufferUsages::INDEX),
            (BufferUsage::UNIFORM, wgpu::BufferUsages::UNIFORM),
            (BufferUsage::STORAGE, wgpu::BufferUsages::STORAGE),
            (BufferUsage::COPY_DST, wgpu::BufferUsages::COPY_DST),
        ] {
            if self.contains(ours) {
                usages |= theirs;
            }
        }
        usages
    }
}

impl IntoWgpu<wgpu::IndexFormat> for IndexFormat {
    fn into_wgpu(self) -> wgpu::IndexFormat {
        match self {
            IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
            IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
        }
    }
}

// --- Shaders and descriptors ---

impl IntoWgpu<wgpu::ShaderStages> for ShaderStageFlags {
    fn into_wgpu(self) -> wgpu::ShaderStages {
        let mut stages = wgpu::ShaderStages::NONE;
        if self.contains(lumen_core::renderer::api::ShaderStage::Vertex) {
            stages |= wgpu::ShaderStages::VERTEX;
        }
        if self.contains(lumen_core::renderer::api::ShaderStage::Fragment) {
            stages |= wgpu::ShaderStages::FRAGMENT;
        }
        stages
    }
}

/// wgpu has no combined image-sampler binding, so it becomes a sampled texture
/// and the sampler must be bound separately.
impl IntoWgpu<wgpu::BindingType> for DescriptorType {
    fn into_wgpu(self) -> wgpu::BindingType {
        match self {
            DescriptorType::UniformBuffer => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            DescriptorType::StorageBuffer => wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            DescriptorType::SampledImage | DescriptorType::CombinedImageSampler => {
                wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                }
            }
            DescriptorType::Sampler => {
                wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
            }
        }
    }
}

// --- Pipeline state ---

impl IntoWgpu<wgpu::VertexFormat> for VertexFormat {
    fn into_wgpu(self) -> wgpu::VertexFormat {
        match self {
            VertexFormat::Float32x2 => wgpu::VertexFormat::Float32x2,
            VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
            VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
        }
    }
}

impl IntoWgpu<wgpu::VertexStepMode> for VertexStepMode {
    fn into_wgpu(self) -> wgpu::VertexStepMode {
        match self {
            VertexStepMode::Vertex => wgpu::VertexStepMode::Vertex,
            VertexStepMode::Instance => wgpu::VertexStepMode::Instance,
        }
    }
}

impl IntoWgpu<wgpu::PrimitiveTopology> for PrimitiveTopology {
    fn into_wgpu(self) -> wgpu::PrimitiveTopology {
        match self {
            PrimitiveTopology::PointList => wgpu::PrimitiveTopology::PointList,
            PrimitiveTopology::LineList => wgpu::PrimitiveTopology::LineList,
            PrimitiveTopology::TriangleList => wgpu::PrimitiveTopology::TriangleList,
            PrimitiveTopology::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
        }
    }
}

impl IntoWgpu<wgpu::FrontFace> for FrontFace {
    fn into_wgpu(self) -> wgpu::FrontFace {
        match self {
            FrontFace::Ccw => wgpu::FrontFace::Ccw,
            FrontFace::Cw => wgpu::FrontFace::Cw,
        }
    }
}

impl IntoWgpu<Option<wgpu::Face>> for CullMode {
    fn into_wgpu(self) -> Option<wgpu::Face> {
        match self {
            CullMode::None => None,
            CullMode::Front => Some(wgpu::Face::Front),
            CullMode::Back => Some(wgpu::Face::Back),
        }
    }
}

impl IntoWgpu<Option<wgpu::BlendState>> for BlendMode {
    fn into_wgpu(self) -> Option<wgpu::BlendState> {
        match self {
            BlendMode::Opaque => None,
            BlendMode::AlphaBlend => Some(wgpu::BlendState::ALPHA_BLENDING),
            BlendMode::Additive => {
                let additive = wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::One,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                };
                Some(wgpu::BlendState {
                    color: additive,
                    alpha: additive,
                })
            }
        }
    }
}

impl IntoWgpu<wgpu::StoreOp> for StoreOp {
    fn into_wgpu(self) -> wgpu::StoreOp {
        match self {
            StoreOp::Store => wgpu::StoreOp::Store,
            StoreOp::Discard => wgpu::StoreOp::Discard,
        }
    }
}

// --- Presentation and adapters ---

impl IntoWgpu<wgpu::PresentMode> for PresentMode {
    fn into_wgpu(self) -> wgpu::PresentMode {
        match self {
            PresentMode::Fifo => wgpu::PresentMode::Fifo,
            PresentMode::Mailbox => wgpu::PresentMode::Mailbox,
            PresentMode::Immediate => wgpu::PresentMode::Immediate,
        }
    }
}

impl IntoWgpu<wgpu::PowerPreference> for PowerPreference {
    fn into_wgpu(self) -> wgpu::PowerPreference {
        match self {
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_name_function() {
        assert_eq!(backend_name(wgpu::Backend::Vulkan), "Vulkan");
        assert_eq!(backend_name(wgpu::Backend::Metal), "Metal");
        assert_eq!(backend_name(wgpu::Backend::Dx12), "DirectX 12");
        assert_eq!(backend_name(wgpu::Backend::Gl), "OpenGL");
    }

    #[test]
    fn test_texture_formats_round_trip_through_wgpu() {
        for format in [
            TextureFormat::Bgra8UnormSrgb,
            TextureFormat::Rgba16Float,
            TextureFormat::Depth24PlusStencil8,
        ] {
            let wgpu_format: wgpu::TextureFormat = format.into_wgpu();
            assert_eq!(from_wgpu_texture_format(wgpu_format), Some(format));
        }
        assert_eq!(from_wgpu_texture_format(wgpu::TextureFormat::R8Unorm), None);
    }

    #[test]
    fn test_buffer_usage_bits_map_individually() {
        let usages: wgpu::BufferUsages = (BufferUsage::VERTEX | BufferUsage::COPY_DST).into_wgpu();
        assert_eq!(
            usages,
            wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST
        );
        let none: wgpu::BufferUsages = BufferUsage::default().into_wgpu();
        assert!(none.is_empty());
    }

    #[test]
    fn test_shader_stage_flags() {
        let both: wgpu::ShaderStages = ShaderStageFlags::VERTEX_FRAGMENT.into_wgpu();
        assert_eq!(both, wgpu::ShaderStages::VERTEX_FRAGMENT);
        let none: wgpu::ShaderStages = ShaderStageFlags::NONE.into_wgpu();
        assert_eq!(none, wgpu::ShaderStages::NONE);
    }

    #[test]
    fn test_cull_and_blend_modes() {
        let culled: Option<wgpu::Face> = CullMode::Back.into_wgpu();
        assert_eq!(culled, Some(wgpu::Face::Back));
        let unculled: Option<wgpu::Face> = CullMode::None.into_wgpu();
        assert_eq!(unculled, None);

        let opaque: Option<wgpu::BlendState> = BlendMode::Opaque.into_wgpu();
        assert!(opaque.is_none());
        let alpha: Option<wgpu::BlendState> = BlendMode::AlphaBlend.into_wgpu();
        assert_eq!(alpha, Some(wgpu::BlendState::ALPHA_BLENDING));
    }

    #[test]
    fn test_extent_to_wgpu_extent3d() {
        let extent: wgpu::Extent3d = Extent2D::new(128, 256).into_wgpu();
        assert_eq!(extent.width, 128);
        assert_eq!(extent.height, 256);
        assert_eq!(extent.depth_or_array_layers, 1);
    }

    #[test]
    fn test_clear_color_widens_channels() {
        let color = clear_color([0.25, 0.5, 0.75, 1.0]);
        assert_eq!(color.r, 0.25);
        assert_eq!(color.b, 0.75);
        assert_eq!(color.a, 1.0);
    }
}

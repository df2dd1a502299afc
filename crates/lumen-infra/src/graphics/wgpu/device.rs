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

//! The wgpu [`GraphicsDevice`].

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lumen_core::renderer::api::{
    AcquiredImage, AdapterInfo, BufferDescriptor, BufferId, CommandBufferId, CommandBufferUsage,
    CommandPoolDescriptor, CommandPoolId, DescriptorBinding, DescriptorPoolDescriptor,
    DescriptorPoolId, DescriptorResource, DescriptorSetId, DescriptorSetLayoutDescriptor,
    DescriptorSetLayoutId, DescriptorType, GraphicsPipelineDescriptor, PipelineLayoutDescriptor,
    PipelineLayoutId, PresentStatus, RenderPassDescriptor, RenderPassId, RenderPipelineId,
    SamplerDescriptor, SamplerId, ShaderModuleDescriptor, ShaderModuleId, ShaderSource,
    SubmissionId, SubmitInfo, SwapChainDescriptor, SwapChainId, SwapChainInfo,
    TextureDescriptor, TextureId, TextureViewId,
};
use lumen_core::renderer::{
    CommandRecorder, GraphicsDevice, PipelineError, RenderError, ResourceError, ShaderError,
    SurfaceError,
};

use super::context::WgpuGraphicsContext;
use super::conversions::{self, IntoWgpu};
use super::recorder::WgpuCommandRecorder;

/// Submissions remembered for [`GraphicsDevice::wait_for_submission`].
/// Older ones are covered by waiting on the oldest remembered one, since the
/// queue completes work in order.
const TRACKED_SUBMISSIONS: usize = 32;

/// Locks a resource map, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct WgpuBufferEntry {
    wgpu_buffer: Arc<wgpu::Buffer>,
    size: u64,
}

#[derive(Debug)]
struct WgpuDescriptorPoolEntry {
    descriptor: DescriptorPoolDescriptor,
    /// Descriptor types consumed by each live set.
    sets: HashMap<DescriptorSetId, Vec<DescriptorType>>,
}

impl WgpuDescriptorPoolEntry {
    fn used(&self, ty: DescriptorType) -> u32 {
        self.sets
            .values()
            .flatten()
            .filter(|used| **used == ty)
            .count() as u32
    }
}

#[derive(Debug)]
struct AcquiredSurfaceImage {
    texture: wgpu::SurfaceTexture,
    view: TextureViewId,
    suboptimal: bool,
}

#[derive(Debug)]
struct WgpuSwapChainEntry {
    image_count: u32,
    next_index: u32,
    acquired: HashMap<u32, AcquiredSurfaceImage>,
}

/// The internal, non-clonable state of the [`WgpuDevice`].
#[derive(Debug)]
struct WgpuDeviceInternal {
    context: WgpuGraphicsContext,

    buffers: Mutex<HashMap<BufferId, WgpuBufferEntry>>,
    textures: Mutex<HashMap<TextureId, Arc<wgpu::Texture>>>,
    texture_views: Mutex<HashMap<TextureViewId, Arc<wgpu::TextureView>>>,
    samplers: Mutex<HashMap<SamplerId, Arc<wgpu::Sampler>>>,
    shader_modules: Mutex<HashMap<ShaderModuleId, Arc<wgpu::ShaderModule>>>,
    /// wgpu has no render pass object; the descriptor drives `begin_render_pass`.
    render_passes: Mutex<HashMap<RenderPassId, RenderPassDescriptor>>,
    set_layouts: Mutex<HashMap<DescriptorSetLayoutId, Arc<wgpu::BindGroupLayout>>>,
    pipeline_layouts: Mutex<HashMap<PipelineLayoutId, Arc<wgpu::PipelineLayout>>>,
    pipelines: Mutex<HashMap<RenderPipelineId, Arc<wgpu::RenderPipeline>>>,
    descriptor_pools: Mutex<HashMap<DescriptorPoolId, WgpuDescriptorPoolEntry>>,
    bind_groups: Mutex<HashMap<DescriptorSetId, Arc<wgpu::BindGroup>>>,
    command_pools: Mutex<HashMap<CommandPoolId, Vec<CommandBufferId>>>,
    /// Command buffers that have been finished but not yet submitted.
    finished: Mutex<HashMap<CommandBufferId, wgpu::CommandBuffer>>,
    submissions: Mutex<VecDeque<(SubmissionId, wgpu::SubmissionIndex)>>,
    swap_chains: Mutex<HashMap<SwapChainId, WgpuSwapChainEntry>>,

    next_id: AtomicUsize,
    command_buffer_id_counter: AtomicU64,
    submission_counter: AtomicU64,
}

/// A clonable, thread-safe handle to a wgpu logical device.
///
/// Every object created through [`GraphicsDevice`] lives in a map keyed by
/// its Lumen ID. Recorders clone the handle to resolve IDs while recording.
#[derive(Clone, Debug)]
pub struct WgpuDevice {
    internal: Arc<WgpuDeviceInternal>,
}

impl WgpuDevice {
    /// Wraps an opened context.
    pub fn new(context: WgpuGraphicsContext) -> Self {
        Self {
            internal: Arc::new(WgpuDeviceInternal {
                context,
                buffers: Mutex::new(HashMap::new()),
                textures: Mutex::new(HashMap::new()),
                texture_views: Mutex::new(HashMap::new()),
                samplers: Mutex::new(HashMap::new()),
                shader_modules: Mutex::new(HashMap::new()),
                render_passes: Mutex::new(HashMap::new()),
                set_layouts: Mutex::new(HashMap::new()),
                pipeline_layouts: Mutex::new(HashMap::new()),
                pipelines: Mutex::new(HashMap::new()),
                descriptor_pools: Mutex::new(HashMap::new()),
                bind_groups: Mutex::new(HashMap::new()),
                command_pools: Mutex::new(HashMap::new()),
                finished: Mutex::new(HashMap::new()),
                submissions: Mutex::new(VecDeque::with_capacity(TRACKED_SUBMISSIONS)),
                swap_chains: Mutex::new(HashMap::new()),
                next_id: AtomicUsize::new(1),
                command_buffer_id_counter: AtomicU64::new(1),
                submission_counter: AtomicU64::new(0),
            }),
        }
    }

    /// The context behind this device.
    pub fn context(&self) -> &WgpuGraphicsContext {
        &self.internal.context
    }

    fn next_id(&self) -> usize {
        self.internal.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn poll(&self, submission_index: Option<wgpu::SubmissionIndex>) -> Result<(), RenderError> {
        self.internal
            .context
            .device
            .poll(wgpu::PollType::Wait {
                submission_index,
                timeout: None,
            })
            .map(|_| ())
            .map_err(|e| RenderError::RenderingFailed(format!("Failed to poll device: {e}")))
    }

    // --- Lookups used by the recorder ---

    pub(crate) fn wgpu_device(&self) -> &wgpu::Device {
        &self.internal.context.device
    }

    pub(crate) fn get_wgpu_buffer(&self, id: BufferId) -> Option<Arc<wgpu::Buffer>> {
        lock(&self.internal.buffers)
            .get(&id)
            .map(|entry| Arc::clone(&entry.wgpu_buffer))
    }

    pub(crate) fn get_wgpu_texture_view(&self, id: TextureViewId) -> Option<Arc<wgpu::TextureView>> {
        lock(&self.internal.texture_views).get(&id).cloned()
    }

    pub(crate) fn get_wgpu_render_pipeline(
        &self,
        id: RenderPipelineId,
    ) -> Option<Arc<wgpu::RenderPipeline>> {
        lock(&self.internal.pipelines).get(&id).cloned()
    }

    pub(crate) fn get_wgpu_bind_group(&self, id: DescriptorSetId) -> Option<Arc<wgpu::BindGroup>> {
        lock(&self.internal.bind_groups).get(&id).cloned()
    }

    pub(crate) fn render_pass_descriptor(&self, id: RenderPassId) -> Option<RenderPassDescriptor> {
        lock(&self.internal.render_passes).get(&id).cloned()
    }

    /// Stores a finished command buffer until it is submitted.
    pub(crate) fn register_command_buffer(&self, id: CommandBufferId, buffer: wgpu::CommandBuffer) {
        lock(&self.internal.finished).insert(id, buffer);
    }

    fn surface_error(error: wgpu::SurfaceError) -> SurfaceError {
        match error {
            wgpu::SurfaceError::Timeout => SurfaceError::Timeout,
            wgpu::SurfaceError::Outdated => SurfaceError::OutOfDate,
            wgpu::SurfaceError::Lost => SurfaceError::Lost,
            wgpu::SurfaceError::OutOfMemory => SurfaceError::OutOfMemory,
            other => SurfaceError::Other(other.to_string()),
        }
    }

    fn swap_chain_info(
        &self,
        descriptor: &SwapChainDescriptor,
    ) -> Result<(u32, SwapChainInfo), RenderError> {
        let latency = descriptor.image_count.saturating_sub(1).max(1);
        let (_config, format) = self
            .internal
            .context
            .configure_surface(descriptor.extent, descriptor.present_mode, latency)
            .map_err(|e| RenderError::InitializationFailed(e.to_string()))?;
        let image_count = latency + 1;
        Ok((
            image_count,
            SwapChainInfo {
                extent: descriptor.extent,
                image_count,
                format,
            },
        ))
    }

    /// Drops every image acquired but not presented, with its view.
    fn release_acquired(&self, chain: &mut WgpuSwapChainEntry) {
        let mut views = lock(&self.internal.texture_views);
        for (_, image) in chain.acquired.drain() {
            views.remove(&image.view);
        }
    }
}

impl GraphicsDevice for WgpuDevice {
    fn adapter_info(&self) -> AdapterInfo {
        let context = &self.internal.context;
        AdapterInfo {
            name: context.adapter_name.clone(),
            backend: conversions::backend_type(context.adapter_backend),
            device_type: conversions::device_type(context.adapter_device_type),
        }
    }

    // --- Buffer Operations ---

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<BufferId, ResourceError> {
        let wgpu_buffer = self
            .wgpu_device()
            .create_buffer(&wgpu::BufferDescriptor {
                label: descriptor.label.as_deref(),
                size: descriptor.size,
                usage: descriptor.usage.into_wgpu(),
                mapped_at_creation: false,
            });
        let id = BufferId(self.next_id());
        lock(&self.internal.buffers).insert(
            id,
            WgpuBufferEntry {
                wgpu_buffer: Arc::new(wgpu_buffer),
                size: descriptor.size,
            },
        );
        log::trace!(
            "WgpuDevice: Created buffer {:?} ({} bytes, label: {:?})",
            id,
            descriptor.size,
            descriptor.label
        );
        Ok(id)
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8]) -> Result<(), ResourceError> {
        // 1. Resolve the buffer without holding the map during the copy
        let (buffer, size) = {
            let buffers = lock(&self.internal.buffers);
            let entry = buffers.get(&id).ok_or(ResourceError::NotFound)?;
            (Arc::clone(&entry.wgpu_buffer), entry.size)
        };

        // 2. Bounds check
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(ResourceError::OutOfBounds)?;
        if end > size {
            return Err(ResourceError::OutOfBounds);
        }

        // 3. Staged write, flushed with the next submission
        self.internal.context.queue.write_buffer(&buffer, offset, data);
        Ok(())
    }

    fn destroy_buffer(&self, id: BufferId) -> Result<(), ResourceError> {
        let entry = lock(&self.internal.buffers)
            .remove(&id)
            .ok_or(ResourceError::NotFound)?;
        entry.wgpu_buffer.destroy();
        Ok(())
    }

    // --- Texture Operations ---

    fn create_texture(&self, descriptor: &TextureDescriptor) -> Result<TextureId, ResourceError> {
        if descriptor.extent.is_empty() {
            return Err(ResourceError::BackendError(format!(
                "cannot create a {}x{} texture",
                descriptor.extent.width, descriptor.extent.height
            )));
        }
        let texture = self.wgpu_device().create_texture(&wgpu::TextureDescriptor {
            label: descriptor.label.as_deref(),
            size: descriptor.extent.into_wgpu(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: descriptor.format.into_wgpu(),
            usage: descriptor.usage.into_wgpu(),
            view_formats: &[],
        });
        let id = TextureId(self.next_id());
        lock(&self.internal.textures).insert(id, Arc::new(texture));
        Ok(id)
    }

    fn create_texture_view(&self, texture: TextureId) -> Result<TextureViewId, ResourceError> {
        let texture = lock(&self.internal.textures)
            .get(&texture)
            .cloned()
            .ok_or(ResourceError::NotFound)?;
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = TextureViewId(self.next_id());
        lock(&self.internal.texture_views).insert(id, Arc::new(view));
        Ok(id)
    }

    fn destroy_texture_view(&self, id: TextureViewId) -> Result<(), ResourceError> {
        lock(&self.internal.texture_views)
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn destroy_texture(&self, id: TextureId) -> Result<(), ResourceError> {
        let texture = lock(&self.internal.textures)
            .remove(&id)
            .ok_or(ResourceError::NotFound)?;
        texture.destroy();
        Ok(())
    }

    fn create_sampler(&self, descriptor: &SamplerDescriptor) -> Result<SamplerId, ResourceError> {
        let address_mode: wgpu::AddressMode = descriptor.address_mode.into_wgpu();
        let sampler = self.wgpu_device().create_sampler(&wgpu::SamplerDescriptor {
            label: descriptor.label.as_deref(),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: descriptor.mag_filter.into_wgpu(),
            min_filter: descriptor.min_filter.into_wgpu(),
            mipmap_filter: descriptor.mipmap_filter.into_wgpu(),
            compare: descriptor.compare.map(IntoWgpu::into_wgpu),
            anisotropy_clamp: descriptor.anisotropy_clamp.max(1),
            ..Default::default()
        });
        let id = SamplerId(self.next_id());
        lock(&self.internal.samplers).insert(id, Arc::new(sampler));
        Ok(id)
    }

    fn destroy_sampler(&self, id: SamplerId) -> Result<(), ResourceError> {
        lock(&self.internal.samplers)
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    // --- Shader Module Operations ---

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
        let wgpu_source = match &descriptor.source {
            ShaderSource::Wgsl(text) => wgpu::ShaderSource::Wgsl(text.clone()),
        };
        log::debug!(
            "WgpuDevice: Creating wgpu::ShaderModule with label: {:?}",
            descriptor.label
        );
        let module = self
            .wgpu_device()
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: descriptor.label.as_deref(),
                source: wgpu_source,
            });
        let id = ShaderModuleId(self.next_id());
        lock(&self.internal.shader_modules).insert(id, Arc::new(module));
        Ok(id)
    }

    fn destroy_shader_module(&self, id: ShaderModuleId) -> Result<(), ResourceError> {
        if lock(&self.internal.shader_modules).remove(&id).is_some() {
            log::debug!("WgpuDevice: Destroyed shader module with ID: {id:?}");
            Ok(())
        } else {
            Err(ShaderError::NotFound { id }.into())
        }
    }

    // --- Render passes and pipelines ---

    fn create_render_pass(
        &self,
        descriptor: &RenderPassDescriptor,
    ) -> Result<RenderPassId, ResourceError> {
        if descriptor.color.is_none() && descriptor.depth_stencil.is_none() {
            return Err(ResourceError::BackendError(
                "a render pass needs at least one attachment".to_string(),
            ));
        }
        let id = RenderPassId(self.next_id());
        lock(&self.internal.render_passes).insert(id, descriptor.clone());
        Ok(id)
    }

    fn destroy_render_pass(&self, id: RenderPassId) -> Result<(), ResourceError> {
        lock(&self.internal.render_passes)
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_pipeline_layout(
        &self,
        descriptor: &PipelineLayoutDescriptor,
    ) -> Result<PipelineLayoutId, ResourceError> {
        log::debug!(
            "WgpuDevice: Creating pipeline layout with label: {:?}",
            descriptor.label
        );
        let set_layouts = {
            let layouts = lock(&self.internal.set_layouts);
            descriptor
                .set_layouts
                .iter()
                .map(|id| {
                    layouts.get(id).cloned().ok_or_else(|| {
                        PipelineError::LayoutCreationFailed(format!(
                            "unknown descriptor set layout {id:?}"
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
        };
        let bind_group_layouts: Vec<&wgpu::BindGroupLayout> =
            set_layouts.iter().map(|layout| layout.as_ref()).collect();
        let push_constant_ranges: Vec<wgpu::PushConstantRange> = descriptor
            .push_constant_ranges
            .iter()
            .map(|range| wgpu::PushConstantRange {
                stages: range.stages.into_wgpu(),
                range: range.range.clone(),
            })
            .collect();

        let layout = self
            .wgpu_device()
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: descriptor.label.as_deref(),
                bind_group_layouts: &bind_group_layouts,
                push_constant_ranges: &push_constant_ranges,
            });
        let id = PipelineLayoutId(self.next_id());
        lock(&self.internal.pipeline_layouts).insert(id, Arc::new(layout));
        Ok(id)
    }

    fn destroy_pipeline_layout(&self, id: PipelineLayoutId) -> Result<(), ResourceError> {
        lock(&self.internal.pipeline_layouts)
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn create_render_pipeline(
        &self,
        descriptor: &GraphicsPipelineDescriptor,
    ) -> Result<RenderPipelineId, ResourceError> {
        log::debug!(
            "WgpuDevice: Creating render pipeline with label: {:?}",
            descriptor.label
        );

        // --- 1. Resolve the pass, layout and shader modules ---
        let pass = self
            .render_pass_descriptor(descriptor.render_pass)
            .ok_or(PipelineError::InvalidRenderPass {
                id: descriptor.render_pass,
            })?;
        let pass_color = pass.color.map(|attachment| attachment.format);
        if descriptor.color_format != pass_color {
            return Err(PipelineError::IncompatibleColorTarget(format!(
                "pipeline writes {:?}, render pass {:?} holds {:?}",
                descriptor.color_format, descriptor.render_pass, pass_color
            ))
            .into());
        }
        let layout = lock(&self.internal.pipeline_layouts)
            .get(&descriptor.layout)
            .cloned()
            .ok_or(PipelineError::InvalidLayout {
                id: descriptor.layout,
            })?;
        let (vertex_module, fragment_module) = {
            let modules = lock(&self.internal.shader_modules);
            let find = |id: ShaderModuleId| {
                modules
                    .get(&id)
                    .cloned()
                    .ok_or(ResourceError::Shader(ShaderError::NotFound { id }))
            };
            let vertex = find(descriptor.vertex.module)?;
            let fragment = descriptor
                .fragment
                .as_ref()
                .map(|entry| find(entry.module))
                .transpose()?;
            (vertex, fragment)
        };

        // --- 2. Convert vertex buffers layout ---
        let attributes: Vec<Vec<wgpu::VertexAttribute>> = descriptor
            .vertex_buffers
            .iter()
            .map(|layout| {
                layout
                    .attributes
                    .iter()
                    .map(|attribute| wgpu::VertexAttribute {
                        format: attribute.format.into_wgpu(),
                        offset: attribute.offset,
                        shader_location: attribute.shader_location,
                    })
                    .collect()
            })
            .collect();
        let vertex_buffers: Vec<wgpu::VertexBufferLayout> = descriptor
            .vertex_buffers
            .iter()
            .zip(attributes.iter())
            .map(|(layout, attributes)| wgpu::VertexBufferLayout {
                array_stride: layout.array_stride,
                step_mode: layout.step_mode.into_wgpu(),
                attributes,
            })
            .collect();

        // --- 3. Depth, stencil and color targets ---
        let depth_stencil = descriptor.depth_stencil.map(|ds| {
            let stencil = if ds.stencil_test_enabled {
                let face = wgpu::StencilFaceState {
                    compare: wgpu::CompareFunction::Always,
                    fail_op: wgpu::StencilOperation::Keep,
                    depth_fail_op: wgpu::StencilOperation::Keep,
                    pass_op: if ds.stencil_write_enabled {
                        wgpu::StencilOperation::Replace
                    } else {
                        wgpu::StencilOperation::Keep
                    },
                };
                wgpu::StencilState {
                    front: face,
                    back: face,
                    read_mask: 0xff,
                    write_mask: if ds.stencil_write_enabled { 0xff } else { 0 },
                }
            } else {
                wgpu::StencilState::default()
            };
            wgpu::DepthStencilState {
                format: ds.format.into_wgpu(),
                depth_write_enabled: ds.depth_test_enabled && ds.depth_write_enabled,
                depth_compare: if ds.depth_test_enabled {
                    ds.depth_compare.into_wgpu()
                } else {
                    wgpu::CompareFunction::Always
                },
                stencil,
                bias: wgpu::DepthBiasState::default(),
            }
        });
        let color_targets: Vec<Option<wgpu::ColorTargetState>> = descriptor
            .color_format
            .map(|format| wgpu::ColorTargetState {
                format: format.into_wgpu(),
                blend: descriptor.blend.into_wgpu(),
                write_mask: wgpu::ColorWrites::ALL,
            })
            .into_iter()
            .map(Some)
            .collect();

        // --- 4. Create the pipeline ---
        let pipeline = self
            .wgpu_device()
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: descriptor.label.as_deref(),
                layout: Some(layout.as_ref()),
                vertex: wgpu::VertexState {
                    module: vertex_module.as_ref(),
                    entry_point: Some(descriptor.vertex.entry_point.as_ref()),
                    buffers: &vertex_buffers,
                    compilation_options: Default::default(),
                },
                fragment: match (&fragment_module, &descriptor.fragment) {
                    (Some(module), Some(entry)) => Some(wgpu::FragmentState {
                        module: module.as_ref(),
                        entry_point: Some(entry.entry_point.as_ref()),
                        targets: &color_targets,
                        compilation_options: Default::default(),
                    }),
                    _ => None,
                },
                primitive: wgpu::PrimitiveState {
                    topology: descriptor.topology.into_wgpu(),
                    front_face: descriptor.front_face.into_wgpu(),
                    cull_mode: descriptor.cull_mode.into_wgpu(),
                    ..Default::default()
                },
                depth_stencil,
                multisample: wgpu::MultisampleState {
                    count: descriptor.sample_count.max(1),
                    ..Default::default()
                },
                multiview: None,
                cache: None,
            });

        let id = RenderPipelineId(self.next_id());
        lock(&self.internal.pipelines).insert(id, Arc::new(pipeline));
        log::info!(
            "WgpuDevice: Created render pipeline '{}' with ID: {:?}",
            descriptor.label.as_deref().unwrap_or_default(),
            id
        );
        Ok(id)
    }

    fn destroy_render_pipeline(&self, id: RenderPipelineId) -> Result<(), ResourceError> {
        if lock(&self.internal.pipelines).remove(&id).is_some() {
            log::debug!("WgpuDevice: Destroyed render pipeline with ID: {id:?}");
            Ok(())
        } else {
            Err(ResourceError::NotFound)
        }
    }

    // --- Descriptors ---

    fn create_descriptor_pool(
        &self,
        descriptor: &DescriptorPoolDescriptor,
    ) -> Result<DescriptorPoolId, ResourceError> {
        let id = DescriptorPoolId(self.next_id());
        lock(&self.internal.descriptor_pools).insert(
            id,
            WgpuDescriptorPoolEntry {
                descriptor: descriptor.clone(),
                sets: HashMap::new(),
            },
        );
        Ok(id)
    }

    fn destroy_descriptor_pool(&self, id: DescriptorPoolId) -> Result<(), ResourceError> {
        let pool = lock(&self.internal.descriptor_pools)
            .remove(&id)
            .ok_or(ResourceError::NotFound)?;
        let mut bind_groups = lock(&self.internal.bind_groups);
        for set in pool.sets.keys() {
            bind_groups.remove(set);
        }
        Ok(())
    }

    fn create_descriptor_set_layout(
        &self,
        descriptor: &DescriptorSetLayoutDescriptor,
    ) -> Result<DescriptorSetLayoutId, ResourceError> {
        let entries: Vec<wgpu::BindGroupLayoutEntry> = descriptor
            .entries
            .iter()
            .map(|entry| wgpu::BindGroupLayoutEntry {
                binding: entry.binding,
                visibility: entry.visibility.into_wgpu(),
                ty: entry.ty.into_wgpu(),
                count: None,
            })
            .collect();
        let layout = self
            .wgpu_device()
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: descriptor.label.as_deref(),
                entries: &entries,
            });
        let id = DescriptorSetLayoutId(self.next_id());
        lock(&self.internal.set_layouts).insert(id, Arc::new(layout));
        Ok(id)
    }

    fn destroy_descriptor_set_layout(
        &self,
        id: DescriptorSetLayoutId,
    ) -> Result<(), ResourceError> {
        lock(&self.internal.set_layouts)
            .remove(&id)
            .map(|_| ())
            .ok_or(ResourceError::NotFound)
    }

    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPoolId,
        layout: DescriptorSetLayoutId,
        bindings: &[DescriptorBinding],
    ) -> Result<DescriptorSetId, ResourceError> {
        let mut pools = lock(&self.internal.descriptor_pools);
        let entry = pools.get_mut(&pool).ok_or(ResourceError::NotFound)?;

        // --- 1. Pool capacity ---
        if entry.sets.len() as u32 >= entry.descriptor.max_sets {
            return Err(ResourceError::Exhausted(format!(
                "descriptor pool {pool:?} holds {} sets already",
                entry.descriptor.max_sets
            )));
        }
        let consumed: Vec<DescriptorType> = bindings
            .iter()
            .map(|binding| binding.resource.descriptor_type())
            .collect();
        for ty in &consumed {
            let wanted = consumed.iter().filter(|other| *other == ty).count() as u32;
            if entry.used(*ty) + wanted > entry.descriptor.capacity_of(*ty) {
                return Err(ResourceError::Exhausted(format!(
                    "descriptor pool {pool:?} has no {ty:?} descriptors left"
                )));
            }
        }

        // --- 2. Resolve the bound resources ---
        let wgpu_layout = lock(&self.internal.set_layouts)
            .get(&layout)
            .cloned()
            .ok_or(ResourceError::NotFound)?;
        enum Bound {
            Buffer(Arc<wgpu::Buffer>, u64, u64),
            View(Arc<wgpu::TextureView>),
            Sampler(Arc<wgpu::Sampler>),
        }
        let bound = bindings
            .iter()
            .map(|binding| {
                let resource = match binding.resource {
                    DescriptorResource::UniformBuffer {
                        buffer,
                        offset,
                        size,
                    } => Bound::Buffer(
                        self.get_wgpu_buffer(buffer).ok_or(ResourceError::NotFound)?,
                        offset,
                        size,
                    ),
                    DescriptorResource::TextureView(view) => Bound::View(
                        self.get_wgpu_texture_view(view)
                            .ok_or(ResourceError::NotFound)?,
                    ),
                    DescriptorResource::Sampler(sampler) => Bound::Sampler(
                        lock(&self.internal.samplers)
                            .get(&sampler)
                            .cloned()
                            .ok_or(ResourceError::NotFound)?,
                    ),
                };
                Ok((binding.binding, resource))
            })
            .collect::<Result<Vec<_>, ResourceError>>()?;
        let entries: Vec<wgpu::BindGroupEntry> = bound
            .iter()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: match resource {
                    Bound::Buffer(buffer, offset, size) => {
                        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                            buffer: buffer.as_ref(),
                            offset: *offset,
                            size: NonZeroU64::new(*size),
                        })
                    }
                    Bound::View(view) => wgpu::BindingResource::TextureView(view.as_ref()),
                    Bound::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler.as_ref()),
                },
            })
            .collect();

        // --- 3. Create the bind group ---
        let bind_group = self
            .wgpu_device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: entry.descriptor.label.as_deref(),
                layout: wgpu_layout.as_ref(),
                entries: &entries,
            });
        let id = DescriptorSetId(self.next_id());
        entry.sets.insert(id, consumed);
        lock(&self.internal.bind_groups).insert(id, Arc::new(bind_group));
        Ok(id)
    }

    fn free_descriptor_set(
        &self,
        pool: DescriptorPoolId,
        set: DescriptorSetId,
    ) -> Result<(), ResourceError> {
        let mut pools = lock(&self.internal.descriptor_pools);
        let entry = pools.get_mut(&pool).ok_or(ResourceError::NotFound)?;
        entry.sets.remove(&set).ok_or(ResourceError::InvalidHandle)?;
        lock(&self.internal.bind_groups).remove(&set);
        Ok(())
    }

    // --- Commands ---

    fn create_command_pool(
        &self,
        descriptor: &CommandPoolDescriptor,
    ) -> Result<CommandPoolId, ResourceError> {
        let id = CommandPoolId(self.next_id());
        lock(&self.internal.command_pools).insert(id, Vec::new());
        log::debug!(
            "WgpuDevice: Created command pool {:?} ({:?})",
            id,
            descriptor.label
        );
        Ok(id)
    }

    fn allocate_command_buffer(
        &self,
        pool: CommandPoolId,
    ) -> Result<CommandBufferId, ResourceError> {
        let mut pools = lock(&self.internal.command_pools);
        let buffers = pools.get_mut(&pool).ok_or(ResourceError::NotFound)?;
        let id = CommandBufferId(
            self.internal
                .command_buffer_id_counter
                .fetch_add(1, Ordering::SeqCst),
        );
        buffers.push(id);
        Ok(id)
    }

    fn reset_command_pool(&self, pool: CommandPoolId) -> Result<(), ResourceError> {
        let pools = lock(&self.internal.command_pools);
        let buffers = pools.get(&pool).ok_or(ResourceError::NotFound)?;
        let mut finished = lock(&self.internal.finished);
        for buffer in buffers {
            finished.remove(buffer);
        }
        Ok(())
    }

    fn destroy_command_pool(&self, pool: CommandPoolId) -> Result<(), ResourceError> {
        let buffers = lock(&self.internal.command_pools)
            .remove(&pool)
            .ok_or(ResourceError::NotFound)?;
        let mut finished = lock(&self.internal.finished);
        for buffer in buffers {
            finished.remove(&buffer);
        }
        Ok(())
    }

    fn begin_command_buffer(
        &self,
        command_buffer: CommandBufferId,
        usage: CommandBufferUsage,
    ) -> Result<Box<dyn CommandRecorder>, RenderError> {
        let known = lock(&self.internal.command_pools)
            .values()
            .any(|buffers| buffers.contains(&command_buffer));
        if !known {
            return Err(RenderError::ResourceError(ResourceError::NotFound));
        }
        // wgpu command buffers are single-use; a reusable buffer is simply
        // re-recorded before each submission.
        lock(&self.internal.finished).remove(&command_buffer);
        let label = format!("Command Buffer {} ({usage:?})", command_buffer.0);
        let encoder = self
            .wgpu_device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&label),
            });
        Ok(Box::new(WgpuCommandRecorder::new(
            self.clone(),
            command_buffer,
            encoder,
        )))
    }

    fn submit(&self, info: &SubmitInfo) -> Result<SubmissionId, RenderError> {
        if let Some((swap_chain, index)) = info.wait_image {
            let acquired = lock(&self.internal.swap_chains)
                .get(&swap_chain)
                .is_some_and(|chain| chain.acquired.contains_key(&index));
            if !acquired {
                return Err(RenderError::RenderingFailed(format!(
                    "swap-chain image {index} of {swap_chain:?} is not acquired"
                )));
            }
        }
        let command_buffer = lock(&self.internal.finished)
            .remove(&info.command_buffer)
            .ok_or_else(|| {
                RenderError::RenderingFailed(format!(
                    "command buffer {:?} was not finished",
                    info.command_buffer
                ))
            })?;

        let index = self.internal.context.queue.submit(Some(command_buffer));
        let id = SubmissionId(
            self.internal
                .submission_counter
                .fetch_add(1, Ordering::SeqCst)
                + 1,
        );
        let mut submissions = lock(&self.internal.submissions);
        if submissions.len() == TRACKED_SUBMISSIONS {
            submissions.pop_front();
        }
        submissions.push_back((id, index));
        Ok(id)
    }

    fn wait_for_submission(&self, submission: SubmissionId) -> Result<(), RenderError> {
        let index = {
            let submissions = lock(&self.internal.submissions);
            match submissions.iter().find(|(id, _)| *id == submission) {
                Some((_, index)) => index.clone(),
                None => match submissions.front() {
                    Some((oldest, index)) if submission < *oldest => index.clone(),
                    _ => {
                        return Err(RenderError::Internal(format!(
                            "unknown submission {submission:?}"
                        )))
                    }
                },
            }
        };
        self.poll(Some(index))
    }

    fn wait_idle(&self) -> Result<(), RenderError> {
        self.poll(None)
    }

    // --- Swap chain ---

    fn create_swap_chain(
        &self,
        descriptor: &SwapChainDescriptor,
    ) -> Result<(SwapChainId, SwapChainInfo), RenderError> {
        let mut chains = lock(&self.internal.swap_chains);
        if !chains.is_empty() {
            return Err(RenderError::InitializationFailed(
                "the surface already has a swap chain".to_string(),
            ));
        }
        let (image_count, info) = self.swap_chain_info(descriptor)?;
        let id = SwapChainId(self.next_id());
        chains.insert(
            id,
            WgpuSwapChainEntry {
                image_count,
                next_index: 0,
                acquired: HashMap::new(),
            },
        );
        Ok((id, info))
    }

    fn recreate_swap_chain(
        &self,
        id: SwapChainId,
        descriptor: &SwapChainDescriptor,
    ) -> Result<SwapChainInfo, RenderError> {
        let mut chains = lock(&self.internal.swap_chains);
        let chain = chains
            .get_mut(&id)
            .ok_or(RenderError::ResourceError(ResourceError::NotFound))?;
        self.release_acquired(chain);
        let (image_count, info) = self.swap_chain_info(descriptor)?;
        chain.image_count = image_count;
        chain.next_index = 0;
        Ok(info)
    }

    fn acquire_next_image(&self, id: SwapChainId) -> Result<AcquiredImage, SurfaceError> {
        let mut chains = lock(&self.internal.swap_chains);
        let chain = chains
            .get_mut(&id)
            .ok_or_else(|| SurfaceError::Other(format!("unknown swap chain {id:?}")))?;

        // The surface hands out one texture at a time; an image nobody
        // presented or released would block every later acquisition.
        if !chain.acquired.is_empty() {
            log::warn!(
                "WgpuDevice: discarding {} unpresented swap chain image(s)",
                chain.acquired.len()
            );
            self.release_acquired(chain);
        }

        let texture = self
            .internal
            .context
            .get_current_texture()
            .ok_or_else(|| SurfaceError::Other("the device has no surface".to_string()))?
            .map_err(Self::surface_error)?;
        let view = texture.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Swap Chain Image View"),
            ..Default::default()
        });
        let view_id = TextureViewId(self.next_id());
        lock(&self.internal.texture_views).insert(view_id, Arc::new(view));

        let index = chain.next_index;
        chain.next_index = (chain.next_index + 1) % chain.image_count.max(1);
        let suboptimal = texture.suboptimal;
        if let Some(stale) = chain.acquired.insert(
            index,
            AcquiredSurfaceImage {
                texture,
                view: view_id,
                suboptimal,
            },
        ) {
            lock(&self.internal.texture_views).remove(&stale.view);
        }
        Ok(AcquiredImage {
            index,
            view: view_id,
            suboptimal,
        })
    }

    fn present(&self, id: SwapChainId, image_index: u32) -> Result<PresentStatus, SurfaceError> {
        let image = lock(&self.internal.swap_chains)
            .get_mut(&id)
            .ok_or_else(|| SurfaceError::Other(format!("unknown swap chain {id:?}")))?
            .acquired
            .remove(&image_index)
            .ok_or_else(|| SurfaceError::Other(format!("image {image_index} is not acquired")))?;
        lock(&self.internal.texture_views).remove(&image.view);
        image.texture.present();
        Ok(if image.suboptimal {
            PresentStatus::Suboptimal
        } else {
            PresentStatus::Optimal
        })
    }

    fn release_image(&self, id: SwapChainId, image_index: u32) -> Result<(), SurfaceError> {
        let image = lock(&self.internal.swap_chains)
            .get_mut(&id)
            .ok_or_else(|| SurfaceError::Other(format!("unknown swap chain {id:?}")))?
            .acquired
            .remove(&image_index)
            .ok_or_else(|| SurfaceError::Other(format!("image {image_index} is not acquired")))?;
        lock(&self.internal.texture_views).remove(&image.view);
        // Dropping an unpresented surface texture discards it.
        drop(image);
        log::debug!("WgpuDevice: released swap chain image {image_index} without presenting");
        Ok(())
    }

    fn destroy_swap_chain(&self, id: SwapChainId) -> Result<(), RenderError> {
        let mut chains = lock(&self.internal.swap_chains);
        let mut chain = chains
            .remove(&id)
            .ok_or(RenderError::ResourceError(ResourceError::NotFound))?;
        self.release_acquired(&mut chain);
        Ok(())
    }
}

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

//! Shared fixtures: a headless window, a WGSL program generator and a
//! triangle renderable, all backed by the recording device.

#![allow(dead_code)]

use lumen_core::math::Vec3;
use lumen_core::platform::RenderWindow;
use lumen_core::renderer::api::{
    BufferDescriptor, BufferUsage, Extent2D, PrimitiveTopology, ShaderModuleDescriptor,
    ShaderSource, VertexAttribute, VertexBufferLayout, VertexFormat, VertexStepMode,
};
use lumen_core::renderer::testing::{RecordingDevice, RecordingSelector};
use lumen_core::renderer::GraphicsDevice;
use lumen_render::instance::{GeometryBinding, LoadState, MaterialLayer, Renderable};
use lumen_render::program::{
    ProgramError, ProgramGenerator, ProgramRequest, ProgramSource, ShaderStageSource,
};
use lumen_render::{Renderer, RendererConfig};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A window without a windowing system.
pub struct HeadlessWindow {
    extent: Mutex<Extent2D>,
}

impl HeadlessWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            extent: Mutex::new(Extent2D::new(width, height)),
        }
    }

    pub fn resize(&self, width: u32, height: u32) {
        *self.extent.lock().unwrap() = Extent2D::new(width, height);
    }
}

impl RenderWindow for HeadlessWindow {
    fn framebuffer_extent(&self) -> Extent2D {
        *self.extent.lock().unwrap()
    }

    fn id(&self) -> u64 {
        1
    }
}

/// Emits one WGSL module per request and counts the requests.
#[derive(Default)]
pub struct CountingGenerator {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl ProgramGenerator for CountingGenerator {
    fn generate(&self, request: &ProgramRequest<'_>) -> Result<ProgramSource, ProgramError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProgramError::Generation("generator disabled".to_string()));
        }
        let text = format!(
            "// {} layer {} {:?} {:?}\n@vertex fn vs_main() {{}}\n@fragment fn fs_main() {{}}",
            request.renderable.name(),
            request.layer_index,
            request.pass,
            request.push_layout
        );
        let module = ShaderModuleDescriptor {
            label: Some(Cow::Owned(format!("{} Program", request.layer.name))),
            source: ShaderSource::Wgsl(Cow::Owned(text)),
        };
        Ok(ProgramSource {
            vertex: ShaderStageSource {
                module: module.clone(),
                entry_point: Cow::Borrowed("vs_main"),
            },
            fragment: Some(ShaderStageSource {
                module,
                entry_point: Cow::Borrowed("fs_main"),
            }),
        })
    }
}

/// Three positions, one or more material layers.
pub struct TestRenderable {
    pub name: String,
    pub state: Mutex<LoadState>,
    pub geometry: GeometryBinding,
    pub layers: Vec<MaterialLayer>,
}

impl TestRenderable {
    pub fn triangle(device: &dyn GraphicsDevice, layers: usize) -> Arc<Self> {
        let vertex_buffer = device
            .create_buffer(&BufferDescriptor {
                label: Some(Cow::Borrowed("Triangle Vertices")),
                size: 36,
                usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
            })
            .unwrap();
        Arc::new(Self {
            name: "triangle".to_string(),
            state: Mutex::new(LoadState::Loaded),
            geometry: GeometryBinding {
                vertex_buffer,
                vertex_layout: VertexBufferLayout {
                    array_stride: 12,
                    step_mode: VertexStepMode::Vertex,
                    attributes: vec![VertexAttribute {
                        format: VertexFormat::Float32x3,
                        offset: 0,
                        shader_location: 0,
                    }],
                },
                vertex_count: 3,
                index: None,
                topology: PrimitiveTopology::TriangleList,
            },
            layers: (0..layers)
                .map(|index| MaterialLayer::opaque(format!("layer{index}")))
                .collect(),
        })
    }

    pub fn set_state(&self, state: LoadState) {
        *self.state.lock().unwrap() = state;
    }
}

impl Renderable for TestRenderable {
    fn name(&self) -> &str {
        &self.name
    }

    fn load_state(&self) -> LoadState {
        *self.state.lock().unwrap()
    }

    fn geometry(&self) -> &GeometryBinding {
        &self.geometry
    }

    fn layers(&self) -> &[MaterialLayer] {
        &self.layers
    }
}

/// Everything a test needs around one renderer.
pub struct Harness {
    pub device: Arc<RecordingDevice>,
    pub window: Arc<HeadlessWindow>,
    pub generator: Arc<CountingGenerator>,
    pub renderer: Renderer,
}

impl Harness {
    /// An uninitialized renderer on a fresh recording device.
    pub fn uninitialized(config: RendererConfig) -> Self {
        let device = Arc::new(RecordingDevice::new());
        let window = Arc::new(HeadlessWindow::new(800, 600));
        let generator = Arc::new(CountingGenerator::default());
        let renderer = Renderer::new(
            config,
            Arc::new(RecordingSelector::new(device.clone())),
            window.clone(),
            generator.clone(),
        );
        Self {
            device,
            window,
            generator,
            renderer,
        }
    }

    /// An initialized renderer with default settings.
    pub fn new() -> Self {
        Self::with_config(RendererConfig::default())
    }

    pub fn with_config(config: RendererConfig) -> Self {
        let mut harness = Self::uninitialized(config);
        harness.renderer.initialize().unwrap();
        harness
    }

    /// Points the main target's camera at the origin.
    pub fn look_at_origin(&self) {
        let main = self.renderer.main_render_target().unwrap();
        main.update_view(|view| {
            assert!(view.look_at(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)));
            view.set_perspective(std::f32::consts::FRAC_PI_4, 4.0 / 3.0, 0.1, 100.0);
        });
    }
}

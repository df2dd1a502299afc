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

// Lumen Sandbox
// Draws a spinning quad through the renderer, the wgpu backend and winit.

use std::borrow::Cow;
use std::f32::consts::TAU;
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Result};
use lumen_core::math::{CartesianFrame, Vec3, FRAC_PI_4};
use lumen_core::renderer::{
    BufferDescriptor, BufferUsage, CommandRecorder, CullMode, GraphicsDevice, IndexFormat,
    PrimitiveTopology, ShaderModuleDescriptor, ShaderSource, VertexAttribute, VertexBufferLayout,
    VertexFormat, VertexStepMode,
};
use lumen_infra::{WgpuDeviceSelector, WinitWindow, WinitWindowBuilder};
use lumen_render::instance::{
    GeometryBinding, IndexBinding, LoadState, MaterialLayer, MatrixPushLayout, Renderable,
};
use lumen_render::program::{ProgramError, ProgramRequest, ProgramSource, ShaderStageSource};
use lumen_render::{
    init_logging, ActiveScene, Config, Engine, EngineReport, InstanceFlags, InstanceScene,
    LoggingConfig, ProgramGenerator, RenderTarget, RenderTargetId, Renderer, RendererError, Scene,
    ShutdownSignal, UniqueInstance,
};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

/// Radians per second.
const SPIN_SPEED: f32 = 1.2;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 3],
    color: [f32; 3],
}

impl Vertex {
    fn buffer_layout() -> VertexBufferLayout {
        VertexBufferLayout {
            array_stride: mem::size_of::<Vertex>() as u64,
            step_mode: VertexStepMode::Vertex,
            attributes: vec![
                // @location(0) in shader: position
                VertexAttribute {
                    format: VertexFormat::Float32x3,
                    offset: 0,
                    shader_location: 0,
                },
                // @location(1) in shader: color
                VertexAttribute {
                    format: VertexFormat::Float32x3,
                    offset: mem::size_of::<[f32; 3]>() as u64,
                    shader_location: 1,
                },
            ],
        }
    }
}

const VERTICES: &[Vertex] = &[
    Vertex {
        position: [-0.5, -0.5, 0.0],
        color: [1.0, 0.2, 0.2],
    },
    Vertex {
        position: [0.5, -0.5, 0.0],
        color: [0.2, 1.0, 0.2],
    },
    Vertex {
        position: [0.5, 0.5, 0.0],
        color: [0.2, 0.2, 1.0],
    },
    Vertex {
        position: [-0.5, 0.5, 0.0],
        color: [1.0, 1.0, 0.2],
    },
];

const INDICES: &[u16] = &[0, 1, 2, 0, 2, 3];

const UNLIT_WGSL: &str = r#"
struct Matrices {
    mvp: mat4x4<f32>,
    model: mat4x4<f32>,
}

var<push_constant> matrices: Matrices;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec3<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) color: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = matrices.mvp * vec4<f32>(position, 1.0);
    out.color = color;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(in.color, 1.0);
}
"#;

/// Serves the one unlit program the sandbox needs.
struct UnlitGenerator;

impl ProgramGenerator for UnlitGenerator {
    fn generate(&self, request: &ProgramRequest<'_>) -> Result<ProgramSource, ProgramError> {
        if request.push_layout != MatrixPushLayout::ModelViewProjection
            || request.instance_layout.is_some()
        {
            return Err(ProgramError::Generation(format!(
                "layer '{}' needs {:?}, only single instances are supported",
                request.layer.name, request.push_layout
            )));
        }

        let module = ShaderModuleDescriptor {
            label: Some("Sandbox Unlit Shader".into()),
            source: ShaderSource::Wgsl(Cow::Borrowed(UNLIT_WGSL)),
        };
        Ok(ProgramSource {
            vertex: ShaderStageSource {
                module: module.clone(),
                entry_point: "vs_main".into(),
            },
            fragment: Some(ShaderStageSource {
                module,
                entry_point: "fs_main".into(),
            }),
        })
    }
}

/// The quad geometry, uploaded once at startup.
struct QuadMesh {
    geometry: GeometryBinding,
    layers: Vec<MaterialLayer>,
}

impl QuadMesh {
    fn upload(device: &dyn GraphicsDevice) -> Result<Self> {
        // --- Step 1: Vertex buffer ---
        let vertex_bytes: &[u8] = bytemuck::cast_slice(VERTICES);
        let vertex_buffer = device.create_buffer(&BufferDescriptor {
            label: Some("Sandbox Quad Vertices".into()),
            size: vertex_bytes.len() as u64,
            usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
        })?;
        device.write_buffer(vertex_buffer, 0, vertex_bytes)?;

        // --- Step 2: Index buffer ---
        let index_bytes: &[u8] = bytemuck::cast_slice(INDICES);
        let index_buffer = device.create_buffer(&BufferDescriptor {
            label: Some("Sandbox Quad Indices".into()),
            size: index_bytes.len() as u64,
            usage: BufferUsage::INDEX | BufferUsage::COPY_DST,
        })?;
        device.write_buffer(index_buffer, 0, index_bytes)?;
        log::info!(" -> Quad buffers uploaded: {vertex_buffer:?}, {index_buffer:?}");

        // Both faces show while the quad turns.
        let mut layer = MaterialLayer::opaque("unlit");
        layer.cull_mode = CullMode::None;

        Ok(Self {
            geometry: GeometryBinding {
                vertex_buffer,
                vertex_layout: Vertex::buffer_layout(),
                vertex_count: VERTICES.len() as u32,
                index: Some(IndexBinding {
                    buffer: index_buffer,
                    format: IndexFormat::Uint16,
                    count: INDICES.len() as u32,
                }),
                topology: PrimitiveTopology::TriangleList,
            },
            layers: vec![layer],
        })
    }
}

impl Renderable for QuadMesh {
    fn name(&self) -> &str {
        "Sandbox Quad"
    }

    fn load_state(&self) -> LoadState {
        LoadState::Loaded
    }

    fn geometry(&self) -> &GeometryBinding {
        &self.geometry
    }

    fn layers(&self) -> &[MaterialLayer] {
        &self.layers
    }
}

/// An [`InstanceScene`] whose only instance turns around the Y axis.
struct SpinningScene {
    instances: InstanceScene,
    quad: Arc<UniqueInstance>,
    angle: Mutex<f32>,
}

impl SpinningScene {
    fn new(mesh: Arc<dyn Renderable>) -> Self {
        let quad = Arc::new(UniqueInstance::unique(
            mesh,
            CartesianFrame::default(),
            InstanceFlags::NONE,
        ));
        let instances = InstanceScene::new("Sandbox");
        instances.add(quad.clone());
        Self {
            instances,
            quad,
            angle: Mutex::new(0.0),
        }
    }
}

impl Scene for SpinningScene {
    fn name(&self) -> &str {
        self.instances.name()
    }

    fn update_logic(&self, step: Duration) {
        let mut angle = self.angle.lock().unwrap_or_else(PoisonError::into_inner);
        *angle = (*angle + SPIN_SPEED * step.as_secs_f32()) % TAU;

        let mut frame = self.quad.frame();
        let forward = Vec3::new(angle.sin(), 0.0, -angle.cos());
        if frame.set_orientation(forward, Vec3::Y) {
            self.quad.set_frame(frame);
        }
    }

    fn update_video_memory(&self, renderer: &Renderer) -> usize {
        self.instances.update_video_memory(renderer)
    }

    fn render(
        &self,
        renderer: &Renderer,
        target: &RenderTarget,
        recorder: &mut dyn CommandRecorder,
    ) -> usize {
        self.instances.render(renderer, target, recorder)
    }

    fn cast_shadows(
        &self,
        renderer: &Renderer,
        target: &RenderTarget,
        recorder: &mut dyn CommandRecorder,
    ) -> usize {
        self.instances.cast_shadows(renderer, target, recorder)
    }

    fn on_render_target_destroyed(&self, target: RenderTargetId) {
        self.instances.on_render_target_destroyed(target);
    }

    fn destroy(&self, renderer: &Renderer) -> usize {
        self.instances.destroy(renderer)
    }
}

/// Sets the camera of `target` for its current extent.
fn update_camera(target: &RenderTarget) {
    let aspect = target.extent().aspect_ratio();
    target.update_view(|view| {
        view.look_at(Vec3::new(0.0, 0.4, 2.0), Vec3::ZERO, Vec3::Y);
        view.set_perspective(FRAC_PI_4, aspect, 0.1, 100.0);
    });
}

/// State living on the windowing thread while the engine runs on its own.
struct Running {
    window: WinitWindow,
    main_target: Arc<RenderTarget>,
    shutdown: ShutdownSignal,
    engine: JoinHandle<Result<EngineReport, RendererError>>,
}

struct SandboxApp {
    config: Config,
    running: Option<Running>,
}

impl SandboxApp {
    fn new(config: Config) -> Self {
        Self {
            config,
            running: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        log::info!("Sandbox: starting...");

        // --- Step 1: Window and renderer ---
        let window = WinitWindowBuilder::new()
            .with_title("Lumen Sandbox")
            .with_min_dimensions(320, 240)
            .build(event_loop)?;
        let mut renderer = Renderer::new(
            self.config.renderer.clone(),
            Arc::new(WgpuDeviceSelector::new(window.handle())),
            Arc::new(window.clone()),
            Arc::new(UnlitGenerator),
        );
        renderer.initialize()?;

        // --- Step 2: Scene ---
        let device = renderer
            .device()
            .cloned()
            .ok_or_else(|| anyhow!("renderer initialized without a device"))?;
        let mesh = QuadMesh::upload(device.as_ref())?;
        let scene = Arc::new(ActiveScene::new());
        scene.switch(Arc::new(SpinningScene::new(Arc::new(mesh))));

        let main_target = renderer
            .main_render_target()
            .cloned()
            .ok_or_else(|| anyhow!("renderer initialized without a main render target"))?;
        update_camera(&main_target);

        // --- Step 3: Engine thread ---
        let shutdown = renderer.shutdown_signal();
        let mut engine = Engine::new(self.config.engine.clone(), renderer, scene);
        let engine = thread::Builder::new()
            .name("lumen-render".into())
            .spawn(move || engine.run())?;

        self.running = Some(Running {
            window,
            main_target,
            shutdown,
            engine,
        });
        Ok(())
    }

    fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.shutdown.request();
        match running.engine.join() {
            Ok(Ok(report)) => log::info!(
                "Sandbox: {} frames rendered, {} skipped, {} logic ticks",
                report.frames_rendered,
                report.frames_skipped,
                report.logic_ticks
            ),
            Ok(Err(e)) => log::error!("Sandbox: engine stopped with an error: {e}"),
            Err(_) => log::error!("Sandbox: engine thread panicked"),
        }
    }
}

impl ApplicationHandler for SandboxApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        if let Err(e) = self.start(event_loop) {
            log::error!("Sandbox: failed to start: {e:#}");
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Sandbox: close requested.");
                self.stop();
                event_loop.exit();
            }
            // The swap chain follows on its own once presentation reports
            // it out of date; only the projection needs the new aspect.
            WindowEvent::Resized(_) => {
                if let Some(running) = &self.running {
                    update_camera(&running.main_target);
                    running.window.window().request_redraw();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let finished = self
            .running
            .as_ref()
            .is_some_and(|running| running.engine.is_finished());
        if finished {
            self.stop();
            event_loop.exit();
        }
    }
}

fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    init_logging(LoggingConfig::from(&config.logging));

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);
    event_loop.run_app(&mut SandboxApp::new(config))?;
    Ok(())
}

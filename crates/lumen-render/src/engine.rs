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

//! The two-thread engine loop.
//!
//! A scoped logic thread advances the active scene at a fixed rate while the
//! calling thread renders it. Both stop on the renderer's shutdown signal.

use crate::config::EngineConfig;
use crate::renderer::{FrameOutcome, Renderer, RendererError, RendererEvent};
use crate::scene::{ActiveScene, Overlay, Scene, ShutdownSignal};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Counters of one [`Engine::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineReport {
    /// Frames presented.
    pub frames_rendered: u64,
    /// Frames dropped.
    pub frames_skipped: u64,
    /// Logic updates performed.
    pub logic_ticks: u64,
    /// Objects that failed to be released at shutdown.
    pub termination_errors: usize,
}

/// Owns the renderer and drives it together with the active scene.
pub struct Engine {
    config: EngineConfig,
    renderer: Renderer,
    scene: Arc<ActiveScene>,
    overlay: Option<Box<dyn Overlay>>,
    frame_limit: Option<u64>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("renderer", &self.renderer)
            .field("overlay", &self.overlay.is_some())
            .field("frame_limit", &self.frame_limit)
            .finish()
    }
}

impl Engine {
    /// Creates an engine around a renderer, initialized or not.
    pub fn new(config: EngineConfig, renderer: Renderer, scene: Arc<ActiveScene>) -> Self {
        Self {
            config,
            renderer,
            scene,
            overlay: None,
            frame_limit: None,
        }
    }

    /// Draws `overlay` on top of every main frame.
    pub fn with_overlay(mut self, overlay: Box<dyn Overlay>) -> Self {
        self.overlay = Some(overlay);
        self
    }

    /// Stops after `frames` render iterations, rendered or not.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// The renderer, for registering targets before or during a run.
    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// The scene slot shared with the logic thread.
    pub fn active_scene(&self) -> &Arc<ActiveScene> {
        &self.scene
    }

    /// Runs until shutdown is requested or the frame limit is reached, then
    /// terminates the renderer.
    ///
    /// ## Errors
    /// Renderer initialization failure. Nothing is spawned in that case.
    pub fn run(&mut self) -> Result<EngineReport, RendererError> {
        let events = self.renderer.subscribe();
        if !self.renderer.is_initialized() {
            self.renderer.initialize()?;
        }
        let shutdown = self.renderer.shutdown_signal();
        let logic_step = Duration::from_secs_f64(1.0 / self.config.logic_rate_hz.max(1.0));
        let frame_budget = self
            .config
            .max_frame_rate
            .filter(|rate| *rate > 0.0)
            .map(|rate| Duration::from_secs_f64(1.0 / rate));
        log::info!(
            "Engine: starting (logic step {:?}, frame budget {:?})",
            logic_step,
            frame_budget
        );

        let mut report = EngineReport::default();
        let scene = self.scene.as_ref();
        let renderer = &self.renderer;
        let overlay = self.overlay.as_deref();
        let frame_limit = self.frame_limit;

        let logic_ticks = thread::scope(|scope| {
            let logic_shutdown = shutdown.clone();
            let logic = thread::Builder::new()
                .name("lumen-logic".to_string())
                .spawn_scoped(scope, move || run_logic(scene, &logic_shutdown, logic_step));
            let logic = match logic {
                Ok(handle) => Some(handle),
                Err(e) => {
                    log::error!("Engine: failed to spawn the logic thread: {e}");
                    renderer.request_shutdown(format!("logic thread spawn failed: {e}"));
                    None
                }
            };

            let mut iterations = 0u64;
            while !shutdown.is_requested() {
                if frame_limit.is_some_and(|limit| iterations >= limit) {
                    shutdown.request();
                    break;
                }
                let started = Instant::now();

                // --- 1. Renderer Events ---
                if drain_events(&events, scene) {
                    break;
                }

                // --- 2. Render the Active Scene ---
                let outcome = scene
                    .with_scene(|active| render_once(renderer, active, overlay))
                    .unwrap_or(FrameOutcome::Skipped);
                match outcome {
                    FrameOutcome::Rendered { .. } => report.frames_rendered += 1,
                    FrameOutcome::Skipped | FrameOutcome::Disabled => report.frames_skipped += 1,
                    FrameOutcome::ShutdownRequested => break,
                }
                iterations += 1;

                // --- 3. Frame Cap ---
                if let Some(budget) = frame_budget {
                    if let Some(rest) = budget.checked_sub(started.elapsed()) {
                        thread::sleep(rest);
                    }
                }
            }
            shutdown.request();

            match logic.map(|handle| handle.join()) {
                Some(Ok(ticks)) => ticks,
                Some(Err(_)) => {
                    log::error!("Engine: the logic thread panicked");
                    0
                }
                None => 0,
            }
        });

        report.logic_ticks = logic_ticks;

        // --- Teardown ---
        let scene_errors = self
            .scene
            .with_scene(|active| active.destroy(&self.renderer))
            .unwrap_or(0);
        if scene_errors > 0 {
            log::error!("Engine: {scene_errors} scene object(s) failed to release");
        }
        report.termination_errors = scene_errors + self.renderer.terminate();
        // Targets destroyed by the teardown still reach the scene.
        drain_events(&events, self.scene.as_ref());
        log::info!(
            "Engine: stopped after {} frame(s), {} skipped, {} logic tick(s)",
            report.frames_rendered,
            report.frames_skipped,
            report.logic_ticks
        );
        Ok(report)
    }
}

fn run_logic(scene: &ActiveScene, shutdown: &ShutdownSignal, step: Duration) -> u64 {
    log::debug!("Engine: logic thread started.");
    let mut ticks = 0;
    while !shutdown.is_requested() {
        let started = Instant::now();
        scene.with_scene(|active| active.update_logic(step));
        ticks += 1;
        if let Some(rest) = step.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }
    log::debug!("Engine: logic thread stopped after {ticks} tick(s).");
    ticks
}

fn render_once(renderer: &Renderer, scene: &dyn Scene, overlay: Option<&dyn Overlay>) -> FrameOutcome {
    let shadow_maps = renderer.render_shadow_maps(scene);
    let textures = renderer.render_render_to_textures(scene);
    if shadow_maps + textures > 0 {
        log::trace!("Engine: {shadow_maps} shadow map(s), {textures} texture target(s) submitted");
    }
    renderer.render_frame(scene, overlay)
}

/// Forwards pending renderer events. Returns `true` once shutdown was requested.
fn drain_events(events: &flume::Receiver<RendererEvent>, scene: &ActiveScene) -> bool {
    let mut stop = false;
    for event in events.try_iter() {
        match event {
            RendererEvent::RenderTargetDestroyed(id) => {
                scene.with_scene(|active| active.on_render_target_destroyed(id));
            }
            RendererEvent::SwapChainRecreated { generation, extent } => log::debug!(
                "Engine: swap chain generation {generation} ({}x{})",
                extent.width,
                extent.height
            ),
            RendererEvent::RenderTargetRegistered(id) => {
                log::trace!("Engine: render target {id:?} registered")
            }
            RendererEvent::ShutdownRequested { reason } => {
                log::warn!("Engine: shutdown requested: {reason}");
                stop = true;
            }
        }
    }
    stop
}

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

//! The contract between the renderer and whatever owns the drawables.

use crate::instance::{Drawable, Readiness};
use crate::render_target::{RenderTarget, RenderTargetId};
use crate::renderer::Renderer;
use lumen_core::renderer::CommandRecorder;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;

/// Something the renderer draws every frame.
///
/// Both the logic and the render thread use the scene concurrently through
/// `&self`.
pub trait Scene: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Advances the simulation by one fixed step. Runs on the logic thread.
    fn update_logic(&self, _step: Duration) {}

    /// Brings device data up to date before any pass is recorded.
    ///
    /// ## Returns
    /// The number of instances that uploaded something.
    fn update_video_memory(&self, renderer: &Renderer) -> usize;

    /// Records the color pass of `target`.
    ///
    /// ## Returns
    /// The number of draw calls recorded.
    fn render(
        &self,
        renderer: &Renderer,
        target: &RenderTarget,
        recorder: &mut dyn CommandRecorder,
    ) -> usize;

    /// Records the shadow map pass of `target`.
    fn cast_shadows(
        &self,
        renderer: &Renderer,
        target: &RenderTarget,
        recorder: &mut dyn CommandRecorder,
    ) -> usize;

    /// Called once a render target is gone, so per-target state can be dropped.
    fn on_render_target_destroyed(&self, _target: RenderTargetId) {}

    /// Releases the scene's device objects while the renderer is still alive.
    ///
    /// ## Returns
    /// The number of objects that failed to release.
    fn destroy(&self, _renderer: &Renderer) -> usize {
        0
    }
}

/// Drawn after the scene inside the same pass of the main target.
pub trait Overlay: Send + Sync {
    /// Records the overlay. Returns the number of draw calls.
    fn render(
        &self,
        renderer: &Renderer,
        target: &RenderTarget,
        recorder: &mut dyn CommandRecorder,
    ) -> usize;
}

/// A flat list of drawables, rendered in insertion order.
///
/// Broken drawables are released and dropped at the next video memory update.
#[derive(Default)]
pub struct InstanceScene {
    name: String,
    instances: RwLock<Vec<Arc<dyn Drawable>>>,
}

impl std::fmt::Debug for InstanceScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceScene")
            .field("name", &self.name)
            .field("instances", &self.len())
            .finish()
    }
}

impl InstanceScene {
    /// An empty scene.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instances: RwLock::new(Vec::new()),
        }
    }

    /// Appends a drawable.
    pub fn add(&self, instance: Arc<dyn Drawable>) {
        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(instance);
    }

    /// Removes a drawable. Its device objects are left to the caller.
    pub fn remove(&self, instance: &Arc<dyn Drawable>) -> bool {
        let mut instances = self.instances.write().unwrap_or_else(PoisonError::into_inner);
        let before = instances.len();
        instances.retain(|candidate| !Arc::ptr_eq(candidate, instance));
        instances.len() != before
    }

    /// Number of drawables.
    pub fn len(&self) -> usize {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the scene is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Releases and drops every broken drawable.
    ///
    /// ## Returns
    /// The number of drawables pruned.
    pub fn prune_broken(&self, renderer: &Renderer) -> usize {
        let broken: Vec<_> = {
            let mut instances = self.instances.write().unwrap_or_else(PoisonError::into_inner);
            let (broken, healthy): (Vec<_>, Vec<_>) = instances
                .drain(..)
                .partition(|instance| instance.is_broken());
            *instances = healthy;
            broken
        };
        for instance in &broken {
            log::warn!(
                "InstanceScene: pruning broken instance '{}' from '{}'",
                instance.name(),
                self.name
            );
            instance.destroy(renderer);
        }
        broken.len()
    }

    /// Releases the device objects of every drawable.
    pub fn destroy(&self, renderer: &Renderer) -> usize {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|instance| instance.destroy(renderer))
            .sum()
    }

    fn snapshot(&self) -> Vec<Arc<dyn Drawable>> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Scene for InstanceScene {
    fn name(&self) -> &str {
        &self.name
    }

    fn update_video_memory(&self, renderer: &Renderer) -> usize {
        self.prune_broken(renderer);
        self.snapshot()
            .iter()
            .filter(|instance| match instance.update_video_memory(renderer) {
                Ok(uploaded) => uploaded,
                Err(e) => {
                    log::warn!(
                        "InstanceScene: video memory update of '{}' failed: {e}",
                        instance.name()
                    );
                    false
                }
            })
            .count()
    }

    fn render(
        &self,
        renderer: &Renderer,
        target: &RenderTarget,
        recorder: &mut dyn CommandRecorder,
    ) -> usize {
        let mut draws = 0;
        for instance in self.snapshot() {
            if instance.get_ready_for_render(renderer, target) == Readiness::Ready {
                draws += instance.render(target, recorder);
            }
        }
        draws
    }

    fn cast_shadows(
        &self,
        renderer: &Renderer,
        target: &RenderTarget,
        recorder: &mut dyn CommandRecorder,
    ) -> usize {
        let mut draws = 0;
        for instance in self.snapshot() {
            if instance.get_ready_for_shadow_casting(renderer, target) == Readiness::Ready {
                draws += instance.cast_shadows(target, recorder);
            }
        }
        draws
    }

    fn on_render_target_destroyed(&self, target: RenderTargetId) {
        for instance in self.snapshot() {
            instance.destroy_programs(target);
        }
    }

    fn destroy(&self, renderer: &Renderer) -> usize {
        InstanceScene::destroy(self, renderer)
    }
}

/// The scene shared by the logic and render threads.
///
/// Both threads hold the read lock while they use the scene; switching
/// takes the write lock, so no thread ever sees a scene mid-swap.
#[derive(Default)]
pub struct ActiveScene {
    scene: RwLock<Option<Arc<dyn Scene>>>,
}

impl std::fmt::Debug for ActiveScene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.read();
        f.debug_struct("ActiveScene")
            .field("scene", &guard.as_ref().map(|scene| scene.name().to_string()))
            .finish()
    }
}

impl ActiveScene {
    /// No scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read access for the duration of the guard.
    pub fn read(&self) -> RwLockReadGuard<'_, Option<Arc<dyn Scene>>> {
        self.scene.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` on the active scene while holding the read lock.
    pub fn with_scene<R>(&self, f: impl FnOnce(&dyn Scene) -> R) -> Option<R> {
        self.read().as_deref().map(f)
    }

    /// Replaces the active scene.
    ///
    /// ## Returns
    /// The previous scene.
    pub fn switch(&self, scene: Arc<dyn Scene>) -> Option<Arc<dyn Scene>> {
        let mut current = self.scene.write().unwrap_or_else(PoisonError::into_inner);
        log::info!("ActiveScene: switching to '{}'", scene.name());
        current.replace(scene)
    }

    /// Removes the active scene.
    pub fn clear(&self) -> Option<Arc<dyn Scene>> {
        self.scene
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// A one-way stop request shared between the renderer and the engine loops.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// A signal nobody requested yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every loop to stop.
    pub fn request(&self) {
        if !self.requested.swap(true, Ordering::AcqRel) {
            log::info!("ShutdownSignal: shutdown requested");
        }
    }

    /// Whether a stop was requested.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_signal_is_shared_between_clones() {
        let signal = ShutdownSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_requested());
        signal.request();
        assert!(clone.is_requested());
    }

    #[test]
    fn switching_scenes_returns_the_previous_one() {
        let active = ActiveScene::new();
        assert!(active.with_scene(|scene| scene.name().to_string()).is_none());
        assert!(active.switch(Arc::new(InstanceScene::new("first"))).is_none());
        let previous = active.switch(Arc::new(InstanceScene::new("second"))).unwrap();
        assert_eq!(previous.name(), "first");
        assert_eq!(
            active.with_scene(|scene| scene.name().to_string()).as_deref(),
            Some("second")
        );
        assert!(active.clear().is_some());
    }
}

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

use super::push::MatrixPushLayout;
use crate::cache::GraphicsPipeline;
use crate::program::PassKind;
use crate::render_target::{RenderTargetId, TargetSignature};
use ahash::AHashMap;
use lumen_core::renderer::api::DescriptorSetId;
use std::sync::Arc;

/// Lifecycle of the programs of one (target, pass) pair.
///
/// `NotReady -> Generating -> Ready | Broken`. A signature change of the
/// target sends a `Ready` entry back to `NotReady`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramState {
    /// Nothing generated for the current target signature.
    NotReady,
    /// Generation in progress.
    Generating,
    /// Every layer has a pipeline.
    Ready,
    /// Generation failed.
    Broken,
}

/// What drawing one material layer needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerProgram {
    /// The compiled pipeline.
    pub pipeline: Arc<GraphicsPipeline>,
    /// Push constant block the vertex stage expects.
    pub push_layout: MatrixPushLayout,
    /// Material set bound at index 1.
    pub material_set: Option<DescriptorSetId>,
}

#[derive(Debug)]
struct TargetPrograms {
    signature: TargetSignature,
    state: ProgramState,
    layers: Arc<[LayerProgram]>,
}

/// Programs of one instance, keyed by render target and pass.
#[derive(Debug, Default)]
pub struct ProgramsCache {
    entries: AHashMap<(RenderTargetId, PassKind), TargetPrograms>,
}

impl ProgramsCache {
    /// State of the programs for `signature`. Entries built for an older
    /// signature report [`ProgramState::NotReady`].
    pub fn state(&self, signature: &TargetSignature, pass: PassKind) -> ProgramState {
        match self.entries.get(&(signature.id, pass)) {
            Some(entry) if entry.signature == *signature => entry.state,
            _ => ProgramState::NotReady,
        }
    }

    /// The layer programs, if they are ready for `signature`.
    pub fn ready_layers(
        &self,
        signature: &TargetSignature,
        pass: PassKind,
    ) -> Option<Arc<[LayerProgram]>> {
        self.entries
            .get(&(signature.id, pass))
            .filter(|entry| entry.signature == *signature && entry.state == ProgramState::Ready)
            .map(|entry| entry.layers.clone())
    }

    fn set(
        &mut self,
        signature: TargetSignature,
        pass: PassKind,
        state: ProgramState,
        layers: Arc<[LayerProgram]>,
    ) {
        self.entries.insert(
            (signature.id, pass),
            TargetPrograms {
                signature,
                state,
                layers,
            },
        );
    }

    /// Marks generation as started, dropping stale programs.
    pub fn begin(&mut self, signature: TargetSignature, pass: PassKind) {
        self.set(signature, pass, ProgramState::Generating, Arc::from(Vec::new()));
    }

    /// Stores the generated programs.
    pub fn complete(
        &mut self,
        signature: TargetSignature,
        pass: PassKind,
        layers: Vec<LayerProgram>,
    ) {
        self.set(signature, pass, ProgramState::Ready, Arc::from(layers));
    }

    /// Records a failed generation.
    pub fn fail(&mut self, signature: TargetSignature, pass: PassKind) {
        self.set(signature, pass, ProgramState::Broken, Arc::from(Vec::new()));
    }

    /// Whether any target has ready programs for `pass`.
    pub fn any_ready(&self, pass: PassKind) -> bool {
        self.entries
            .iter()
            .any(|((_, entry_pass), entry)| *entry_pass == pass && entry.state == ProgramState::Ready)
    }

    /// Forgets every program built for `target`.
    ///
    /// ## Returns
    /// The number of entries removed.
    pub fn remove_target(&mut self, target: RenderTargetId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(id, _), _| *id != target);
        before - self.entries.len()
    }

    /// Forgets every program.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of (target, pass) entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry exists.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::renderer::api::{PipelineLayoutId, RenderPassId, RenderPipelineId};
    use crate::cache::PipelineSignature;

    fn signature(generation: u64) -> TargetSignature {
        TargetSignature {
            id: RenderTargetId(7),
            generation,
            render_pass: RenderPassId(1),
        }
    }

    fn layer() -> LayerProgram {
        LayerProgram {
            pipeline: Arc::new(GraphicsPipeline {
                id: RenderPipelineId(3),
                signature: PipelineSignature(42),
                layout: PipelineLayoutId(2),
                render_pass: RenderPassId(1),
            }),
            push_layout: MatrixPushLayout::ModelViewProjection,
            material_set: None,
        }
    }

    #[test]
    fn signature_change_invalidates_ready_programs() {
        let mut cache = ProgramsCache::default();
        assert_eq!(cache.state(&signature(0), PassKind::Render), ProgramState::NotReady);
        cache.begin(signature(0), PassKind::Render);
        assert_eq!(cache.state(&signature(0), PassKind::Render), ProgramState::Generating);
        cache.complete(signature(0), PassKind::Render, vec![layer()]);
        assert_eq!(cache.ready_layers(&signature(0), PassKind::Render).unwrap().len(), 1);
        assert!(cache.any_ready(PassKind::Render));
        assert!(!cache.any_ready(PassKind::ShadowCasting));

        assert_eq!(cache.state(&signature(1), PassKind::Render), ProgramState::NotReady);
        assert!(cache.ready_layers(&signature(1), PassKind::Render).is_none());
    }

    #[test]
    fn removing_a_target_drops_both_passes() {
        let mut cache = ProgramsCache::default();
        cache.complete(signature(0), PassKind::Render, vec![layer()]);
        cache.fail(signature(0), PassKind::ShadowCasting);
        assert_eq!(cache.state(&signature(0), PassKind::ShadowCasting), ProgramState::Broken);
        assert_eq!(cache.remove_target(RenderTargetId(7)), 2);
        assert!(cache.is_empty());
    }
}

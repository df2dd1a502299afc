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

//! Integration tests for renderable instances: readiness, program caching,
//! instance batches and the draw calls they record.

mod common;

use common::{Harness, TestRenderable};
use lumen_core::math::{CartesianFrame, Mat4, Vec3};
use lumen_core::renderer::testing::RecordedCommand;
use lumen_render::instance::{InstanceDataLayout, InstanceError, LoadState};
use lumen_render::render_target::RenderTargetDescriptor;
use lumen_render::{
    Drawable, FrameOutcome, InstanceFlags, InstanceScene, MultipleInstance, Readiness, Scene,
    UniqueInstance,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn last_frame(harness: &Harness) -> Vec<RecordedCommand> {
    harness.device.submitted().last().cloned().unwrap_or_default()
}

fn draw_instance_counts(commands: &[RecordedCommand]) -> Vec<u32> {
    commands
        .iter()
        .filter_map(RecordedCommand::instance_count)
        .collect()
}

fn push_payloads(commands: &[RecordedCommand]) -> Vec<Vec<u8>> {
    commands
        .iter()
        .filter_map(|command| match command {
            RecordedCommand::PushConstants { data, .. } => Some(data.clone()),
            _ => None,
        })
        .collect()
}

fn decode_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Readiness
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_get_ready_is_idempotent() {
    let harness = Harness::new();
    let renderable = TestRenderable::triangle(harness.device.as_ref(), 2);
    let instance = UniqueInstance::unique(renderable, CartesianFrame::default(), InstanceFlags::default());
    let main = harness.renderer.main_render_target().unwrap();

    assert_eq!(instance.get_ready_for_render(&harness.renderer, main), Readiness::Ready);
    assert!(instance.is_ready_to_render(main));
    assert!(instance.flags().contains(InstanceFlags::READY_TO_RENDER));
    let generated = harness.generator.calls.load(Ordering::SeqCst);
    let pipelines = harness.device.counters().pipelines_created;
    assert_eq!(generated, 2);
    assert_eq!(pipelines, 2);

    assert_eq!(instance.get_ready_for_render(&harness.renderer, main), Readiness::Ready);
    assert_eq!(harness.generator.calls.load(Ordering::SeqCst), generated);
    assert_eq!(harness.device.counters().pipelines_created, pipelines);
}

#[test]
fn test_identical_instances_share_pipelines() {
    let harness = Harness::new();
    let renderable = TestRenderable::triangle(harness.device.as_ref(), 1);
    let main = harness.renderer.main_render_target().unwrap();
    let first = UniqueInstance::unique(renderable.clone(), CartesianFrame::default(), InstanceFlags::default());
    let second = UniqueInstance::unique(
        renderable,
        CartesianFrame::at(Vec3::new(3.0, 0.0, 0.0)),
        InstanceFlags::default(),
    );
    assert_eq!(first.get_ready_for_render(&harness.renderer, main), Readiness::Ready);
    assert_eq!(second.get_ready_for_render(&harness.renderer, main), Readiness::Ready);
    assert_eq!(harness.device.counters().pipelines_created, 1);
    assert_eq!(harness.renderer.pipeline_cache_stats().hits, 1);
}

#[test]
fn test_swap_chain_recreation_rebuilds_programs_from_the_cache() {
    let harness = Harness::new();
    let renderable = TestRenderable::triangle(harness.device.as_ref(), 1);
    let instance = UniqueInstance::unique(renderable, CartesianFrame::default(), InstanceFlags::default());
    let main = harness.renderer.main_render_target().unwrap().clone();
    assert_eq!(instance.get_ready_for_render(&harness.renderer, &main), Readiness::Ready);

    harness.window.resize(1280, 720);
    harness.renderer.recreate_swap_chain().unwrap();
    assert!(!instance.is_ready_to_render(&main));

    assert_eq!(instance.get_ready_for_render(&harness.renderer, &main), Readiness::Ready);
    assert_eq!(harness.generator.calls.load(Ordering::SeqCst), 2);
    assert_eq!(harness.device.counters().pipelines_created, 1);
}

#[test]
fn test_loading_renderable_is_pending_until_loaded() {
    let harness = Harness::new();
    let renderable = TestRenderable::triangle(harness.device.as_ref(), 1);
    renderable.set_state(LoadState::Loading);
    let instance = UniqueInstance::unique(renderable.clone(), CartesianFrame::default(), InstanceFlags::default());
    let main = harness.renderer.main_render_target().unwrap();

    assert_eq!(instance.get_ready_for_render(&harness.renderer, main), Readiness::Pending);
    assert_eq!(harness.generator.calls.load(Ordering::SeqCst), 0);

    renderable.set_state(LoadState::Loaded);
    assert_eq!(instance.get_ready_for_render(&harness.renderer, main), Readiness::Ready);
}

#[test]
fn test_failed_load_breaks_the_instance() {
    let harness = Harness::new();
    let renderable = TestRenderable::triangle(harness.device.as_ref(), 1);
    renderable.set_state(LoadState::Failed);
    let instance = UniqueInstance::unique(renderable, CartesianFrame::default(), InstanceFlags::default());
    let main = harness.renderer.main_render_target().unwrap();

    assert_eq!(instance.get_ready_for_render(&harness.renderer, main), Readiness::Broken);
    assert!(instance.is_broken());
    assert!(instance.broken_reason().unwrap().contains("failed to load"));
}

#[test]
fn test_hidden_and_non_casting_instances_are_disabled() {
    let harness = Harness::new();
    let renderable = TestRenderable::triangle(harness.device.as_ref(), 1);
    let main = harness.renderer.main_render_target().unwrap();
    let shadow_map = harness
        .renderer
        .register_render_target(RenderTargetDescriptor::shadow_map("sun", 512))
        .unwrap();

    let hidden = UniqueInstance::unique(renderable.clone(), CartesianFrame::default(), InstanceFlags::HIDDEN);
    assert_eq!(hidden.get_ready_for_render(&harness.renderer, main), Readiness::Disabled);

    let plain = UniqueInstance::unique(renderable.clone(), CartesianFrame::default(), InstanceFlags::default());
    assert_eq!(
        plain.get_ready_for_shadow_casting(&harness.renderer, &shadow_map),
        Readiness::Disabled
    );

    let caster = UniqueInstance::unique(renderable, CartesianFrame::default(), InstanceFlags::CASTS_SHADOWS);
    assert_eq!(
        caster.get_ready_for_shadow_casting(&harness.renderer, &shadow_map),
        Readiness::Ready
    );
    assert!(caster.is_ready_to_cast_shadows(&shadow_map));
    assert!(!caster.is_ready_to_render(main));
    assert!(harness.generator.calls.load(Ordering::SeqCst) >= 1);
}

#[test]
fn test_changing_an_option_drops_programs() {
    let harness = Harness::new();
    let renderable = TestRenderable::triangle(harness.device.as_ref(), 1);
    let instance = UniqueInstance::unique(renderable, CartesianFrame::default(), InstanceFlags::default());
    let main = harness.renderer.main_render_target().unwrap();
    assert_eq!(instance.get_ready_for_render(&harness.renderer, main), Readiness::Ready);

    instance.set_option(InstanceFlags::DISABLE_BACK_FACE_CULLING, true);
    assert!(!instance.is_ready_to_render(main));
    assert!(!instance.flags().contains(InstanceFlags::READY_TO_RENDER));

    assert_eq!(instance.get_ready_for_render(&harness.renderer, main), Readiness::Ready);
    assert_eq!(harness.device.counters().pipelines_created, 2);

    // Setting the same value again keeps the programs.
    instance.set_option(InstanceFlags::DISABLE_BACK_FACE_CULLING, true);
    assert!(instance.is_ready_to_render(main));
}

#[test]
fn test_destroyed_target_drops_its_programs() {
    let harness = Harness::new();
    let renderable = TestRenderable::triangle(harness.device.as_ref(), 1);
    let scene = InstanceScene::new("targets");
    let instance = Arc::new(UniqueInstance::unique(
        renderable,
        CartesianFrame::default(),
        InstanceFlags::default(),
    ));
    scene.add(instance.clone());
    let target = harness
        .renderer
        .register_render_target(RenderTargetDescriptor::texture(
            "mirror",
            lumen_core::renderer::api::Extent2D::new(256, 256),
            lumen_core::renderer::api::TextureFormat::Rgba8UnormSrgb,
        ))
        .unwrap();
    assert_eq!(instance.get_ready_for_render(&harness.renderer, &target), Readiness::Ready);

    assert_eq!(harness.renderer.unregister_render_target(target.id()), Some(0));
    scene.on_render_target_destroyed(target.id());
    assert!(!instance.is_ready_to_render(&target));
    assert_eq!(instance.destroy_programs(target.id()), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Broken instances
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_program_failure_breaks_the_instance_and_it_draws_nothing() {
    let harness = Harness::new();
    harness.generator.fail.store(true, Ordering::SeqCst);
    let renderable = TestRenderable::triangle(harness.device.as_ref(), 1);
    let instance = Arc::new(UniqueInstance::unique(
        renderable,
        CartesianFrame::default(),
        InstanceFlags::default(),
    ));
    let main = harness.renderer.main_render_target().unwrap();

    assert_eq!(instance.get_ready_for_render(&harness.renderer, main), Readiness::Broken);
    assert!(instance.is_broken());
    // Broken stays broken, even once the generator recovers.
    harness.generator.fail.store(false, Ordering::SeqCst);
    assert_eq!(instance.get_ready_for_render(&harness.renderer, main), Readiness::Broken);

    let scene = InstanceScene::new("broken");
    scene.add(instance);
    assert!(matches!(
        harness.renderer.render_frame(&scene, None),
        FrameOutcome::Rendered { draws: 0, .. }
    ));
    assert!(draw_instance_counts(&last_frame(&harness)).is_empty());
    assert!(scene.is_empty());
}

#[test]
fn test_zero_capacity_batch_is_broken_from_construction() {
    let harness = Harness::new();
    let renderable = TestRenderable::triangle(harness.device.as_ref(), 1);
    let batch = MultipleInstance::multiple(
        renderable,
        0,
        InstanceDataLayout::ModelMatrices,
        InstanceFlags::default(),
    );
    assert!(batch.is_broken());
    let main = harness.renderer.main_render_target().unwrap();
    assert_eq!(batch.get_ready_for_render(&harness.renderer, main), Readiness::Broken);
    assert_eq!(harness.generator.calls.load(Ordering::SeqCst), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Instance batches
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_active_count_is_clamped_to_capacity() {
    let harness = Harness::new();
    let renderable = TestRenderable::triangle(harness.device.as_ref(), 1);
    let batch = MultipleInstance::multiple(
        renderable,
        10,
        InstanceDataLayout::ModelMatrices,
        InstanceFlags::default(),
    );
    assert_eq!(batch.active_instance_count(), 10);
    assert_eq!(batch.set_active_instance_count(25), 10);
    assert_eq!(batch.set_active_instance_count(4), 4);
    assert_eq!(batch.instance_count(), 4);
    assert!(matches!(
        batch.update_local_data(10, &CartesianFrame::default()),
        Err(InstanceError::IndexOutOfRange {
            index: 10,
            capacity: 10
        })
    ));
    assert!(matches!(
        batch.update_local_data_range(3, &[]),
        Err(InstanceError::EmptyRange)
    ));
}

#[test]
fn test_batch_draws_only_active_instances() {
    let harness = Harness::new();
    harness.look_at_origin();
    let renderable = TestRenderable::triangle(harness.device.as_ref(), 1);
    let batch = Arc::new(MultipleInstance::multiple(
        renderable,
        10,
        InstanceDataLayout::ModelMatrices,
        InstanceFlags::default(),
    ));
    assert_eq!(batch.set_active_instance_count(5), 5);
    let frames: Vec<_> = (0..5)
        .map(|i| CartesianFrame::at(Vec3::new(i as f32, 0.0, 0.0)))
        .collect();
    batch.update_local_data_range(0, &frames).unwrap();
    assert!(!batch.is_synchronized());

    let scene = InstanceScene::new("batch");
    scene.add(batch.clone());
    assert!(matches!(
        harness.renderer.render_frame(&scene, None),
        FrameOutcome::Rendered { draws: 1, .. }
    ));
    assert!(batch.is_synchronized());

    let commands = last_frame(&harness);
    assert_eq!(draw_instance_counts(&commands), vec![5]);
    let instance_buffer = batch.transform().device_buffer().unwrap();
    assert!(commands.contains(&RecordedCommand::SetVertexBuffer {
        slot: 1,
        buffer: instance_buffer,
    }));

    let floats = decode_floats(&harness.device.buffer_contents(instance_buffer).unwrap());
    let stride = InstanceDataLayout::ModelMatrices.floats_per_instance();
    for i in 0..5 {
        let translation = &floats[i * stride + 12..i * stride + 15];
        assert_eq!(translation, &[i as f32, 0.0, 0.0]);
    }

    // Unchanged data is not uploaded again.
    let writes = harness.device.counters().buffer_writes;
    assert_eq!(batch.update_video_memory(&harness.renderer).unwrap(), false);
    assert_eq!(harness.device.counters().buffer_writes, writes);
}

#[test]
fn test_concurrent_writers_are_all_uploaded() {
    let harness = Harness::new();
    let renderable = TestRenderable::triangle(harness.device.as_ref(), 1);
    let batch = MultipleInstance::multiple(
        renderable,
        64,
        InstanceDataLayout::ModelMatrices,
        InstanceFlags::default(),
    );

    std::thread::scope(|scope| {
        for worker in 0..4u32 {
            let batch = &batch;
            scope.spawn(move || {
                let start = worker * 16;
                let frames: Vec<_> = (start..start + 16)
                    .map(|i| CartesianFrame::at(Vec3::new(0.0, i as f32, 0.0)))
                    .collect();
                batch.update_local_data_range(start, &frames).unwrap();
            });
        }
    });

    assert!(batch.update_video_memory(&harness.renderer).unwrap());
    assert!(batch.is_synchronized());
    let buffer = batch.transform().device_buffer().unwrap();
    let floats = decode_floats(&harness.device.buffer_contents(buffer).unwrap());
    let stride = InstanceDataLayout::ModelMatrices.floats_per_instance();
    for i in 0..64 {
        assert_eq!(floats[i * stride + 13], i as f32, "instance {i}");
    }
}

#[test]
fn test_growing_the_active_count_requires_an_upload() {
    let harness = Harness::new();
    let renderable = TestRenderable::triangle(harness.device.as_ref(), 1);
    let batch = MultipleInstance::multiple(
        renderable,
        8,
        InstanceDataLayout::PositionScale,
        InstanceFlags::default(),
    );
    batch.set_active_instance_count(2);
    assert!(batch.update_video_memory(&harness.renderer).unwrap());
    assert!(batch.is_synchronized());

    batch.set_active_instance_count(1);
    assert!(batch.is_synchronized());
    batch.set_active_instance_count(6);
    assert!(!batch.is_synchronized());
}

// ─────────────────────────────────────────────────────────────────────────────
// Push constants
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_unique_instance_pushes_its_model_view_projection() {
    let harness = Harness::new();
    harness.look_at_origin();
    let renderable = TestRenderable::triangle(harness.device.as_ref(), 1);
    let frame = CartesianFrame::at(Vec3::new(1.0, 2.0, 3.0));
    let scene = InstanceScene::new("unique");
    scene.add(Arc::new(UniqueInstance::unique(
        renderable,
        frame,
        InstanceFlags::default(),
    )));
    harness.renderer.render_frame(&scene, None);

    let payloads = push_payloads(&last_frame(&harness));
    assert_eq!(payloads.len(), 1);
    let view = harness.renderer.main_render_target().unwrap().view_matrices();
    let model = frame.model_matrix();
    let mvp = view.view_projection() * model;
    assert_eq!(&payloads[0][..64], bytemuck::bytes_of(&mvp));
    assert_eq!(&payloads[0][64..], bytemuck::bytes_of(&model));
}

#[test]
fn test_facing_camera_batch_pushes_view_projection_and_view() {
    let harness = Harness::new();
    harness.look_at_origin();
    let renderable = TestRenderable::triangle(harness.device.as_ref(), 1);
    let scene = InstanceScene::new("sprites");
    scene.add(Arc::new(MultipleInstance::multiple(
        renderable,
        4,
        InstanceDataLayout::PositionScale,
        InstanceFlags::FACING_CAMERA,
    )));
    harness.renderer.render_frame(&scene, None);

    let commands = last_frame(&harness);
    assert_eq!(draw_instance_counts(&commands), vec![4]);
    let payloads = push_payloads(&commands);
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].len(), 128);
    let view = harness.renderer.main_render_target().unwrap().view_matrices();
    assert_eq!(&payloads[0][..64], bytemuck::bytes_of(&view.view_projection()));
    assert_eq!(&payloads[0][64..], bytemuck::bytes_of(&view.view()));
}

#[test]
fn test_extra_transformation_applies_to_the_whole_batch() {
    let harness = Harness::new();
    harness.look_at_origin();
    let renderable = TestRenderable::triangle(harness.device.as_ref(), 1);
    let batch = Arc::new(MultipleInstance::multiple(
        renderable,
        2,
        InstanceDataLayout::ModelMatrices,
        InstanceFlags::default(),
    ));
    let extra = Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0));
    batch.set_extra_transformation(Some(extra));
    assert!(batch.flags().contains(InstanceFlags::APPLY_TRANSFORMATION_MATRIX));

    let scene = InstanceScene::new("extra");
    scene.add(batch.clone());
    harness.renderer.render_frame(&scene, None);

    let payloads = push_payloads(&last_frame(&harness));
    let view = harness.renderer.main_render_target().unwrap().view_matrices();
    assert_eq!(payloads[0], bytemuck::bytes_of(&(view.view_projection() * extra)).to_vec());

    batch.set_extra_transformation(None);
    assert!(!batch.flags().contains(InstanceFlags::APPLY_TRANSFORMATION_MATRIX));
}

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

//! Integration tests for the Renderer lifecycle, its caches and the frame
//! loop, driven against the recording device.

mod common;

use common::{Harness, HeadlessWindow};
use lumen_core::renderer::api::{
    BlendMode, CullMode, Extent2D, PipelineLayoutDescriptor, PrimitiveTopology, ShaderEntry,
    ShaderModuleDescriptor, ShaderSource, TextureFormat,
};
use lumen_core::renderer::testing::{RecordedCommand, RecordingSelector};
use lumen_core::renderer::{GraphicsDevice, PipelineError, ResourceError, SurfaceError};
use lumen_render::cache::{AttachmentFormats, RenderPassFlags, SamplerFlags, SamplerKind};
use lumen_render::instance::{InstanceFlags, MaterialLayer};
use lumen_render::program::{PipelineState, Program};
use lumen_render::render_target::RenderTargetDescriptor;
use lumen_render::{
    FrameOutcome, InstanceScene, PassKind, Renderer, RendererConfig, RendererError, RendererEvent,
    RenderTargetKind, SwapChainStatus,
};
use std::borrow::Cow;
use std::sync::Arc;

fn empty_scene() -> InstanceScene {
    InstanceScene::new("empty")
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_initialize_creates_the_main_target() {
    let harness = Harness::new();
    let renderer = &harness.renderer;
    assert!(renderer.is_initialized());
    assert!(renderer.descriptor_pool().is_some());
    assert_eq!(renderer.swap_chain_status(), Some(SwapChainStatus::Ready));
    assert_eq!(renderer.swap_chain_generation(), Some(0));

    let main = renderer.main_render_target().unwrap();
    assert_eq!(main.kind(), RenderTargetKind::SwapChain);
    assert_eq!(main.extent(), Extent2D::new(800, 600));
    assert!(main.depth_view().is_some());
    assert!(renderer.services().is_initialized());

    let counters = harness.device.counters();
    assert_eq!(counters.swap_chains_created, 1);
    assert_eq!(counters.render_passes_created, 1);
}

#[test]
fn test_initialize_twice_is_rejected() {
    let mut harness = Harness::new();
    assert!(matches!(
        harness.renderer.initialize(),
        Err(RendererError::AlreadyInitialized)
    ));
    assert!(harness.renderer.is_initialized());
}

#[test]
fn test_device_selection_failure_is_fatal() {
    let mut renderer = Renderer::new(
        RendererConfig::default(),
        Arc::new(RecordingSelector::failing()),
        Arc::new(HeadlessWindow::new(640, 480)),
        Arc::new(common::CountingGenerator::default()),
    );
    assert!(matches!(
        renderer.initialize(),
        Err(RendererError::DeviceSelection(_))
    ));
    assert!(!renderer.is_initialized());
    assert!(renderer.main_render_target().is_none());
}

#[test]
fn test_minimized_window_aborts_initialization() {
    let config = RendererConfig {
        resize_poll_interval_ms: 1,
        resize_max_polls: 3,
        ..Default::default()
    };
    let mut harness = Harness::uninitialized(config);
    harness.window.resize(0, 0);
    let result = harness.renderer.initialize();
    assert!(matches!(
        result,
        Err(RendererError::EmptyFramebuffer { polls: 3 })
    ));
    assert!(!harness.renderer.is_initialized());
    assert_eq!(harness.device.counters().swap_chains_created, 0);
}

#[test]
fn test_terminate_releases_device_objects() {
    let mut harness = Harness::new();
    let scene = empty_scene();
    for _ in 0..3 {
        harness.renderer.render_frame(&scene, None);
    }
    assert_eq!(harness.renderer.terminate(), 0);
    assert!(!harness.renderer.is_initialized());
    assert_eq!(harness.device.live_pipelines(), 0);
    assert_eq!(harness.device.live_descriptor_sets(), 0);
    assert_eq!(harness.renderer.swap_chain_status(), None);
    // A second terminate has nothing left to do.
    assert_eq!(harness.renderer.terminate(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Caches
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_render_pass_cache_hands_out_shared_handles() {
    let harness = Harness::new();
    let formats = AttachmentFormats {
        color: None,
        depth_stencil: Some(TextureFormat::Depth32Float),
    };
    let flags = RenderPassFlags::CLEAR_DEPTH_STENCIL | RenderPassFlags::STORE_DEPTH;
    let first = harness.renderer.get_render_pass("shadow", flags, formats).unwrap();
    let second = harness.renderer.get_render_pass("shadow", flags, formats).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let other_format = AttachmentFormats {
        depth_stencil: Some(TextureFormat::Depth24PlusStencil8),
        ..formats
    };
    let third = harness
        .renderer
        .get_render_pass("shadow", flags, other_format)
        .unwrap();
    assert!(!Arc::ptr_eq(&first, &third));

    let stats = harness.renderer.render_pass_cache_stats();
    // The main pass plus the two shadow passes.
    assert_eq!(stats.creations, 3);
    assert_eq!(stats.hits, 1);
}

#[test]
fn test_sampler_cache_hands_out_shared_handles() {
    let harness = Harness::new();
    let first = harness
        .renderer
        .get_sampler(SamplerKind::Linear, SamplerFlags::CLAMP_TO_EDGE)
        .unwrap();
    let second = harness
        .renderer
        .get_sampler(SamplerKind::Linear, SamplerFlags::CLAMP_TO_EDGE)
        .unwrap();
    let shadow = harness
        .renderer
        .get_sampler(SamplerKind::Shadow, SamplerFlags::NONE)
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(!Arc::ptr_eq(&first, &shadow));
    assert_eq!(harness.device.counters().samplers_created, 2);
}

#[test]
fn test_caches_are_unavailable_before_initialization() {
    let harness = Harness::uninitialized(RendererConfig::default());
    assert!(harness
        .renderer
        .get_sampler(SamplerKind::Nearest, SamplerFlags::NONE)
        .is_none());
    assert!(harness
        .renderer
        .get_render_pass("main", RenderPassFlags::NONE, AttachmentFormats::default())
        .is_none());
}

fn test_program(harness: &Harness) -> Program {
    let device = harness.renderer.device().unwrap();
    let services = harness.renderer.services();
    let module = services
        .shader_modules
        .get_or_create(
            device.as_ref(),
            &ShaderModuleDescriptor {
                label: Some(Cow::Borrowed("Blend Test")),
                source: ShaderSource::Wgsl(Cow::Borrowed("@vertex fn vs_main() {}")),
            },
        )
        .unwrap();
    let layout = services
        .pipeline_layouts
        .pipeline_layout(
            device.as_ref(),
            &PipelineLayoutDescriptor {
                label: Some(Cow::Borrowed("Blend Test Layout")),
                set_layouts: vec![services.pipeline_layouts.view_set_layout().unwrap()],
                push_constant_ranges: Vec::new(),
            },
        )
        .unwrap();
    Program {
        vertex: ShaderEntry {
            module,
            entry_point: Cow::Borrowed("vs_main"),
        },
        fragment: None,
        layout,
        vertex_buffers: Vec::new(),
    }
}

#[test]
fn test_blending_into_a_depth_only_target_is_rejected() {
    let harness = Harness::new();
    let shadow_map = harness
        .renderer
        .register_render_target(RenderTargetDescriptor::shadow_map("sun", 512))
        .unwrap();
    let program = test_program(&harness);
    let layer = MaterialLayer {
        blend: BlendMode::AlphaBlend,
        ..MaterialLayer::opaque("glass")
    };
    let state = PipelineState::for_layer(
        InstanceFlags::default(),
        &layer,
        PrimitiveTopology::TriangleList,
        PassKind::Render,
    );
    let result = harness
        .renderer
        .finalize_graphics_pipeline(&shadow_map, &program, &state);
    assert!(matches!(
        result,
        Err(ResourceError::Pipeline(PipelineError::IncompatibleColorTarget(_)))
    ));
}

#[test]
fn test_pipelines_are_shared_by_structural_signature() {
    let harness = Harness::new();
    let main = harness.renderer.main_render_target().unwrap();
    let program = test_program(&harness);
    let state = PipelineState::for_layer(
        InstanceFlags::default(),
        &MaterialLayer::opaque("a"),
        PrimitiveTopology::TriangleList,
        PassKind::Render,
    );
    let first = harness
        .renderer
        .finalize_graphics_pipeline(main, &program, &state)
        .unwrap();
    let second = harness
        .renderer
        .finalize_graphics_pipeline(main, &program, &state)
        .unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let culled_front = PipelineState {
        cull_mode: CullMode::Front,
        ..state
    };
    let third = harness
        .renderer
        .finalize_graphics_pipeline(main, &program, &culled_front)
        .unwrap();
    assert_ne!(first.id, third.id);
    assert_eq!(harness.renderer.pipeline_cache_stats().creations, 2);
    assert_eq!(harness.device.counters().pipelines_created, 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Frames
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_frame_is_recorded_submitted_and_presented() {
    let harness = Harness::new();
    let outcome = harness.renderer.render_frame(&empty_scene(), None);
    assert!(matches!(outcome, FrameOutcome::Rendered { draws: 0, .. }));

    let counters = harness.device.counters();
    assert_eq!(counters.acquisitions, 1);
    assert_eq!(counters.submissions, 1);
    assert_eq!(counters.presents, 1);

    let submitted = harness.device.submitted();
    let commands = submitted.last().unwrap();
    match commands.first() {
        Some(RecordedCommand::BeginRenderPass { clear, color_view, .. }) => {
            assert!(color_view.is_some());
            assert_eq!(clear.color, [1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0, 1.0]);
            assert_eq!(clear.depth, 1.0);
        }
        other => panic!("expected a render pass, got {other:?}"),
    }
    assert_eq!(commands.last(), Some(&RecordedCommand::EndRenderPass));
    assert_eq!(harness.renderer.statistics().frame_count, 1);
}

#[test]
fn test_disabled_video_skips_everything() {
    let config = RendererConfig {
        video_enabled: false,
        ..Default::default()
    };
    let harness = Harness::with_config(config);
    assert_eq!(
        harness.renderer.render_frame(&empty_scene(), None),
        FrameOutcome::Disabled
    );
    assert_eq!(harness.device.counters().acquisitions, 0);
}

#[test]
fn test_failed_acquire_skips_the_frame_and_recreates_next_time() {
    let harness = Harness::new();
    let scene = empty_scene();
    harness.device.fail_next_acquire(SurfaceError::OutOfDate);

    assert_eq!(harness.renderer.render_frame(&scene, None), FrameOutcome::Skipped);
    assert_eq!(
        harness.renderer.swap_chain_status(),
        Some(SwapChainStatus::Degraded)
    );
    assert_eq!(harness.device.counters().submissions, 0);

    assert!(matches!(
        harness.renderer.render_frame(&scene, None),
        FrameOutcome::Rendered { .. }
    ));
    assert_eq!(
        harness.renderer.swap_chain_status(),
        Some(SwapChainStatus::Ready)
    );
    assert_eq!(harness.renderer.swap_chain_generation(), Some(1));

    let counters = harness.device.counters();
    assert_eq!(counters.swap_chains_recreated, 1);
    assert_eq!(counters.submissions, 1);
    let statistics = harness.renderer.statistics();
    assert_eq!(statistics.skipped_frames, 1);
    assert_eq!(statistics.swap_chain_recreations, 1);
}

#[test]
fn test_suboptimal_image_is_presented_before_recreation() {
    let harness = Harness::new();
    let scene = empty_scene();
    harness.device.suboptimal_next_acquires(1);

    assert!(matches!(
        harness.renderer.render_frame(&scene, None),
        FrameOutcome::Rendered { .. }
    ));
    assert_eq!(
        harness.renderer.swap_chain_status(),
        Some(SwapChainStatus::Degraded)
    );
    assert!(matches!(
        harness.renderer.render_frame(&scene, None),
        FrameOutcome::Rendered { .. }
    ));
    assert_eq!(harness.device.counters().swap_chains_recreated, 1);
    assert_eq!(harness.device.counters().presents, 2);
}

#[test]
fn test_recreation_failure_requests_shutdown() {
    let harness = Harness::new();
    let events = harness.renderer.subscribe();
    let scene = empty_scene();
    harness.device.fail_next_acquire(SurfaceError::Lost);
    harness.device.fail_recreations(1);

    assert_eq!(harness.renderer.render_frame(&scene, None), FrameOutcome::Skipped);
    assert_eq!(
        harness.renderer.render_frame(&scene, None),
        FrameOutcome::ShutdownRequested
    );
    assert!(harness.renderer.shutdown_signal().is_requested());
    assert!(events
        .try_iter()
        .any(|event| matches!(event, RendererEvent::ShutdownRequested { .. })));

    // Nothing was recorded against the degraded chain.
    assert_eq!(harness.device.counters().submissions, 0);
    assert_eq!(
        harness.renderer.render_frame(&scene, None),
        FrameOutcome::ShutdownRequested
    );
}

#[test]
fn test_resize_recreates_the_chain_before_the_next_frame() {
    let harness = Harness::new();
    let events = harness.renderer.subscribe();
    let main = harness.renderer.main_render_target().unwrap().clone();
    let generation_before = main.generation();

    harness.window.resize(1024, 768);
    harness.renderer.notify_framebuffer_resized();
    assert!(matches!(
        harness.renderer.render_frame(&empty_scene(), None),
        FrameOutcome::Rendered { .. }
    ));

    assert_eq!(main.extent(), Extent2D::new(1024, 768));
    assert_eq!(main.generation(), generation_before + 1);
    let recreated: Vec<_> = events
        .try_iter()
        .filter_map(|event| match event {
            RendererEvent::SwapChainRecreated { generation, extent } => Some((generation, extent)),
            _ => None,
        })
        .collect();
    assert_eq!(recreated, vec![(1, Extent2D::new(1024, 768))]);
}

#[test]
fn test_failed_recording_skips_the_frame_and_releases_the_image() {
    let harness = Harness::new();
    let scene = empty_scene();
    harness.device.fail_next_finish(1);

    assert_eq!(harness.renderer.render_frame(&scene, None), FrameOutcome::Skipped);
    assert_eq!(harness.renderer.statistics().skipped_frames, 1);
    let counters = harness.device.counters();
    assert_eq!(counters.releases, 1);
    assert_eq!(counters.submissions, 0);
    assert_eq!(
        harness.renderer.swap_chain_status(),
        Some(SwapChainStatus::Ready)
    );

    assert!(matches!(
        harness.renderer.render_frame(&scene, None),
        FrameOutcome::Rendered { .. }
    ));
    assert_eq!(harness.renderer.statistics().skipped_frames, 1);
    assert_eq!(harness.device.counters().presents, 1);
}

#[test]
fn test_failed_submission_skips_the_frame_and_releases_the_image() {
    let harness = Harness::new();
    let scene = empty_scene();
    harness.device.fail_next_submit(1);

    assert_eq!(harness.renderer.render_frame(&scene, None), FrameOutcome::Skipped);
    assert_eq!(harness.renderer.statistics().skipped_frames, 1);
    assert_eq!(harness.device.counters().releases, 1);
    assert_eq!(harness.device.counters().presents, 0);

    assert!(matches!(
        harness.renderer.render_frame(&scene, None),
        FrameOutcome::Rendered { .. }
    ));
    let counters = harness.device.counters();
    assert_eq!(counters.acquisitions, 2);
    assert_eq!(counters.submissions, 1);
    assert_eq!(counters.presents, 1);
}

#[test]
fn test_clear_values_can_change_between_frames() {
    let harness = Harness::new();
    let scene = empty_scene();
    harness.renderer.set_clear_color([0.0, 0.5, 1.0, 1.0]);
    harness.renderer.set_clear_depth_stencil(0.0, 3);
    assert!(matches!(
        harness.renderer.render_frame(&scene, None),
        FrameOutcome::Rendered { .. }
    ));

    let submitted = harness.device.submitted();
    match submitted.last().and_then(|commands| commands.first()) {
        Some(RecordedCommand::BeginRenderPass { clear, .. }) => {
            assert_eq!(clear.color, [0.0, 0.5, 1.0, 1.0]);
            assert_eq!(clear.depth, 0.0);
            assert_eq!(clear.stencil, 3);
        }
        other => panic!("expected a render pass, got {other:?}"),
    }
    assert_eq!(harness.renderer.clear_values().stencil, 3);
}

// ─────────────────────────────────────────────────────────────────────────────
// Off-screen targets
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_shadow_maps_are_submitted_and_signal_completion() {
    let harness = Harness::new();
    let events = harness.renderer.subscribe();
    let target = harness
        .renderer
        .register_render_target(RenderTargetDescriptor::shadow_map("sun", 1024))
        .unwrap();
    assert!(target.color_view().is_none());
    assert!(target.depth_view().is_some());
    assert_eq!(
        harness.renderer.render_targets(RenderTargetKind::ShadowMap).len(),
        1
    );

    let scene = empty_scene();
    assert_eq!(harness.renderer.render_shadow_maps(&scene), 1);
    assert_eq!(harness.renderer.render_render_to_textures(&scene), 0);
    assert!(target.completion().last().is_some());

    // The command buffer is allocated once per target.
    let buffer = harness.renderer.get_command_buffer(&target).unwrap();
    assert_eq!(harness.renderer.get_command_buffer(&target).unwrap(), buffer);

    assert_eq!(harness.renderer.unregister_render_target(target.id()), Some(0));
    assert_eq!(harness.renderer.unregister_render_target(target.id()), None);
    let destroyed: Vec<_> = events
        .try_iter()
        .filter(|event| matches!(event, RendererEvent::RenderTargetDestroyed(_)))
        .collect();
    assert_eq!(destroyed, vec![RendererEvent::RenderTargetDestroyed(target.id())]);
}

#[test]
fn test_unregister_reports_objects_that_failed_to_release() {
    let harness = Harness::new();
    let target = harness
        .renderer
        .register_render_target(RenderTargetDescriptor::shadow_map("sun", 512))
        .unwrap();
    harness
        .device
        .destroy_texture_view(target.depth_view().unwrap())
        .unwrap();
    assert_eq!(harness.renderer.unregister_render_target(target.id()), Some(1));
}

#[test]
fn test_shadow_maps_respect_the_configuration_switch() {
    let config = RendererConfig {
        shadow_maps_enabled: false,
        ..Default::default()
    };
    let harness = Harness::with_config(config);
    harness
        .renderer
        .register_render_target(RenderTargetDescriptor::shadow_map("sun", 256))
        .unwrap();
    assert_eq!(harness.renderer.render_shadow_maps(&empty_scene()), 0);
    assert_eq!(harness.device.counters().submissions, 0);
}

#[test]
fn test_swap_chain_targets_cannot_be_registered() {
    let harness = Harness::new();
    let descriptor = RenderTargetDescriptor {
        kind: RenderTargetKind::SwapChain,
        ..RenderTargetDescriptor::texture(
            "fake",
            Extent2D::new(64, 64),
            TextureFormat::Rgba8UnormSrgb,
        )
    };
    assert!(harness.renderer.register_render_target(descriptor).is_err());
}

use criterion::{criterion_group, criterion_main, Criterion};
use lumen_core::math::{CartesianFrame, Vec3};
use lumen_core::renderer::api::TextureFormat;
use lumen_core::renderer::testing::RecordingDevice;
use lumen_render::cache::{
    AttachmentFormats, RenderPassCache, RenderPassFlags, RenderPassKey, SamplerCache, SamplerFlags,
    SamplerKind,
};
use lumen_render::instance::InstanceDataLayout;
use std::hint::black_box;

fn bench_caches(c: &mut Criterion) {
    let device = RecordingDevice::new();
    let passes = RenderPassCache::new();
    let samplers = SamplerCache::new();
    let key = RenderPassKey {
        id: "main".to_string(),
        flags: RenderPassFlags::CLEAR_COLOR | RenderPassFlags::CLEAR_DEPTH_STENCIL,
        formats: AttachmentFormats {
            color: Some(TextureFormat::Bgra8UnormSrgb),
            depth_stencil: Some(TextureFormat::Depth32Float),
        },
    };
    passes.get_or_create(&device, key.clone()).unwrap();
    samplers
        .get_or_create(&device, SamplerKind::Linear, SamplerFlags::NONE)
        .unwrap();

    let mut group = c.benchmark_group("Resource Caches");

    group.bench_function("Render pass hit", |b| {
        b.iter(|| black_box(passes.get_or_create(&device, black_box(key.clone())).unwrap()));
    });

    group.bench_function("Sampler hit", |b| {
        b.iter(|| {
            black_box(
                samplers
                    .get_or_create(&device, SamplerKind::Linear, SamplerFlags::NONE)
                    .unwrap(),
            )
        });
    });

    group.finish();
}

fn bench_instance_encoding(c: &mut Criterion) {
    let frames: Vec<_> = (0..1_000)
        .map(|i| CartesianFrame::at(Vec3::new(i as f32, 0.0, 0.0)))
        .collect();

    let mut group = c.benchmark_group("Instance Data");

    for layout in [InstanceDataLayout::ModelMatrices, InstanceDataLayout::PositionScale] {
        group.bench_function(format!("Encode 1000 frames ({layout:?})"), |b| {
            b.iter(|| {
                let mut records = Vec::with_capacity(frames.len() * layout.floats_per_instance());
                for frame in &frames {
                    records.extend(layout.encode(black_box(frame)));
                }
                black_box(records)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_caches, bench_instance_encoding);
criterion_main!(benches);

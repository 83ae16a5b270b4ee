//! # Instance Pipeline Benchmark
//!
//! Load batches of map-object placements and run whole headless frames
//! over them: sync, CPU reference culling and readback.

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::{Mat4, Vec3};
use verdant_rendering::gpu::{HeadlessBackend, HeadlessBuffer};
use verdant_rendering::pipeline::{HeadlessRecorder, SequentialGraph};
use verdant_rendering::testing::TestAssets;
use verdant_rendering::{CullingView, InstanceRenderer, ModelKind, Placement, RendererConfig};

fn assets() -> TestAssets {
    let mut assets = TestAssets::new();
    assets.add_map_object("world/rock", 1, 2);
    assets.add_map_object("world/house", 3, 4);
    assets
}

/// Grid of placements around the origin, half of them behind the camera.
fn load(backend: &mut HeadlessBackend, assets: &TestAssets, count: u32) -> InstanceRenderer<HeadlessBuffer> {
    let mut renderer =
        InstanceRenderer::new(backend, RendererConfig::default(), ModelKind::MapObject).unwrap();
    let side = (count as f32).sqrt().ceil() as u32;
    for i in 0..count {
        let x = (i % side) as f32 * 4.0 - side as f32 * 2.0;
        let z = (i / side) as f32 * 4.0 - side as f32 * 2.0;
        let model = if i % 3 == 0 { "world/house" } else { "world/rock" };
        renderer.register_placement(Placement::new(i, model, Vec3::new(x, 0.0, z), Vec3::new(0.0, i as f32, 0.0)));
    }
    renderer.execute_load(&assets.source);
    renderer
}

fn view() -> CullingView {
    let proj = Mat4::perspective_infinite_reverse_rh(70f32.to_radians(), 16.0 / 9.0, 0.1);
    let look = Mat4::look_at_rh(Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, 0.0, -20.0), Vec3::Y);
    CullingView::new(proj * look, Vec3::new(0.0, 5.0, 0.0))
}

fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("instance_load");
    let assets = assets();

    for count in [1_000u32, 10_000] {
        group.bench_with_input(BenchmarkId::new("execute_load", count), &count, |b, &count| {
            b.iter(|| {
                let mut backend = HeadlessBackend::new();
                let renderer = load(&mut backend, &assets, count);
                black_box(renderer.registry().instance_count())
            });
        });
    }

    group.finish();
}

fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("instance_frame");
    let assets = assets();
    let view = view();

    for count in [1_000u32, 10_000] {
        group.bench_with_input(BenchmarkId::new("headless_frame", count), &count, |b, &count| {
            let mut backend = HeadlessBackend::new();
            let mut renderer = load(&mut backend, &assets, count);
            let mut recorder = HeadlessRecorder::new();

            b.iter(|| {
                recorder.reset();
                renderer.update(&mut backend, 1.0 / 60.0);
                renderer.prepare_frame(&mut backend, &view);
                let mut graph = SequentialGraph::new();
                renderer.add_passes(&mut graph);
                graph.execute(&mut recorder);
                renderer.end_frame(&mut backend);
                black_box(renderer.stats().combined().surviving_draw_calls)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_load, bench_frame);
criterion_main!(benches);

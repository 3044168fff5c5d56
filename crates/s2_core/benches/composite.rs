//! Benchmarks for the per-image hot path: percentile stretch and quality gate.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use s2_core::catalog::Coordinate;
use s2_core::catalog::RasterWindow;
use s2_core::composite::{stack_channels, ImageCompositor};
use s2_core::quality::QualityGate;
use s2_core::test_helpers::noise_scene;

fn windows(size: usize) -> Vec<RasterWindow> {
    noise_scene(size, 42)
        .into_iter()
        .map(|pixels| RasterWindow {
            pixels,
            center: Coordinate::new(0.0, 0.0),
        })
        .collect()
}

fn bench_stretch(c: &mut Criterion) {
    let compositor = ImageCompositor::default();
    let mut group = c.benchmark_group("stretch");
    for size in [256usize, 1024, 2196] {
        let stacked = stack_channels(&windows(size)).expect("stack");
        group.bench_with_input(BenchmarkId::from_parameter(size), &stacked, |b, stacked| {
            b.iter(|| {
                let mut pixels = stacked.clone();
                compositor.stretch(&mut pixels);
                black_box(pixels);
            });
        });
    }
    group.finish();
}

fn bench_quality_gate(c: &mut Criterion) {
    let gate = QualityGate::default();
    let compositor = ImageCompositor::default();
    let mut group = c.benchmark_group("quality_gate");
    for size in [256usize, 1024] {
        let mut pixels = stack_channels(&windows(size)).expect("stack");
        compositor.stretch(&mut pixels);
        group.bench_with_input(BenchmarkId::from_parameter(size), &pixels, |b, pixels| {
            b.iter(|| black_box(gate.evaluate(pixels)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_stretch, bench_quality_gate);
criterion_main!(benches);

//! Frame allocation benchmarks: cached versus uncached managers.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use framegraph::format::{BaseType, FrameFormat, FrameTarget};
use framegraph::memory::{CachedFrameManager, FrameManager, SimpleFrameManager};
use std::sync::Arc;

fn native_format(bytes: usize) -> FrameFormat {
    FrameFormat::new(BaseType::Byte, FrameTarget::Native).with_dimensions(&[bytes])
}

fn bench_allocate_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate_release");

    for bytes in [1024usize, 64 * 1024, 1024 * 1024] {
        let format = native_format(bytes);
        let managers: [(&str, Arc<dyn FrameManager>); 2] = [
            ("simple", SimpleFrameManager::new()),
            ("cached", CachedFrameManager::new()),
        ];

        group.throughput(Throughput::Bytes(bytes as u64));
        for (name, manager) in managers {
            group.bench_with_input(BenchmarkId::new(name, bytes), &format, |b, format| {
                b.iter(|| {
                    let frame = manager.new_frame(format).expect("allocation");
                    std::hint::black_box(frame.id());
                    frame.release().expect("release");
                });
            });
        }
    }

    group.finish();
}

fn bench_mixed_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_sizes");
    let formats: Vec<FrameFormat> = [512usize, 4096, 32 * 1024, 256 * 1024]
        .into_iter()
        .map(native_format)
        .collect();

    group.throughput(Throughput::Elements(formats.len() as u64));
    group.bench_function("cached_round_trip", |b| {
        let manager = CachedFrameManager::new();
        b.iter(|| {
            let frames: Vec<_> = formats
                .iter()
                .map(|format| manager.new_frame(format).expect("allocation"))
                .collect();
            for frame in frames {
                frame.release().expect("release");
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_allocate_release, bench_mixed_sizes);
criterion_main!(benches);

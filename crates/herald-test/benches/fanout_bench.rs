//! Benchmarks for trigger and broadcast fan-out

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use herald_state::{Backpressure, StateManager, Subscription};
use herald_test::ScriptedOperation;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn attach_many(manager: &StateManager<u64>, n: usize) -> Vec<Subscription<u64>> {
    (0..n).map(|_| manager.attach()).collect()
}

fn bench_trigger_fanout(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("trigger_fanout");

    for subscribers in [1usize, 16, 256, 1024] {
        let manager = StateManager::with_backpressure(
            ScriptedOperation::succeeding(42u64, Duration::ZERO),
            Backpressure::Coalesce { capacity: 4 },
        );
        let subs = attach_many(&manager, subscribers);

        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, _| b.iter(|| rt.block_on(async { black_box(manager.trigger().await) })),
        );
        drop(subs);
    }

    group.finish();
}

fn bench_attach_detach(c: &mut Criterion) {
    let manager = StateManager::new(ScriptedOperation::succeeding(0u64, Duration::ZERO));
    let _existing = attach_many(&manager, 128);

    c.bench_function("attach_detach", |b| {
        b.iter(|| {
            let sub = manager.attach();
            black_box(manager.detach(sub.id()))
        })
    });
}

fn bench_slow_reader_coalescing(c: &mut Criterion) {
    let rt = runtime();
    let manager = StateManager::with_backpressure(
        ScriptedOperation::succeeding(7u64, Duration::ZERO),
        Backpressure::Coalesce { capacity: 2 },
    );
    let mut sub = manager.attach();

    c.bench_function("slow_reader_coalescing", |b| {
        b.iter(|| {
            rt.block_on(async {
                for _ in 0..8 {
                    manager.trigger().await;
                }
            });
            black_box(sub.try_recv())
        })
    });
}

criterion_group!(
    benches,
    bench_trigger_fanout,
    bench_attach_detach,
    bench_slow_reader_coalescing
);
criterion_main!(benches);

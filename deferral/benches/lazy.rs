//! Benchmarks for deferred handles and host disposal.

use std::hint::black_box;
use std::rc::Rc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use deferral::{from_callback, Dispose, DisposeHost, Lazy};

fn bench_build(c: &mut Criterion) {
    c.bench_function("lazy_build_and_resolve", |b| {
        b.iter_batched(
            || Lazy::new(|| vec![0_u8; 64]),
            |lazy| {
                lazy.build().unwrap();
                black_box(lazy.resolve().unwrap().len())
            },
            BatchSize::SmallInput,
        );
    });

    let lazy = Lazy::new(|| 42_u64);
    let proxy = lazy.get().unwrap();
    c.bench_function("placeholder_read_after_build", |b| {
        b.iter(|| black_box(proxy.with(|value| *value).unwrap()));
    });
}

fn bench_host_dispose(c: &mut Criterion) {
    c.bench_function("host_dispose_100_children", |b| {
        b.iter_batched(
            || {
                let host = DisposeHost::new();
                for _ in 0..100 {
                    host.register(Rc::new(from_callback(|| {}))).unwrap();
                }
                host
            },
            |host| host.dispose().unwrap(),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_build, bench_host_dispose);
criterion_main!(benches);

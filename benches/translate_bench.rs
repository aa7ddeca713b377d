//! Benchmarks for the bridge translation pass and runtime resolution

use container_bridge::{
    BridgeBuilder, Declaration, SourceContainerBuilder, StaticDefinitions, TargetContainerBuilder,
};
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;

#[allow(dead_code)]
#[derive(Debug)]
struct SmallService {
    value: i32,
}

fn definitions(entries: usize) -> StaticDefinitions {
    let mut source = StaticDefinitions::new("bench/di");
    for index in 0..entries {
        source = source
            .with(
                format!("service_{index}"),
                Declaration::object::<SmallService, _>(|_| Ok(SmallService { value: 0 })),
            )
            .with(format!("param_{index}"), Declaration::value(index as i64));
    }
    source
}

fn bench_translation(c: &mut Criterion) {
    let mut group = c.benchmark_group("translation");

    for entries in [10usize, 100] {
        group.throughput(Throughput::Elements((entries * 2) as u64));
        group.bench_function(format!("initialize_{entries}_entries"), |b| {
            b.iter(|| {
                let mut builder = BridgeBuilder::new(SourceContainerBuilder::new());
                builder.add_definition_source(Arc::new(definitions(entries)), 0);
                builder.import("alias", "external");

                let mut target = TargetContainerBuilder::new();
                builder.initialize_target_container(&mut target).unwrap();
                black_box(target)
            })
        });
    }

    group.finish();
}

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");

    let mut builder = BridgeBuilder::new(SourceContainerBuilder::new());
    builder.add_definition_source(Arc::new(definitions(50)), 0);
    let mut target = TargetContainerBuilder::new();
    builder.initialize_target_container(&mut target).unwrap();
    let container = target.build();

    // first resolve pays for the lazy resolution build
    container.get("service_0").unwrap();

    group.bench_function("bridged_singleton", |b| {
        b.iter(|| black_box(container.get("service_0").unwrap()))
    });

    group.bench_function("parameter", |b| {
        b.iter(|| black_box(container.parameter("param_0").unwrap()))
    });

    group.finish();
}

criterion_group!(benches, bench_translation, bench_resolution);
criterion_main!(benches);

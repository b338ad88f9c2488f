//! ECS microbenchmarks using Criterion.
//!
//! These benchmarks measure individual world operations in isolation:
//! - Entity spawn (first `set`) with one and three components
//! - In-place component updates
//! - Archetype migration (component add/remove churn)
//! - Query execution: cold rebuild versus warm cache hits

use archon_bench::components::*;
use archon_engine::World;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

fn bench_spawn(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn");

    for count in [100, 1_000, 10_000] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("single_component", count), &count, |b, &n| {
            b.iter(|| {
                let mut world = World::new();
                for _ in 0..n {
                    let e = world.entity();
                    world.set(e, Position::default());
                }
                black_box(world.len())
            });
        });

        // Four components, one of them non-trivially destructible.
        group.bench_with_input(BenchmarkId::new("four_components", count), &count, |b, &n| {
            b.iter(|| {
                let mut world = World::new();
                for _ in 0..n {
                    let e = world.entity();
                    world
                        .set(e, Position::default())
                        .set(e, Velocity::default())
                        .set(e, Rotation::default())
                        .set(e, Tag(String::from("particle")));
                }
                black_box(world.len())
            });
        });
    }

    group.finish();
}

fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_in_place");

    for count in [1_000, 10_000] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("set_existing", count), &count, |b, &n| {
            let mut world = World::new();
            let entities: Vec<_> = (0..n)
                .map(|i| {
                    let e = world.entity();
                    world.set(e, Position { x: i as f32, y: 0.0, z: 0.0 });
                    e
                })
                .collect();

            b.iter(|| {
                for &e in &entities {
                    world.set(e, Position { x: 1.0, y: 2.0, z: 3.0 });
                }
            });
        });
    }

    group.finish();
}

fn bench_migration(c: &mut Criterion) {
    let mut group = c.benchmark_group("migration");

    for count in [1_000, 10_000] {
        group.throughput(Throughput::Elements(count as u64));

        // Each iteration moves every entity out of its archetype and back.
        group.bench_with_input(BenchmarkId::new("add_remove", count), &count, |b, &n| {
            let mut world = World::new();
            let entities: Vec<_> = (0..n)
                .map(|i| {
                    let e = world.entity();
                    world.set(e, Position { x: i as f32, y: 0.0, z: 0.0 });
                    e
                })
                .collect();

            b.iter(|| {
                for &e in &entities {
                    world.set(e, Velocity::default());
                }
                for &e in &entities {
                    world.remove::<Velocity>(e);
                }
            });
        });
    }

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");

    for count in [1_000, 10_000, 100_000] {
        group.throughput(Throughput::Elements(count as u64));

        group.bench_with_input(BenchmarkId::new("warm_cache", count), &count, |b, &n| {
            let mut world = World::new();
            for i in 0..n {
                let e = world.entity();
                world
                    .set(e, Position { x: i as f32, y: 0.0, z: 0.0 })
                    .set(e, Velocity { x: 0.0, y: i as f32, z: 0.0 });
            }
            // Prime the cache and drain the dirty flags.
            let _ = world.query::<(Position, Velocity)>();
            let _ = world.query::<(Position, Velocity)>();

            b.iter(|| black_box(world.query::<(Position, Velocity)>().len()));
        });

        group.bench_with_input(BenchmarkId::new("rebuild", count), &count, |b, &n| {
            let mut world = World::new();
            let entities: Vec<_> = (0..n)
                .map(|i| {
                    let e = world.entity();
                    world
                        .set(e, Position { x: i as f32, y: 0.0, z: 0.0 })
                        .set(e, Velocity { x: 0.0, y: i as f32, z: 0.0 });
                    e
                })
                .collect();

            b.iter(|| {
                // An in-place update plus a removal forces the mixed-flag
                // rebuild path.
                world.set(entities[0], Position::default());
                world.remove::<Velocity>(entities[1]);
                world.set(entities[1], Velocity::default());
                black_box(world.query::<(Position, Velocity)>().len())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_spawn, bench_update, bench_migration, bench_query);
criterion_main!(benches);

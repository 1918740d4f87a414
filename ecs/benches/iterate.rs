use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use rand::{Rng, SeedableRng, rngs::StdRng};

use quarry_ecs::{Component, Storage};

#[derive(Component, Clone, Copy)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Component, Clone, Copy)]
struct Velocity {
    dx: f32,
    dy: f32,
}

#[derive(Component)]
struct Inactive;

/// A world with a spread of signatures so queries have to skip archetypes.
fn populated(n: usize) -> Storage {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut storage = Storage::new();
    for i in 0..n {
        let entity = storage.create_entity();
        storage.add_component(
            entity,
            Position {
                x: i as f32,
                y: 0.0,
            },
        );
        if rng.gen_bool(0.5) {
            storage.add_component(entity, Velocity { dx: 1.0, dy: 0.5 });
        }
        if rng.gen_bool(0.1) {
            storage.add_component(entity, Inactive);
        }
    }
    storage
}

fn iterate_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    let storage = populated(100_000);

    group.bench_function("walk_100k_one_component", |b| {
        let mut query = storage.query().with::<Position>().build();
        b.iter(|| {
            let mut sum = 0.0f32;
            for found in query.iter(&storage) {
                sum += storage.view(&found).get::<Position>().unwrap().x;
            }
            black_box(sum);
        });
    });

    group.bench_function("walk_100k_include_exclude", |b| {
        let mut query = storage
            .query()
            .with::<Position>()
            .with::<Velocity>()
            .without::<Inactive>()
            .build();
        b.iter(|| {
            let mut count = 0usize;
            for found in query.iter(&storage) {
                black_box(found.entity());
                count += 1;
            }
            black_box(count);
        });
    });

    group.finish();
}

criterion_group!(benches, iterate_benchmark);
criterion_main!(benches);

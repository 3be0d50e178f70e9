//! Scalability benchmarks for the projectile engine
//!
//! Measures the batched resolver tick and replication encoding at
//! increasing live projectile counts.
//!
//! Run with: cargo bench --bench scalability

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use glam::Vec3;
use rand::Rng;
use volley_server::game::constants::physics::DT;
use volley_server::game::pool::{ProjectilePool, SharedPool};
use volley_server::game::profile::{ProfileCatalog, ProfileId};
use volley_server::game::registry::HealthRegistry;
use volley_server::game::scene::StaticScene;
use volley_server::game::systems::collision::CollisionResolver;
use volley_server::game::world::LayerMask;
use volley_server::net::protocol::{encode, ReplicationMessage};

const COUNTS: [usize; 5] = [100, 250, 500, 1000, 2000];

/// Floor plus a ring of damageable targets
fn create_scene() -> (StaticScene, HealthRegistry) {
    let mut scene = StaticScene::new();
    let mut registry = HealthRegistry::new();
    scene.add_plane(Vec3::Y, Vec3::ZERO, LayerMask::WORLD);
    for i in 0..32u64 {
        let angle = i as f32 / 32.0 * std::f32::consts::TAU;
        let centre = Vec3::new(angle.cos() * 40.0, 1.0, angle.sin() * 40.0);
        scene.add_entity_sphere(100 + i, centre, 0.6);
        registry.insert(100 + i, f32::MAX);
    }
    (scene, registry)
}

/// Pool with `count` projectiles fired from random points in random directions
fn create_pool(catalog: &ProfileCatalog, count: usize) -> SharedPool {
    let pool = ProjectilePool::shared(count, 25);
    let mut rng = rand::thread_rng();
    {
        let mut guard = pool.write();
        for i in 0..count {
            let profile_id = ProfileId((i % 3) as u16);
            let Some(profile) = catalog.projectile(profile_id) else {
                continue;
            };
            let origin = Vec3::new(rng.gen_range(-30.0..30.0), rng.gen_range(0.5..5.0), rng.gen_range(-30.0..30.0));
            let direction = Vec3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-0.2..0.5), rng.gen_range(-1.0..1.0))
                .normalize_or(Vec3::Z);
            guard
                .spawn(profile_id, profile, origin, direction, 1)
                .expect("bench pool sized for count");
        }
    }
    pool
}

/// Benchmark one resolver pass over every live projectile
fn bench_resolver_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolver_tick");
    group.sample_size(30);

    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    let catalog = ProfileCatalog::demo();
    let resolver = CollisionResolver::default();

    for count in COUNTS {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("batched", count), &count, |b, &count| {
            b.iter_batched(
                || {
                    let (scene, registry) = create_scene();
                    (create_pool(&catalog, count), scene, registry)
                },
                |(pool, scene, mut registry)| {
                    let report = rt.block_on(resolver.tick(&pool, &catalog, &scene, &mut registry, DT));
                    black_box(report)
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

/// Benchmark building and encoding every position packet for one round
fn bench_replication_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("replication_encode");
    let catalog = ProfileCatalog::demo();

    for count in COUNTS {
        let pool = create_pool(&catalog, count);
        let positions = pool.read().live_positions();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("chunks_of_64", count), &positions, |b, positions| {
            b.iter(|| {
                let bytes: usize = positions
                    .chunks(64)
                    .map(|chunk| {
                        encode(&ReplicationMessage::position_batch(chunk))
                            .map(|b| b.len())
                            .unwrap_or(0)
                    })
                    .sum();
                black_box(bytes)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_resolver_tick, bench_replication_encode);
criterion_main!(benches);

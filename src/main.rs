use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use glam::Vec3;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use volley_server::config::EngineConfig;
use volley_server::game::manager::ProjectileManager;
use volley_server::game::pool::{prewarm, ProjectilePool};
use volley_server::game::profile::ProfileCatalog;
use volley_server::game::registry::{EntityId, HealthRegistry};
use volley_server::game::runner::{Shooter, SimulationLoop};
use volley_server::game::scene::StaticScene;
use volley_server::game::systems::collision::CollisionResolver;
use volley_server::game::systems::explosion::ExplosionCascade;
use volley_server::game::weapon::{
    Aim, FireControl, FireMode, Launcher, Loadout, Magazine, Weapon,
};
use volley_server::game::world::LayerMask;
use volley_server::metrics::{self, Metrics};
use volley_server::net::broadcast::ObserverHub;
use volley_server::net::outbound::OutboundQueue;
use volley_server::net::replication::ReplicationScheduler;

const TURRET: EntityId = 1;
const DUMMY_HEALTH: f32 = 1_000_000.0;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Volley Server v{}", env!("CARGO_PKG_VERSION"));

    let config = EngineConfig::load_or_default();
    config.validate()?;
    info!(
        "Configuration loaded: {} Hz, pool {}+{}, observers on {}:{}",
        config.tick_rate,
        config.pool_initial_size,
        config.pool_chunk_size,
        config.observer_bind_address,
        config.observer_port
    );

    let catalog = Arc::new(load_catalog(&config)?);
    info!(
        "Profile catalog: {} projectiles, {} explosions",
        catalog.projectile_count(),
        catalog.explosion_count()
    );

    let metrics = Arc::new(Metrics::new());
    let metrics_clone = metrics.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Observer transport
    let queue = OutboundQueue::default();
    let hub = Arc::new(ObserverHub::default().with_metrics(metrics.clone()));
    let listener = TcpListener::bind(SocketAddr::new(config.observer_bind_address, config.observer_port))
        .await
        .context("failed to bind observer listener")?;
    let server_task = tokio::spawn(hub.clone().serve(listener, shutdown_rx.clone()));
    let scheduler_sender = queue.sender();
    let simulation_sender = queue.sender();
    let pump_task = tokio::spawn(hub.clone().pump(queue, shutdown_rx.clone()));

    // Start at one chunk, then prewarm chunk by chunk up to the initial size
    let pool = ProjectilePool::shared(
        config.pool_chunk_size.min(config.pool_initial_size),
        config.pool_chunk_size,
    );
    prewarm(&pool, config.pool_initial_size).await;

    let scheduler = ReplicationScheduler::new(pool.clone(), scheduler_sender, config.replication())
        .with_metrics(metrics.clone());
    let scheduler_task = tokio::spawn(scheduler.run(shutdown_rx.clone()));

    let resolver = CollisionResolver::new(config.max_hits, ExplosionCascade::new(config.max_overlaps))
        .with_outbound(simulation_sender);
    let manager = ProjectileManager::new(pool, catalog.clone(), resolver).with_metrics(metrics.clone());

    let (scene, registry, targets) = demo_scene();
    let mut simulation = SimulationLoop::new(manager, scene, registry, config.tick_rate)
        .with_metrics(metrics.clone())
        .with_fire_from_muzzle(config.fire_from_muzzle);
    simulation.add_shooter(demo_turret(&catalog, targets[0])?);
    let simulation_task = tokio::spawn(simulation.run(shutdown_rx));

    info!("Server ready, observers connect to {}:{}", config.observer_bind_address, config.observer_port);

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Shutting down...");
    // Receivers may already be gone if a task failed
    let _ = shutdown_tx.send(true);

    let simulation = simulation_task.await?;
    scheduler_task.await?;
    pump_task.await?;
    if let Err(e) = server_task.await? {
        error!("Observer hub error: {}", e);
    }

    info!(
        "Server stopped after {} ticks, {} projectiles still live",
        simulation.tick_count(),
        simulation.manager().live_count()
    );
    Ok(())
}

fn load_catalog(config: &EngineConfig) -> anyhow::Result<ProfileCatalog> {
    let Some(path) = &config.profiles_path else {
        return Ok(ProfileCatalog::demo());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read profile catalog {}", path.display()))?;
    let catalog = ProfileCatalog::from_json(&json)
        .with_context(|| format!("invalid profile catalog {}", path.display()))?;
    Ok(catalog)
}

/// Floor, a wall of cover and three target dummies
fn demo_scene() -> (StaticScene, HealthRegistry, Vec<Vec3>) {
    let mut scene = StaticScene::new();
    let mut registry = HealthRegistry::new();

    scene.add_plane(Vec3::Y, Vec3::ZERO, LayerMask::WORLD);
    scene.add_sphere(Vec3::new(6.0, 1.0, 20.0), 1.5, LayerMask::COVER, None);

    let targets = vec![
        Vec3::new(0.0, 1.0, 30.0),
        Vec3::new(4.0, 1.0, 25.0),
        Vec3::new(-4.0, 1.0, 25.0),
    ];
    for (i, &centre) in targets.iter().enumerate() {
        let entity = 100 + i as EntityId;
        scene.add_entity_sphere(entity, centre, 0.6);
        registry.insert(entity, DUMMY_HEALTH);
    }
    (scene, registry, targets)
}

/// Turret with a rifle and a grenade launcher, rifle equipped
fn demo_turret(catalog: &ProfileCatalog, target: Vec3) -> anyhow::Result<Shooter> {
    let rifle = catalog
        .find_projectile("rifle_round")
        .context("catalog has no rifle_round profile")?;
    let grenade = catalog
        .find_projectile("grenade")
        .context("catalog has no grenade profile")?;

    let shoot_point = Vec3::new(0.0, 1.5, 0.0);
    let muzzle = Vec3::new(0.2, 1.4, 0.6);

    let weapons = vec![
        Weapon::new("rifle", FireControl::new(120, FireMode::FullAuto))
            .with_launcher(Launcher { profile: rifle, muzzle }),
        Weapon::new("grenade_launcher", FireControl::new(30, FireMode::SemiAuto))
            .with_magazine(Magazine { ammunition: 60, ammo_per_attack: 1 })
            .with_launcher(Launcher { profile: grenade, muzzle }),
    ];
    let mut loadout = Loadout::new(weapons);
    loadout.select(0);

    Ok(Shooter {
        entity: TURRET,
        loadout,
        aim: Aim {
            shoot_point,
            direction: (target - shoot_point).normalize_or_zero(),
        },
        trigger: true,
    })
}

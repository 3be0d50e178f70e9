//! Fixed-rate simulation loop
//!
//! Each tick fires every armed shooter's equipped weapon, then runs one
//! resolver pass over the pool. Late ticks are skipped rather than bunched.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::game::manager::ProjectileManager;
use crate::game::registry::{EntityId, EntityRegistry};
use crate::game::systems::collision::TickReport;
use crate::game::weapon::{Aim, Loadout};
use crate::game::world::CollisionWorld;
use crate::metrics::Metrics;

/// Seconds between stats log lines
const STATS_INTERVAL_SECS: u64 = 30;

/// Anything holding weapons the loop fires on its behalf
pub struct Shooter {
    pub entity: EntityId,
    pub loadout: Loadout,
    pub aim: Aim,
    pub trigger: bool,
}

pub struct SimulationLoop<W, R> {
    manager: ProjectileManager,
    world: W,
    registry: R,
    shooters: Vec<Shooter>,
    tick_rate: u32,
    fire_from_muzzle: bool,
    metrics: Option<Arc<Metrics>>,
    tick_count: u64,
}

impl<W, R> SimulationLoop<W, R>
where
    W: CollisionWorld,
    R: EntityRegistry + Send,
{
    pub fn new(manager: ProjectileManager, world: W, registry: R, tick_rate: u32) -> Self {
        Self {
            manager,
            world,
            registry,
            shooters: Vec::new(),
            tick_rate: tick_rate.max(1),
            fire_from_muzzle: false,
            metrics: None,
            tick_count: 0,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_fire_from_muzzle(mut self, fire_from_muzzle: bool) -> Self {
        self.fire_from_muzzle = fire_from_muzzle;
        self
    }

    pub fn add_shooter(&mut self, shooter: Shooter) {
        self.shooters.push(shooter);
    }

    pub fn shooters_mut(&mut self) -> &mut [Shooter] {
        &mut self.shooters
    }

    pub fn manager(&self) -> &ProjectileManager {
        &self.manager
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn dt(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    /// One simulation tick: weapons first, then the resolver
    pub async fn step(&mut self) -> TickReport {
        let dt = self.dt();
        self.tick_count += 1;

        for shooter in &mut self.shooters {
            let Some(weapon) = shooter.loadout.equipped_mut() else {
                continue;
            };
            let Some(request) =
                weapon.update(shooter.trigger, shooter.aim, shooter.entity, self.fire_from_muzzle, dt)
            else {
                continue;
            };
            if let Err(e) = self.manager.spawn(request) {
                debug!("Shooter {} spawn rejected: {}", shooter.entity, e);
            }
        }

        self.manager.simulate(&self.world, &mut self.registry, dt).await
    }

    /// Tick at the configured rate until `shutdown` flips to true.
    /// Hands the loop back so callers can inspect final state.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Self {
        let mut ticker = interval(Duration::from_micros(1_000_000 / u64::from(self.tick_rate)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Simulation loop started at {} Hz", self.tick_rate);
        let start = Instant::now();
        let stats_every = u64::from(self.tick_rate) * STATS_INTERVAL_SECS;

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let tick_start = Instant::now();
            self.step().await;
            if let Some(metrics) = &self.metrics {
                metrics.record_tick_time(tick_start.elapsed());
            }

            if self.tick_count % stats_every == 0 {
                self.log_stats(start.elapsed().as_secs());
            }
        }

        info!("Simulation loop stopped after {} ticks", self.tick_count);
        self
    }

    fn log_stats(&self, elapsed_secs: u64) {
        let (live, capacity) = {
            let pool = self.manager.pool().read();
            (pool.live_count(), pool.capacity())
        };
        let p95 = self
            .metrics
            .as_ref()
            .map_or(0, |m| m.tick_time_p95_us.load(Ordering::Relaxed));
        info!(
            "Simulation: {}s, tick {}, {} live / {} slots | tick p95 {}us",
            elapsed_secs, self.tick_count, live, capacity, p95
        );
    }
}

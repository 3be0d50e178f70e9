//! Projectile manager: the facade weapons and the server loop talk to
//!
//! Owns the shared pool, the profile catalog and the collision resolver.
//! Spawns come in from weapons at any time; `simulate` runs once per tick.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use glam::Vec3;
use tracing::{error, trace, warn};

use crate::game::pool::{PoolError, SharedPool};
use crate::game::profile::{ProfileCatalog, ProfileId};
use crate::game::projectile::ProjectileHandle;
use crate::game::registry::{EntityId, EntityRegistry};
use crate::game::systems::collision::{CollisionResolver, TickReport};
use crate::game::world::CollisionWorld;
use crate::metrics::Metrics;
use crate::net::outbound::OutboundSender;
use crate::net::protocol::{ReplicationMessage, SpawnNotice};
use crate::util::math::is_finite;

/// Request from a weapon to fire one projectile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnRequest {
    pub profile: ProfileId,
    /// Where the simulation starts the projectile
    pub origin: Vec3,
    /// Where observers first draw it (usually the muzzle)
    pub visual_origin: Vec3,
    pub direction: Vec3,
    pub owner: EntityId,
}

/// Spawn failures; none of them consume a pool slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SpawnError {
    #[error("unknown projectile profile {0}")]
    UnknownProfile(u16),
    #[error("spawn direction must be finite and non-zero")]
    InvalidDirection,
    #[error(transparent)]
    Pool(#[from] PoolError),
}

pub struct ProjectileManager {
    pool: SharedPool,
    catalog: Arc<ProfileCatalog>,
    resolver: CollisionResolver,
    outbound: Option<OutboundSender>,
    metrics: Option<Arc<Metrics>>,
}

impl ProjectileManager {
    pub fn new(pool: SharedPool, catalog: Arc<ProfileCatalog>, resolver: CollisionResolver) -> Self {
        let outbound = resolver.outbound().cloned();
        Self {
            pool,
            catalog,
            resolver,
            outbound,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Launch a projectile and tell observers about it
    pub fn spawn(&self, request: SpawnRequest) -> Result<ProjectileHandle, SpawnError> {
        let result = self.try_spawn(&request);
        if let Some(metrics) = &self.metrics {
            match result {
                Ok(_) => Metrics::incr(&metrics.projectiles_spawned),
                Err(_) => Metrics::incr(&metrics.spawns_rejected),
            }
        }
        result
    }

    fn try_spawn(&self, request: &SpawnRequest) -> Result<ProjectileHandle, SpawnError> {
        let profile = self
            .catalog
            .projectile(request.profile)
            .ok_or(SpawnError::UnknownProfile(request.profile.0))?;

        if !is_finite(request.direction) || request.direction.length_squared() <= f32::EPSILON {
            return Err(SpawnError::InvalidDirection);
        }
        let direction = request.direction.normalize();

        let handle = self
            .pool
            .write()
            .spawn(request.profile, profile, request.origin, direction, request.owner)
            .map_err(|e| {
                error!("Projectile spawn failed: {}", e);
                SpawnError::from(e)
            })?;

        trace!(
            "Spawned projectile {} ({}) for entity {}",
            handle.index,
            profile.name,
            request.owner
        );
        if let Some(sender) = &self.outbound {
            sender.send_or_warn(ReplicationMessage::Spawn(SpawnNotice {
                id: handle.index,
                profile: request.profile,
                owner: request.owner,
                position: request.origin,
                visual_position: request.visual_origin,
                direction,
            }));
        }
        Ok(handle)
    }

    /// Explicit termination (e.g. round reset). No explosion. Returns false
    /// if the handle is stale or already terminated.
    pub fn terminate(&self, handle: ProjectileHandle) -> bool {
        let released = self.pool.write().release_handle(handle);
        if released {
            if let Some(sender) = &self.outbound {
                sender.send_or_warn(ReplicationMessage::Terminate { id: handle.index });
            }
            if let Some(metrics) = &self.metrics {
                Metrics::incr(&metrics.projectiles_terminated);
            }
        } else {
            warn!("Ignoring terminate for stale projectile {:?}", handle);
        }
        released
    }

    /// Run one resolver pass over every live projectile
    pub async fn simulate<W, R>(&self, world: &W, registry: &mut R, dt: f32) -> TickReport
    where
        W: CollisionWorld,
        R: EntityRegistry + ?Sized,
    {
        let report = self
            .resolver
            .tick(&self.pool, &self.catalog, world, registry, dt)
            .await;
        if let Some(metrics) = &self.metrics {
            self.record(metrics, &report);
        }
        report
    }

    fn record(&self, metrics: &Metrics, report: &TickReport) {
        {
            let pool = self.pool.read();
            metrics.record_pool(pool.live_count(), pool.capacity());
        }
        metrics
            .projectiles_terminated
            .fetch_add(report.terminated.len() as u64, Ordering::Relaxed);
        metrics
            .explosions
            .fetch_add(report.explosions.len() as u64, Ordering::Relaxed);
        let damaged: usize = report.explosions.iter().map(|e| e.damaged.len()).sum();
        metrics
            .explosion_damage_events
            .fetch_add(damaged as u64, Ordering::Relaxed);

        #[cfg(feature = "metrics_extended")]
        {
            metrics
                .entity_hits
                .fetch_add(report.entity_hits as u64, Ordering::Relaxed);
            metrics.bounces.fetch_add(report.bounces as u64, Ordering::Relaxed);
        }
    }

    pub fn pool(&self) -> &SharedPool {
        &self.pool
    }

    pub fn catalog(&self) -> &Arc<ProfileCatalog> {
        &self.catalog
    }

    pub fn live_count(&self) -> usize {
        self.pool.read().live_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::pool::ProjectilePool;
    use crate::game::registry::HealthRegistry;
    use crate::game::scene::StaticScene;
    use crate::net::outbound::OutboundQueue;

    fn manager(queue: &OutboundQueue) -> ProjectileManager {
        let resolver = CollisionResolver::default().with_outbound(queue.sender());
        ProjectileManager::new(
            ProjectilePool::shared(4, 2),
            Arc::new(ProfileCatalog::demo()),
            resolver,
        )
        .with_metrics(Arc::new(Metrics::new()))
    }

    fn request(profile: u16) -> SpawnRequest {
        SpawnRequest {
            profile: ProfileId(profile),
            origin: Vec3::new(0.0, 1.5, 0.0),
            visual_origin: Vec3::new(0.2, 1.4, 0.5),
            direction: Vec3::new(0.0, 0.0, 3.0),
            owner: 7,
        }
    }

    #[test]
    fn test_spawn_notifies_observers() {
        let queue = OutboundQueue::new(16);
        let mgr = manager(&queue);
        let handle = mgr.spawn(request(0)).unwrap();

        assert_eq!(mgr.live_count(), 1);
        match queue.drain().as_slice() {
            [ReplicationMessage::Spawn(notice)] => {
                assert_eq!(notice.id, handle.index);
                assert_eq!(notice.owner, 7);
                assert_eq!(notice.visual_position, Vec3::new(0.2, 1.4, 0.5));
                assert_eq!(notice.direction, Vec3::Z);
            }
            other => panic!("unexpected messages: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_profile_consumes_nothing() {
        let queue = OutboundQueue::new(16);
        let mgr = manager(&queue);
        assert_eq!(mgr.spawn(request(99)), Err(SpawnError::UnknownProfile(99)));
        assert_eq!(mgr.live_count(), 0);
        assert_eq!(mgr.pool().read().free_count(), 4);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_invalid_direction_rejected() {
        let queue = OutboundQueue::new(16);
        let mgr = manager(&queue);
        let mut req = request(0);
        req.direction = Vec3::ZERO;
        assert_eq!(mgr.spawn(req), Err(SpawnError::InvalidDirection));
        req.direction = Vec3::new(f32::NAN, 0.0, 1.0);
        assert_eq!(mgr.spawn(req), Err(SpawnError::InvalidDirection));
        assert_eq!(mgr.live_count(), 0);
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let queue = OutboundQueue::new(16);
        let mgr = manager(&queue);
        let handle = mgr.spawn(request(0)).unwrap();
        queue.drain();

        assert!(mgr.terminate(handle));
        assert!(!mgr.terminate(handle));
        assert_eq!(queue.drain(), vec![ReplicationMessage::Terminate { id: handle.index }]);
    }

    #[test]
    fn test_stale_handle_cannot_terminate_new_occupant() {
        let queue = OutboundQueue::new(16);
        let mgr = manager(&queue);
        let old = mgr.spawn(request(0)).unwrap();
        mgr.terminate(old);
        let new = mgr.spawn(request(0)).unwrap();
        assert_eq!(old.index, new.index);

        assert!(!mgr.terminate(old));
        assert_eq!(mgr.live_count(), 1);
    }

    #[tokio::test]
    async fn test_simulate_records_metrics() {
        let queue = OutboundQueue::new(64);
        let metrics = Arc::new(Metrics::new());
        let mgr = ProjectileManager::new(
            ProjectilePool::shared(4, 2),
            Arc::new(ProfileCatalog::demo()),
            CollisionResolver::default().with_outbound(queue.sender()),
        )
        .with_metrics(metrics.clone());
        let scene = StaticScene::new();
        let mut reg = HealthRegistry::new();

        for _ in 0..3 {
            mgr.spawn(request(0)).unwrap();
        }
        mgr.simulate(&scene, &mut reg, 0.02).await;

        assert_eq!(metrics.projectiles_spawned.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.live_projectiles.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.pool_capacity.load(Ordering::Relaxed), 4);
    }
}

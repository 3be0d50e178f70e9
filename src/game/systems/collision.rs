//! Batched collision resolution for live projectiles
//!
//! One pass per tick:
//! 1. Snapshot live handles and build one swept-sphere query per projectile
//! 2. Submit the whole batch and await it (the only suspension point)
//! 3. Re-lock the pool, walk each projectile's hits nearest first, apply
//!    damage and bounces, then integrate survivors
//! 4. Release terminated slots immediately and run their explosions
//!
//! Handles carry a generation, so a slot released and reacquired while the
//! batch was in flight is skipped rather than resolved against stale hits.

use glam::{Quat, Vec3};
use tracing::{debug, trace, warn};

use crate::game::constants::collision::{IMPACT_SURFACE_OFFSET, LIFETIME_EPSILON, MAX_HITS};
use crate::game::constants::physics::GRAVITY;
use crate::game::pool::SharedPool;
use crate::game::profile::{ProfileCatalog, ProjectileProfile};
use crate::game::projectile::{Projectile, ProjectileHandle, WireId};
use crate::game::registry::EntityRegistry;
use crate::game::systems::explosion::{Detonation, ExplosionCascade, ExplosionReport};
use crate::game::world::{CollisionWorld, Hit, HitBuffer, LayerMask, SweepQuery};
use crate::net::outbound::OutboundSender;
use crate::net::protocol::ReplicationMessage;
use crate::util::math::{bounce, look_rotation};

/// Why a projectile stopped this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Termination {
    /// Ran out of bounces on a hit
    Impact { point: Vec3, normal: Vec3 },
    /// Reached its lifetime
    Expired,
    /// Its profile vanished from the catalog
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Terminated {
    pub handle: ProjectileHandle,
    pub cause: Termination,
}

/// What one resolver pass did
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Projectiles resolved this tick
    pub processed: usize,
    /// Handles that went stale while the batch was in flight
    pub stale: usize,
    pub hits: usize,
    pub entity_hits: usize,
    pub bounces: usize,
    pub terminated: Vec<Terminated>,
    pub explosions: Vec<ExplosionReport>,
}

/// Per-projectile outcome of walking its hit list
enum HitOutcome {
    Continue,
    Terminate(Termination),
}

#[derive(Debug, Clone)]
pub struct CollisionResolver {
    max_hits: usize,
    gravity: Vec3,
    mask: LayerMask,
    cascade: ExplosionCascade,
    outbound: Option<OutboundSender>,
}

impl CollisionResolver {
    pub fn new(max_hits: usize, cascade: ExplosionCascade) -> Self {
        Self {
            max_hits: max_hits.max(1),
            gravity: GRAVITY,
            mask: LayerMask::PROJECTILE,
            cascade,
            outbound: None,
        }
    }

    /// Send terminate and explosion notifications through `sender`
    pub fn with_outbound(mut self, sender: OutboundSender) -> Self {
        self.outbound = Some(sender);
        self
    }

    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn max_hits(&self) -> usize {
        self.max_hits
    }

    pub fn outbound(&self) -> Option<&OutboundSender> {
        self.outbound.as_ref()
    }

    /// Advance every live projectile by `dt` and resolve its collisions
    pub async fn tick<W, R>(
        &self,
        pool: &SharedPool,
        catalog: &ProfileCatalog,
        world: &W,
        registry: &mut R,
        dt: f32,
    ) -> TickReport
    where
        W: CollisionWorld,
        R: EntityRegistry + ?Sized,
    {
        let mut report = TickReport::default();

        // Index list is rebuilt every tick; never cached across ticks
        let (handles, queries) = {
            let pool = pool.read();
            let mut handles = Vec::with_capacity(pool.live_count());
            let mut queries: Vec<SweepQuery> = Vec::with_capacity(pool.live_count());
            for handle in pool.live_handles() {
                if let Some(p) = pool.get(handle) {
                    handles.push(handle);
                    queries.push(self.sweep_query(p, catalog.projectile(p.profile), dt));
                }
            }
            (handles, queries)
        };
        if handles.is_empty() {
            return report;
        }

        let hits: HitBuffer = world.sweep_batch(&queries, self.max_hits).await;

        let mut detonations: Vec<(Detonation, &ProjectileProfile)> = Vec::new();
        {
            let mut pool = pool.write();
            for (i, &handle) in handles.iter().enumerate() {
                let Some(projectile) = pool.get_mut(handle) else {
                    report.stale += 1;
                    continue;
                };
                report.processed += 1;

                let Some(profile) = catalog.projectile(projectile.profile) else {
                    warn!(
                        "Projectile {} has unknown profile {}, terminating",
                        handle.index, projectile.profile.0
                    );
                    pool.release(handle.index);
                    self.notify_terminated(handle.index);
                    report.terminated.push(Terminated {
                        handle,
                        cause: Termination::Invalid,
                    });
                    continue;
                };

                let cause = match self.resolve_hits(projectile, profile, hits.hits_for(i), world, registry, &mut report) {
                    HitOutcome::Terminate(cause) => Some(cause),
                    HitOutcome::Continue => {
                        self.integrate(projectile, profile, dt);
                        (projectile.age + LIFETIME_EPSILON >= projectile.max_lifetime)
                            .then_some(Termination::Expired)
                    }
                };
                let Some(cause) = cause else {
                    continue;
                };

                if let Some(detonation) = detonation_for(projectile, profile, cause) {
                    detonations.push((detonation, profile));
                }
                trace!("Projectile {} terminated: {:?}", handle.index, cause);
                pool.release(handle.index);
                self.notify_terminated(handle.index);
                report.terminated.push(Terminated { handle, cause });
            }
        }

        for (detonation, profile) in detonations {
            let Some(explosion) = profile.explosion.and_then(|id| catalog.explosion(id)) else {
                continue;
            };
            let outcome = self.cascade.trigger(world, registry, self.outbound.as_ref(), explosion, detonation);
            report.explosions.push(outcome);
        }

        if !report.terminated.is_empty() {
            debug!(
                "Tick resolved {} projectiles: {} hits, {} terminated, {} explosions",
                report.processed,
                report.hits,
                report.terminated.len(),
                report.explosions.len()
            );
        }
        report
    }

    fn sweep_query(&self, p: &Projectile, profile: Option<&ProjectileProfile>, dt: f32) -> SweepQuery {
        SweepQuery {
            origin: p.position,
            direction: p.velocity.normalize_or_zero(),
            distance: p.velocity.length() * dt,
            radius: profile.map_or(0.0, |prof| prof.radius),
            mask: self.mask,
            ignore_entity: Some(p.owner),
        }
    }

    /// Walk one projectile's hits, nearest first
    fn resolve_hits<'a, W, R>(
        &self,
        p: &mut Projectile,
        profile: &ProjectileProfile,
        hits: impl Iterator<Item = &'a Hit>,
        world: &W,
        registry: &mut R,
        report: &mut TickReport,
    ) -> HitOutcome
    where
        W: CollisionWorld,
        R: EntityRegistry + ?Sized,
    {
        for hit in hits {
            // Registry misses resolve as environment hits
            let entity = hit
                .body
                .and_then(|body| world.body_entity(body))
                .filter(|id| registry.contains(*id));

            if let Some(entity) = entity {
                if entity == p.owner {
                    continue;
                }
                let damage = profile.damage_at(p.life_lerp());
                registry.apply_damage(entity, damage, hit.point, p.travel_direction());
                report.entity_hits += 1;
                if profile.cannot_bounce_on_entity {
                    p.remaining_bounces = -1;
                }
            }
            report.hits += 1;

            if p.remaining_bounces >= 0 {
                p.velocity = bounce(p.velocity, hit.normal, profile.bounciness);
            }
            p.remaining_bounces -= 1;
            p.position = hit.point;

            if p.remaining_bounces < 0 {
                return HitOutcome::Terminate(Termination::Impact {
                    point: hit.point,
                    normal: hit.normal,
                });
            }
            report.bounces += 1;
        }
        HitOutcome::Continue
    }

    fn integrate(&self, p: &mut Projectile, profile: &ProjectileProfile, dt: f32) {
        p.velocity += self.gravity * profile.gravity_scale * dt - p.velocity * profile.drag * dt;
        p.position += p.velocity * dt;
        p.age += dt;
    }

    fn notify_terminated(&self, id: WireId) {
        if let Some(sender) = &self.outbound {
            sender.send_or_warn(ReplicationMessage::Terminate { id });
        }
    }
}

impl Default for CollisionResolver {
    fn default() -> Self {
        Self::new(MAX_HITS, ExplosionCascade::default())
    }
}

/// Explosion to run for a termination, if the profile calls for one
fn detonation_for(p: &Projectile, profile: &ProjectileProfile, cause: Termination) -> Option<Detonation> {
    let explosion = profile.explosion?;
    let (position, rotation): (Vec3, Quat) = match cause {
        Termination::Impact { point, normal } => (
            point + normal * IMPACT_SURFACE_OFFSET,
            look_rotation(p.travel_direction(), normal),
        ),
        Termination::Expired if profile.explode_on_expire => {
            (p.position, look_rotation(p.travel_direction(), Vec3::Y))
        }
        Termination::Expired | Termination::Invalid => return None,
    };
    Some(Detonation {
        explosion,
        position,
        rotation,
        source: p.owner,
    })
}

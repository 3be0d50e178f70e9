//! Explosion cascade: area damage with falloff and line of sight
//!
//! Runs synchronously inside the tick that terminated the projectile. The
//! effect notification goes out first; damage follows through the entity
//! registry, one application per body.

use glam::{Quat, Vec3};
use hashbrown::HashSet;
use tracing::{debug, trace};

use crate::game::constants::explosion::MAX_OVERLAPS;
use crate::game::profile::{ExplosionId, ExplosionProfile};
use crate::game::registry::{EntityId, EntityRegistry};
use crate::game::world::{BodyId, CollisionWorld, LayerMask};
use crate::net::outbound::OutboundSender;
use crate::net::protocol::ReplicationMessage;
use crate::util::math::lerp;

/// Where and how an explosion goes off
#[derive(Debug, Clone, Copy)]
pub struct Detonation {
    pub explosion: ExplosionId,
    pub position: Vec3,
    pub rotation: Quat,
    /// Entity credited with the explosion (self-damage is scaled for it)
    pub source: EntityId,
}

/// Outcome of one cascade
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExplosionReport {
    /// Unique bodies inside the radius
    pub bodies_considered: usize,
    /// (entity, damage applied) in processing order
    pub damaged: Vec<(EntityId, f32)>,
    /// Bodies skipped because something else was in the way
    pub blocked: usize,
    /// Damage dealt to the source entity, if the blast reached it
    pub self_damage: Option<f32>,
    /// Overlap query returned as many colliders as it was allowed to.
    /// More bodies may have been in range; this does not mean any were.
    pub limit_reached: bool,
}

impl ExplosionReport {
    pub fn total_damage(&self) -> f32 {
        self.damaged.iter().map(|(_, amount)| amount).sum()
    }
}

#[derive(Debug, Clone)]
pub struct ExplosionCascade {
    max_overlaps: usize,
}

impl ExplosionCascade {
    pub fn new(max_overlaps: usize) -> Self {
        Self {
            max_overlaps: max_overlaps.max(1),
        }
    }

    pub fn max_overlaps(&self) -> usize {
        self.max_overlaps
    }

    /// Detonate `profile` at `detonation.position`.
    ///
    /// Bodies without an entity the registry knows about take no damage.
    /// A body is blocked when the line from the centre to its centre of
    /// mass first meets some other collider.
    pub fn trigger<W, R>(
        &self,
        world: &W,
        registry: &mut R,
        outbound: Option<&OutboundSender>,
        profile: &ExplosionProfile,
        detonation: Detonation,
    ) -> ExplosionReport
    where
        W: CollisionWorld,
        R: EntityRegistry + ?Sized,
    {
        let Detonation {
            explosion,
            position,
            rotation,
            source,
        } = detonation;

        if let Some(sender) = outbound {
            sender.send_or_warn(ReplicationMessage::Explosion {
                explosion,
                position,
                rotation,
            });
        }

        let overlaps = world.overlap_sphere(position, profile.radius, LayerMask::ALL, self.max_overlaps);
        let mut report = ExplosionReport {
            limit_reached: overlaps.len() >= self.max_overlaps,
            ..Default::default()
        };
        if report.limit_reached {
            trace!("Explosion {} overlap query reached its limit of {}", profile.name, self.max_overlaps);
        }

        let mut seen: HashSet<BodyId> = HashSet::with_capacity(overlaps.len());
        for overlap in overlaps {
            // Static scenery: not damaged through this path
            let Some(body) = overlap.body else {
                continue;
            };
            if !seen.insert(body) {
                continue;
            }
            report.bodies_considered += 1;

            let Some(entity) = world.body_entity(body).filter(|e| registry.contains(*e)) else {
                continue;
            };
            let Some(centre) = world.body_centre_of_mass(body) else {
                continue;
            };

            let (distance, point) = match world.linecast(position, centre, LayerMask::OBSTRUCTION) {
                Some(hit) if hit.body == Some(body) => (hit.distance, hit.point),
                Some(_) => {
                    report.blocked += 1;
                    continue;
                }
                None => (position.distance(centre), centre),
            };

            let base = lerp(
                profile.max_damage,
                0.0,
                profile.falloff.evaluate(normalized_distance(distance, profile.radius)),
            );
            let amount = if entity == source {
                let scaled = base * profile.self_damage_multiplier;
                report.self_damage = Some(scaled);
                scaled
            } else {
                base
            };

            let direction = (centre - position).normalize_or_zero();
            if registry.apply_damage(entity, amount, point, direction) {
                report.damaged.push((entity, amount));
            }
        }

        debug!(
            "Explosion {} at {:?}: {} bodies, {} damaged, {} blocked",
            profile.name,
            position,
            report.bodies_considered,
            report.damaged.len(),
            report.blocked
        );
        report
    }
}

impl Default for ExplosionCascade {
    fn default() -> Self {
        Self::new(MAX_OVERLAPS)
    }
}

#[inline]
fn normalized_distance(distance: f32, radius: f32) -> f32 {
    if radius <= f32::EPSILON {
        return 1.0;
    }
    (distance / radius).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::profile::Curve;
    use crate::game::registry::HealthRegistry;
    use crate::game::scene::StaticScene;
    use crate::net::outbound::OutboundQueue;

    fn frag() -> ExplosionProfile {
        ExplosionProfile {
            name: "frag".to_string(),
            radius: 5.0,
            max_damage: 80.0,
            self_damage_multiplier: 0.5,
            environment_damage_multiplier: 1.0,
            falloff: Curve::linear(),
        }
    }

    fn at_origin(source: EntityId) -> Detonation {
        Detonation {
            explosion: ExplosionId(0),
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            source,
        }
    }

    fn registry(ids: &[EntityId]) -> HealthRegistry {
        let mut reg = HealthRegistry::new();
        for &id in ids {
            reg.insert(id, 1000.0);
        }
        reg
    }

    #[test]
    fn test_self_damage_scaled_others_full() {
        let mut scene = StaticScene::new();
        scene.add_entity_sphere(1, Vec3::new(2.0, 0.0, 0.0), 0.5);
        scene.add_entity_sphere(2, Vec3::new(-2.0, 0.0, 0.0), 0.5);
        let mut reg = registry(&[1, 2]);

        let report = ExplosionCascade::default().trigger(&scene, &mut reg, None, &frag(), at_origin(1));

        // Line of sight reaches each sphere's surface 1.5 units out
        let base = 80.0 * (1.0 - 1.5 / 5.0);
        assert!((reg.damage_taken(1) - base * 0.5).abs() < 1e-3);
        assert!((reg.damage_taken(2) - base).abs() < 1e-3);
        assert_eq!(report.self_damage.map(|d| (d - base * 0.5).abs() < 1e-3), Some(true));
        assert_eq!(report.damaged.len(), 2);
    }

    #[test]
    fn test_occluded_body_takes_nothing() {
        let mut scene = StaticScene::new();
        scene.add_entity_sphere(1, Vec3::new(4.0, 0.0, 0.0), 0.5);
        scene.add_sphere(Vec3::new(2.0, 0.0, 0.0), 0.75, LayerMask::COVER, None);
        let mut reg = registry(&[1]);

        let report = ExplosionCascade::default().trigger(&scene, &mut reg, None, &frag(), at_origin(99));

        assert_eq!(reg.damage_taken(1), 0.0);
        assert_eq!(report.blocked, 1);
        assert!(report.damaged.is_empty());
    }

    #[test]
    fn test_other_entity_blocks_line_of_sight() {
        let mut scene = StaticScene::new();
        scene.add_entity_sphere(1, Vec3::new(1.5, 0.0, 0.0), 0.5);
        scene.add_entity_sphere(2, Vec3::new(4.0, 0.0, 0.0), 0.5);
        let mut reg = registry(&[1, 2]);

        ExplosionCascade::default().trigger(&scene, &mut reg, None, &frag(), at_origin(99));

        assert!(reg.damage_taken(1) > 0.0);
        assert_eq!(reg.damage_taken(2), 0.0);
    }

    #[test]
    fn test_body_processed_once() {
        let mut scene = StaticScene::new();
        let body = scene.add_entity_sphere(1, Vec3::new(2.0, 0.0, 0.0), 0.5);
        scene.add_sphere(Vec3::new(2.0, 0.6, 0.0), 0.3, LayerMask::ENTITY, Some(body));
        let mut reg = registry(&[1]);

        let report = ExplosionCascade::default().trigger(&scene, &mut reg, None, &frag(), at_origin(99));

        assert_eq!(report.bodies_considered, 1);
        assert_eq!(reg.events().len(), 1);
    }

    #[test]
    fn test_overlap_limit_truncates() {
        let mut scene = StaticScene::new();
        for i in 0..5 {
            let angle = i as f32 * std::f32::consts::TAU / 5.0;
            scene.add_entity_sphere(i, Vec3::new(angle.cos() * 2.0, 0.0, angle.sin() * 2.0), 0.3);
        }
        let mut reg = registry(&[0, 1, 2, 3, 4]);

        let report = ExplosionCascade::new(2).trigger(&scene, &mut reg, None, &frag(), at_origin(99));

        assert!(report.limit_reached);
        assert_eq!(report.bodies_considered, 2);
        assert_eq!(reg.events().len(), 2);
    }

    #[test]
    fn test_overlap_limit_reached_without_truncation() {
        let mut scene = StaticScene::new();
        scene.add_entity_sphere(0, Vec3::new(2.0, 0.0, 0.0), 0.3);
        scene.add_entity_sphere(1, Vec3::new(-2.0, 0.0, 0.0), 0.3);
        let mut reg = registry(&[0, 1]);

        // Exactly at the limit: flagged, yet every body in range was seen
        let report = ExplosionCascade::new(2).trigger(&scene, &mut reg, None, &frag(), at_origin(99));
        assert!(report.limit_reached);
        assert_eq!(report.bodies_considered, 2);

        let mut reg = registry(&[0, 1]);
        let report = ExplosionCascade::new(3).trigger(&scene, &mut reg, None, &frag(), at_origin(99));
        assert!(!report.limit_reached);
        assert_eq!(report.bodies_considered, 2);
    }

    #[test]
    fn test_scenery_and_unknown_entities_skipped() {
        let mut scene = StaticScene::new();
        scene.add_plane(Vec3::Y, Vec3::new(0.0, -0.5, 0.0), LayerMask::WORLD);
        scene.add_entity_sphere(7, Vec3::new(1.0, 0.0, 0.0), 0.5);
        let mut reg = registry(&[]);

        let report = ExplosionCascade::default().trigger(&scene, &mut reg, None, &frag(), at_origin(99));

        assert_eq!(report.bodies_considered, 1);
        assert!(report.damaged.is_empty());
        assert!(reg.events().is_empty());
    }

    #[test]
    fn test_outside_radius_untouched_and_notification_sent() {
        let mut scene = StaticScene::new();
        scene.add_entity_sphere(1, Vec3::new(8.0, 0.0, 0.0), 0.5);
        let mut reg = registry(&[1]);
        let queue = OutboundQueue::new(4);

        let report = ExplosionCascade::default().trigger(
            &scene,
            &mut reg,
            Some(&queue.sender()),
            &frag(),
            at_origin(1),
        );

        assert_eq!(report.bodies_considered, 0);
        assert_eq!(report.total_damage(), 0.0);
        assert!(matches!(
            queue.drain().as_slice(),
            [ReplicationMessage::Explosion { explosion: ExplosionId(0), .. }]
        ));
    }

    #[test]
    fn test_normalized_distance_clamped() {
        assert_eq!(normalized_distance(10.0, 5.0), 1.0);
        assert_eq!(normalized_distance(-1.0, 5.0), 0.0);
        assert_eq!(normalized_distance(1.0, 0.0), 1.0);
    }
}

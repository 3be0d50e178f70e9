//! Observer-side mirror of replicated projectiles
//!
//! Observers never simulate. They keep a visual position per projectile and
//! ease it toward the last replicated target; position batches overwrite the
//! target only (last value wins). Each mirrored projectile also ages locally
//! so it retires on time even if its terminate message was lost.

use std::sync::Arc;

use glam::{Quat, Vec3};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::game::constants::observer::LERP_SPEED;
use crate::game::profile::{ExplosionId, ProfileCatalog, ProfileId};
use crate::game::projectile::WireId;
use crate::game::registry::EntityId;
use crate::net::protocol::ReplicationMessage;
use crate::util::math::move_towards;

#[derive(Debug, Clone, PartialEq)]
pub struct MirroredProjectile {
    pub profile: ProfileId,
    pub owner: EntityId,
    /// Where the projectile is drawn
    pub visual_position: Vec3,
    /// Latest replicated position
    pub target_position: Vec3,
    pub age: f32,
    pub max_lifetime: f32,
}

/// Fire-and-forget effect for the presentation layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExplosionEffect {
    pub explosion: ExplosionId,
    pub position: Vec3,
    pub rotation: Quat,
}

pub struct ObserverMirror {
    projectiles: FxHashMap<WireId, MirroredProjectile>,
    catalog: Arc<ProfileCatalog>,
    lerp_speed: f32,
    effects: Vec<ExplosionEffect>,
}

impl ObserverMirror {
    pub fn new(catalog: Arc<ProfileCatalog>) -> Self {
        Self::with_lerp_speed(catalog, LERP_SPEED)
    }

    pub fn with_lerp_speed(catalog: Arc<ProfileCatalog>, lerp_speed: f32) -> Self {
        Self {
            projectiles: FxHashMap::default(),
            catalog,
            lerp_speed,
            effects: Vec::new(),
        }
    }

    /// Apply one message from the authority
    pub fn apply(&mut self, message: &ReplicationMessage) {
        match message {
            ReplicationMessage::Spawn(notice) => {
                let Some(profile) = self.catalog.projectile(notice.profile) else {
                    debug!("Ignoring spawn {} with unknown profile {}", notice.id, notice.profile.0);
                    return;
                };
                // A reused id replaces whatever was left from a lost terminate
                self.projectiles.insert(
                    notice.id,
                    MirroredProjectile {
                        profile: notice.profile,
                        owner: notice.owner,
                        visual_position: notice.visual_position,
                        target_position: notice.position,
                        age: 0.0,
                        max_lifetime: profile.max_lifetime,
                    },
                );
            }
            ReplicationMessage::PositionBatch { entries } => {
                for entry in entries {
                    match self.projectiles.get_mut(&entry.id) {
                        Some(p) => p.target_position = entry.position,
                        None => trace!("Position for unknown projectile {}", entry.id),
                    }
                }
            }
            ReplicationMessage::Terminate { id } => {
                self.projectiles.remove(id);
            }
            ReplicationMessage::Explosion {
                explosion,
                position,
                rotation,
            } => self.effects.push(ExplosionEffect {
                explosion: *explosion,
                position: *position,
                rotation: *rotation,
            }),
        }
    }

    /// Ease visuals toward their targets and retire expired projectiles.
    /// Returns the ids retired locally.
    pub fn tick(&mut self, dt: f32) -> Vec<WireId> {
        let step = self.lerp_speed * dt;
        let mut retired = Vec::new();
        self.projectiles.retain(|&id, p| {
            p.visual_position = move_towards(p.visual_position, p.target_position, step);
            p.age += dt;
            if p.age >= p.max_lifetime {
                retired.push(id);
                false
            } else {
                true
            }
        });
        retired
    }

    pub fn get(&self, id: WireId) -> Option<&MirroredProjectile> {
        self.projectiles.get(&id)
    }

    pub fn len(&self) -> usize {
        self.projectiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projectiles.is_empty()
    }

    pub fn drain_effects(&mut self) -> Vec<ExplosionEffect> {
        std::mem::take(&mut self.effects)
    }
}

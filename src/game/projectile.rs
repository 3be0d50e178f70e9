//! Per-projectile kinematic and lifecycle state

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::game::profile::{ProfileId, ProjectileProfile};
use crate::game::registry::EntityId;
use crate::util::math::inverse_lerp;

/// Compact wire identifier: the slot index in the pool
pub type WireId = u16;

/// Reference to one occupancy of a pool slot.
///
/// The generation changes every time the slot is acquired, so a handle kept
/// past its projectile's termination no longer matches the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectileHandle {
    pub index: WireId,
    pub generation: u32,
}

/// Projectile record.
///
/// Lives in a pool slot for its whole life; free slots keep their last
/// values with `alive == false` until reacquired.
#[derive(Debug, Clone)]
pub struct Projectile {
    // === HOT FIELDS (touched every tick) ===
    pub position: Vec3,
    pub velocity: Vec3,
    /// Travel direction at fire time, kept for damage direction and
    /// explosion orientation
    pub forward: Vec3,
    pub age: f32,
    pub max_lifetime: f32,
    /// Signed: -1 after the last allowed hit means the next impact terminates
    pub remaining_bounces: i32,
    pub alive: bool,

    // === COLD FIELDS ===
    pub profile: ProfileId,
    pub owner: EntityId,
    pub generation: u32,
}

impl Projectile {
    /// An unoccupied slot record
    pub fn vacant() -> Self {
        Self {
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            forward: Vec3::Z,
            age: 0.0,
            max_lifetime: 0.0,
            remaining_bounces: 0,
            alive: false,
            profile: ProfileId(0),
            owner: 0,
            generation: 0,
        }
    }

    /// Reset kinematic state for a fresh launch
    pub fn launch(
        &mut self,
        profile_id: ProfileId,
        profile: &ProjectileProfile,
        position: Vec3,
        direction: Vec3,
        owner: EntityId,
    ) {
        let forward = direction.normalize_or_zero();
        self.position = position;
        self.velocity = forward * profile.speed;
        self.forward = forward;
        self.age = 0.0;
        self.max_lifetime = profile.max_lifetime;
        self.remaining_bounces = profile.max_bounces;
        self.profile = profile_id;
        self.owner = owner;
    }

    /// Normalized age in [0, 1]
    #[inline]
    pub fn life_lerp(&self) -> f32 {
        inverse_lerp(0.0, self.max_lifetime, self.age)
    }

    /// Direction of travel: current velocity, or the launch direction when
    /// the projectile has stopped
    #[inline]
    pub fn travel_direction(&self) -> Vec3 {
        let dir = self.velocity.normalize_or_zero();
        if dir == Vec3::ZERO {
            self.forward
        } else {
            dir
        }
    }
}

impl Default for Projectile {
    fn default() -> Self {
        Self::vacant()
    }
}

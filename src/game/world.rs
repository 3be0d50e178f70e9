//! Collision world boundary
//!
//! The resolver and the explosion cascade only see the world through
//! [`CollisionWorld`]: one batched sweep per tick plus sphere overlaps and
//! linecasts for area damage. [`crate::game::scene::StaticScene`] is the
//! in-process implementation.

use std::future::Future;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::game::registry::EntityId;

pub type ColliderId = u32;
pub type BodyId = u32;

/// Collision layers used to filter queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const NONE: Self = Self(0);
    /// Static level geometry
    pub const WORLD: Self = Self(1 << 0);
    /// Damageable bodies (players, dummies)
    pub const ENTITY: Self = Self(1 << 1);
    /// Props that block line of sight but take no damage
    pub const COVER: Self = Self(1 << 2);
    pub const ALL: Self = Self(u32::MAX);

    /// What projectiles sweep against
    pub const PROJECTILE: Self = Self(Self::WORLD.0 | Self::ENTITY.0 | Self::COVER.0);
    /// What blocks an explosion's line of sight
    pub const OBSTRUCTION: Self = Self(Self::WORLD.0 | Self::ENTITY.0 | Self::COVER.0);

    #[inline]
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

/// One swept-sphere query in a batch
#[derive(Debug, Clone, Copy)]
pub struct SweepQuery {
    pub origin: Vec3,
    /// Unit direction (zero for a stationary sweep)
    pub direction: Vec3,
    pub distance: f32,
    pub radius: f32,
    pub mask: LayerMask,
    /// Bodies owned by this entity are never reported
    pub ignore_entity: Option<EntityId>,
}

/// Contact reported by a sweep or linecast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Contact point on the surface
    pub point: Vec3,
    /// Surface normal at the contact, pointing away from the surface
    pub normal: Vec3,
    /// Distance travelled along the query before contact
    pub distance: f32,
    pub collider: ColliderId,
    /// Physical body the collider belongs to; `None` for static surfaces
    pub body: Option<BodyId>,
}

/// Results of a batched sweep: `max_hits` slots per query, in query order.
///
/// Within a query's slots hits are sorted by increasing distance; the first
/// empty slot ends the list. A buffer shorter than expected simply has no
/// more hits for the missing queries.
#[derive(Debug, Clone, Default)]
pub struct HitBuffer {
    max_hits: usize,
    slots: Vec<Option<Hit>>,
}

impl HitBuffer {
    pub fn new(max_hits: usize, slots: Vec<Option<Hit>>) -> Self {
        Self { max_hits, slots }
    }

    pub fn max_hits(&self) -> usize {
        self.max_hits
    }

    /// Raw hit slots for query `index` (possibly shorter than `max_hits`)
    pub fn slots_for(&self, index: usize) -> &[Option<Hit>] {
        let start = (index * self.max_hits).min(self.slots.len());
        let end = (start + self.max_hits).min(self.slots.len());
        &self.slots[start..end]
    }

    /// Hits for query `index`, stopping at the first empty slot
    pub fn hits_for(&self, index: usize) -> impl Iterator<Item = &Hit> {
        self.slots_for(index).iter().map_while(|slot| slot.as_ref())
    }
}

/// Collider found by a sphere overlap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overlap {
    pub collider: ColliderId,
    pub body: Option<BodyId>,
}

/// Spatial queries the projectile engine needs from the physics world.
pub trait CollisionWorld: Send + Sync {
    /// Sweep every query in one batch, returning up to `max_hits` hits per
    /// query. Completing the future is the resolver's only suspension point
    /// in a tick.
    fn sweep_batch(
        &self,
        queries: &[SweepQuery],
        max_hits: usize,
    ) -> impl Future<Output = HitBuffer> + Send;

    /// Colliders overlapping a sphere, at most `max_results`
    fn overlap_sphere(
        &self,
        centre: Vec3,
        radius: f32,
        mask: LayerMask,
        max_results: usize,
    ) -> Vec<Overlap>;

    /// First hit along the segment `from -> to`
    fn linecast(&self, from: Vec3, to: Vec3, mask: LayerMask) -> Option<Hit>;

    /// Entity a body belongs to, if any
    fn body_entity(&self, body: BodyId) -> Option<EntityId>;

    /// World-space centre of mass of a body
    fn body_centre_of_mass(&self, body: BodyId) -> Option<Vec3>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(distance: f32) -> Hit {
        Hit {
            point: Vec3::ZERO,
            normal: Vec3::Y,
            distance,
            collider: 0,
            body: None,
        }
    }

    #[test]
    fn test_hits_stop_at_first_empty_slot() {
        let buffer = HitBuffer::new(3, vec![Some(hit(1.0)), None, Some(hit(2.0))]);
        let hits: Vec<_> = buffer.hits_for(0).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].distance, 1.0);
    }

    #[test]
    fn test_short_buffer_means_no_hits() {
        let buffer = HitBuffer::new(2, vec![Some(hit(1.0)), Some(hit(2.0)), Some(hit(0.5))]);
        assert_eq!(buffer.hits_for(0).count(), 2);
        // Second query only got one of its two slots
        assert_eq!(buffer.hits_for(1).count(), 1);
        assert_eq!(buffer.hits_for(5).count(), 0);
    }

    #[test]
    fn test_layer_mask() {
        assert!(LayerMask::PROJECTILE.intersects(LayerMask::WORLD));
        assert!(!LayerMask::WORLD.intersects(LayerMask::ENTITY));
        assert!(LayerMask::OBSTRUCTION.intersects(LayerMask::COVER));
        assert!(!LayerMask::NONE.intersects(LayerMask::ALL));
    }
}

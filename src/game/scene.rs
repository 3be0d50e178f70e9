//! In-process collision world made of planes and spheres
//!
//! Good enough for the server binary, tests and benchmarks: infinite planes
//! for level geometry, spheres for bodies and cover. Batched sweeps run one
//! rayon task per query and keep results in query order.

use std::future::{ready, Future};

use glam::Vec3;
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::game::registry::EntityId;
use crate::game::world::{
    BodyId, ColliderId, CollisionWorld, Hit, HitBuffer, LayerMask, Overlap, SweepQuery,
};

/// Inline capacity for candidate hits gathered per query
const CANDIDATE_INLINE: usize = 8;

#[derive(Debug, Clone, Copy)]
pub enum Shape {
    /// Infinite plane `normal . x = offset`; the solid side is behind it
    Plane { normal: Vec3, offset: f32 },
    Sphere { centre: Vec3, radius: f32 },
}

#[derive(Debug, Clone, Copy)]
pub struct Collider {
    pub shape: Shape,
    pub layer: LayerMask,
    pub body: Option<BodyId>,
}

/// Physical body; colliders attach to it
#[derive(Debug, Clone, Copy)]
pub struct Body {
    pub entity: Option<EntityId>,
    pub centre_of_mass: Vec3,
}

#[derive(Debug, Clone, Default)]
pub struct StaticScene {
    colliders: Vec<Collider>,
    bodies: Vec<Body>,
}

impl StaticScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Infinite plane through `point` facing `normal`
    pub fn add_plane(&mut self, normal: Vec3, point: Vec3, layer: LayerMask) -> ColliderId {
        let normal = normal.normalize_or_zero();
        self.push_collider(Collider {
            shape: Shape::Plane {
                normal,
                offset: normal.dot(point),
            },
            layer,
            body: None,
        })
    }

    pub fn add_sphere(
        &mut self,
        centre: Vec3,
        radius: f32,
        layer: LayerMask,
        body: Option<BodyId>,
    ) -> ColliderId {
        self.push_collider(Collider {
            shape: Shape::Sphere { centre, radius },
            layer,
            body,
        })
    }

    pub fn add_body(&mut self, entity: Option<EntityId>, centre_of_mass: Vec3) -> BodyId {
        self.bodies.push(Body {
            entity,
            centre_of_mass,
        });
        (self.bodies.len() - 1) as BodyId
    }

    /// Damageable sphere: a body for `entity` with one sphere collider
    pub fn add_entity_sphere(&mut self, entity: EntityId, centre: Vec3, radius: f32) -> BodyId {
        let body = self.add_body(Some(entity), centre);
        self.add_sphere(centre, radius, LayerMask::ENTITY, Some(body));
        body
    }

    fn push_collider(&mut self, collider: Collider) -> ColliderId {
        self.colliders.push(collider);
        (self.colliders.len() - 1) as ColliderId
    }

    pub fn collider(&self, id: ColliderId) -> Option<&Collider> {
        self.colliders.get(id as usize)
    }

    pub fn collider_count(&self) -> usize {
        self.colliders.len()
    }

    fn is_ignored(&self, collider: &Collider, ignore: Option<EntityId>) -> bool {
        match (ignore, collider.body) {
            (Some(entity), Some(body)) => self.body_entity(body) == Some(entity),
            _ => false,
        }
    }

    /// Every hit for one query, nearest first
    fn sweep_one(&self, query: &SweepQuery) -> SmallVec<[Hit; CANDIDATE_INLINE]> {
        let mut hits: SmallVec<[Hit; CANDIDATE_INLINE]> = SmallVec::new();
        for (id, collider) in self.colliders.iter().enumerate() {
            if !collider.layer.intersects(query.mask) || self.is_ignored(collider, query.ignore_entity) {
                continue;
            }
            if let Some(hit) = sweep_collider(collider, id as ColliderId, query) {
                hits.push(hit);
            }
        }
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }
}

/// Swept sphere against one collider. Only approaching contacts count, so a
/// sphere resting on a surface it is leaving is not hit again.
fn sweep_collider(collider: &Collider, id: ColliderId, q: &SweepQuery) -> Option<Hit> {
    let (t, normal, point) = match collider.shape {
        Shape::Plane { normal, offset } => {
            let separation = normal.dot(q.origin) - offset;
            let approach = q.direction.dot(normal);
            if approach >= 0.0 || separation < -q.radius {
                return None;
            }
            let t = ((separation - q.radius) / -approach).max(0.0);
            let centre = q.origin + q.direction * t;
            (t, normal, centre - normal * q.radius)
        }
        Shape::Sphere { centre, radius } => {
            let reach = radius + q.radius;
            let m = q.origin - centre;
            let b = m.dot(q.direction);
            let c = m.length_squared() - reach * reach;

            let t = if c <= 0.0 {
                // Starting inside: only a contact if heading further in
                if b >= 0.0 {
                    return None;
                }
                0.0
            } else {
                if b > 0.0 {
                    return None;
                }
                let disc = b * b - c;
                if disc < 0.0 {
                    return None;
                }
                -b - disc.sqrt()
            };

            let contact = q.origin + q.direction * t;
            let mut normal = (contact - centre).normalize_or_zero();
            if normal == Vec3::ZERO {
                normal = -q.direction;
            }
            (t, normal, centre + normal * radius)
        }
    };

    if t > q.distance {
        return None;
    }
    Some(Hit {
        point,
        normal,
        distance: t,
        collider: id,
        body: collider.body,
    })
}

fn overlaps(collider: &Collider, centre: Vec3, radius: f32) -> bool {
    match collider.shape {
        Shape::Plane { normal, offset } => (normal.dot(centre) - offset).abs() <= radius,
        Shape::Sphere {
            centre: c,
            radius: r,
        } => c.distance_squared(centre) <= (r + radius) * (r + radius),
    }
}

impl CollisionWorld for StaticScene {
    fn sweep_batch(
        &self,
        queries: &[SweepQuery],
        max_hits: usize,
    ) -> impl Future<Output = HitBuffer> + Send {
        let per_query: Vec<SmallVec<[Hit; CANDIDATE_INLINE]>> =
            queries.par_iter().map(|q| self.sweep_one(q)).collect();

        let mut slots = Vec::with_capacity(queries.len() * max_hits);
        for hits in per_query {
            let taken = hits.len().min(max_hits);
            slots.extend(hits.into_iter().take(max_hits).map(Some));
            slots.extend(std::iter::repeat(None).take(max_hits - taken));
        }
        ready(HitBuffer::new(max_hits, slots))
    }

    fn overlap_sphere(
        &self,
        centre: Vec3,
        radius: f32,
        mask: LayerMask,
        max_results: usize,
    ) -> Vec<Overlap> {
        self.colliders
            .iter()
            .enumerate()
            .filter(|(_, c)| c.layer.intersects(mask) && overlaps(c, centre, radius))
            .take(max_results)
            .map(|(id, c)| Overlap {
                collider: id as ColliderId,
                body: c.body,
            })
            .collect()
    }

    fn linecast(&self, from: Vec3, to: Vec3, mask: LayerMask) -> Option<Hit> {
        let delta = to - from;
        let query = SweepQuery {
            origin: from,
            direction: delta.normalize_or_zero(),
            distance: delta.length(),
            radius: 0.0,
            mask,
            ignore_entity: None,
        };
        self.sweep_one(&query).into_iter().next()
    }

    fn body_entity(&self, body: BodyId) -> Option<EntityId> {
        self.bodies.get(body as usize).and_then(|b| b.entity)
    }

    fn body_centre_of_mass(&self, body: BodyId) -> Option<Vec3> {
        self.bodies.get(body as usize).map(|b| b.centre_of_mass)
    }
}

//! Entity registry boundary
//!
//! The engine never owns damageable entities. It asks the registry whether
//! an identifier is known and hands it damage to apply; clamping, death and
//! further notification belong to the registry.

use glam::Vec3;
use hashbrown::HashMap;

/// Stable entity identifier
pub type EntityId = u64;

/// Damage sink consulted by the resolver and the explosion cascade.
///
/// May be called any number of times per tick, once per hit, with no
/// batching.
pub trait EntityRegistry {
    /// Whether `id` names a live damageable entity
    fn contains(&self, id: EntityId) -> bool;

    /// Apply `amount` damage at `point`, pushed along `direction` (unit or
    /// zero). Returns false if the entity is unknown.
    fn apply_damage(&mut self, id: EntityId, amount: f32, point: Vec3, direction: Vec3) -> bool;
}

/// Damage as delivered to the registry
#[derive(Debug, Clone, PartialEq)]
pub struct DamageEvent {
    pub entity: EntityId,
    pub amount: f32,
    pub point: Vec3,
    pub direction: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

impl Health {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn is_dead(&self) -> bool {
        self.current <= 0.0
    }
}

/// Simple health table used by the server binary and tests.
///
/// Health is clamped to `[0, max]`; every delivered hit is kept in a log
/// until drained.
#[derive(Debug, Default)]
pub struct HealthRegistry {
    entities: HashMap<EntityId, Health>,
    events: Vec<DamageEvent>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: EntityId, max_health: f32) {
        self.entities.insert(id, Health::new(max_health));
    }

    pub fn remove(&mut self, id: EntityId) -> Option<Health> {
        self.entities.remove(&id)
    }

    pub fn health(&self, id: EntityId) -> Option<Health> {
        self.entities.get(&id).copied()
    }

    /// Total damage delivered to `id` since the log was last drained
    pub fn damage_taken(&self, id: EntityId) -> f32 {
        self.events
            .iter()
            .filter(|e| e.entity == id)
            .map(|e| e.amount)
            .sum()
    }

    pub fn events(&self) -> &[DamageEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<DamageEvent> {
        std::mem::take(&mut self.events)
    }

    /// Restore every entity to full health
    pub fn reset_health(&mut self) {
        for health in self.entities.values_mut() {
            health.current = health.max;
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl EntityRegistry for HealthRegistry {
    fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    fn apply_damage(&mut self, id: EntityId, amount: f32, point: Vec3, direction: Vec3) -> bool {
        let Some(health) = self.entities.get_mut(&id) else {
            return false;
        };
        health.current = (health.current - amount).clamp(0.0, health.max);
        self.events.push(DamageEvent {
            entity: id,
            amount,
            point,
            direction,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_damage_clamps_to_zero() {
        let mut reg = HealthRegistry::new();
        reg.insert(1, 100.0);

        assert!(reg.apply_damage(1, 30.0, Vec3::ZERO, Vec3::X));
        assert_eq!(reg.health(1).unwrap().current, 70.0);

        reg.apply_damage(1, 500.0, Vec3::ZERO, Vec3::X);
        assert_eq!(reg.health(1).unwrap().current, 0.0);
        assert!(reg.health(1).unwrap().is_dead());
    }

    #[test]
    fn test_unknown_entity_rejected() {
        let mut reg = HealthRegistry::new();
        assert!(!reg.contains(5));
        assert!(!reg.apply_damage(5, 10.0, Vec3::ZERO, Vec3::X));
        assert!(reg.events().is_empty());
    }

    #[test]
    fn test_event_log() {
        let mut reg = HealthRegistry::new();
        reg.insert(1, 100.0);
        reg.insert(2, 100.0);
        reg.apply_damage(1, 10.0, Vec3::ZERO, Vec3::X);
        reg.apply_damage(2, 5.0, Vec3::ZERO, Vec3::X);
        reg.apply_damage(1, 2.5, Vec3::ZERO, Vec3::X);

        assert_eq!(reg.damage_taken(1), 12.5);
        assert_eq!(reg.drain_events().len(), 3);
        assert_eq!(reg.damage_taken(1), 0.0);
    }

    #[test]
    fn test_reset_health() {
        let mut reg = HealthRegistry::new();
        reg.insert(1, 50.0);
        reg.apply_damage(1, 20.0, Vec3::ZERO, Vec3::X);
        reg.reset_health();
        assert_eq!(reg.health(1).unwrap().current, 50.0);
    }
}

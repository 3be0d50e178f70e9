//! Immutable tuning data for projectiles and explosions
//!
//! Profiles are addressed by compact ids so records and wire messages carry a
//! `u16` instead of the data itself. The catalog is built once at startup
//! (built-in or from JSON) and shared read-only behind an `Arc`.

use serde::{Deserialize, Serialize};

use crate::util::math::lerp;

/// Projectile profile identifier (index into the catalog)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProfileId(pub u16);

/// Explosion profile identifier (index into the catalog)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExplosionId(pub u16);

/// Piecewise-linear curve over a normalized input.
///
/// Keys are `(time, value)` pairs sorted by time. Evaluation clamps to the
/// first/last key outside the keyed range. Deserialized curves go through
/// [`Curve::new`] so key order in the source does not matter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "CurveKeys")]
pub struct Curve {
    keys: Vec<(f32, f32)>,
}

#[derive(Deserialize)]
struct CurveKeys {
    keys: Vec<(f32, f32)>,
}

impl From<CurveKeys> for Curve {
    fn from(raw: CurveKeys) -> Self {
        Self::new(raw.keys)
    }
}

impl Curve {
    /// Build a curve from keys; keys are sorted by time
    pub fn new(mut keys: Vec<(f32, f32)>) -> Self {
        keys.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { keys }
    }

    /// Same value everywhere
    pub fn constant(value: f32) -> Self {
        Self::new(vec![(0.0, value)])
    }

    /// 0 at t=0 rising to 1 at t=1
    pub fn linear() -> Self {
        Self::new(vec![(0.0, 0.0), (1.0, 1.0)])
    }

    pub fn evaluate(&self, t: f32) -> f32 {
        let (first, last) = match (self.keys.first(), self.keys.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return 0.0,
        };
        if t <= first.0 {
            return first.1;
        }
        if t >= last.0 {
            return last.1;
        }

        for pair in self.keys.windows(2) {
            let (t0, v0) = pair[0];
            let (t1, v1) = pair[1];
            if t <= t1 {
                let span = t1 - t0;
                if span <= f32::EPSILON {
                    return v1;
                }
                return lerp(v0, v1, (t - t0) / span);
            }
        }
        last.1
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn is_finite(&self) -> bool {
        self.keys.iter().all(|(t, v)| t.is_finite() && v.is_finite())
    }
}

impl Default for Curve {
    fn default() -> Self {
        Self::linear()
    }
}

/// Area damage tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplosionProfile {
    pub name: String,
    pub radius: f32,
    pub max_damage: f32,
    /// Scale applied when the blast reaches the entity that caused it
    pub self_damage_multiplier: f32,
    /// Scale for destructible scenery; carried for scenery systems
    #[serde(default = "default_multiplier")]
    pub environment_damage_multiplier: f32,
    /// Damage falloff over normalized distance (0 = centre, 1 = edge);
    /// 0 means full damage, 1 means none
    #[serde(default = "Curve::linear")]
    pub falloff: Curve,
}

fn default_multiplier() -> f32 {
    1.0
}

/// Projectile tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectileProfile {
    pub name: String,
    /// Muzzle speed in units per second
    pub speed: f32,
    /// Multiplier on world gravity
    #[serde(default)]
    pub gravity_scale: f32,
    /// Linear drag coefficient per second
    #[serde(default)]
    pub drag: f32,
    /// Sweep radius
    pub radius: f32,
    pub min_damage: f32,
    pub max_damage: f32,
    /// Blend between min and max damage over normalized age
    #[serde(default = "Curve::linear")]
    pub damage_over_life: Curve,
    /// Seconds before the projectile expires
    pub max_lifetime: f32,
    /// Bounces allowed before the next impact terminates it
    #[serde(default)]
    pub max_bounces: i32,
    /// Fraction of normal speed kept on a bounce
    #[serde(default)]
    pub bounciness: f32,
    /// Any entity hit terminates the projectile
    #[serde(default)]
    pub cannot_bounce_on_entity: bool,
    /// Explode at the current position when lifetime runs out
    #[serde(default)]
    pub explode_on_expire: bool,
    #[serde(default)]
    pub explosion: Option<ExplosionId>,
}

impl ProjectileProfile {
    /// Direct-hit damage for a projectile at normalized age `life_lerp`
    pub fn damage_at(&self, life_lerp: f32) -> f32 {
        lerp(self.min_damage, self.max_damage, self.damage_over_life.evaluate(life_lerp))
    }
}

impl Default for ProjectileProfile {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            speed: 50.0,
            gravity_scale: 1.0,
            drag: 0.0,
            radius: 0.1,
            min_damage: 10.0,
            max_damage: 10.0,
            damage_over_life: Curve::linear(),
            max_lifetime: 5.0,
            max_bounces: 0,
            bounciness: 0.0,
            cannot_bounce_on_entity: false,
            explode_on_expire: false,
            explosion: None,
        }
    }
}

/// Errors raised while loading or validating a catalog
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Profile '{name}': {reason}")]
    InvalidProfile { name: String, reason: String },
    #[error("Explosion '{name}': {reason}")]
    InvalidExplosion { name: String, reason: String },
    #[error("Profile '{name}' references missing explosion {id}")]
    MissingExplosion { name: String, id: u16 },
    #[error("Too many entries: {0} (max {max})", max = u16::MAX)]
    TooManyEntries(usize),
    #[error("Catalog parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// All projectile and explosion profiles known to the engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileCatalog {
    #[serde(default)]
    projectiles: Vec<ProjectileProfile>,
    #[serde(default)]
    explosions: Vec<ExplosionProfile>,
}

impl ProfileCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an explosion profile and return its id
    pub fn add_explosion(&mut self, profile: ExplosionProfile) -> ExplosionId {
        self.explosions.push(profile);
        ExplosionId((self.explosions.len() - 1) as u16)
    }

    /// Register a projectile profile and return its id
    pub fn add_projectile(&mut self, profile: ProjectileProfile) -> ProfileId {
        self.projectiles.push(profile);
        ProfileId((self.projectiles.len() - 1) as u16)
    }

    #[inline]
    pub fn projectile(&self, id: ProfileId) -> Option<&ProjectileProfile> {
        self.projectiles.get(id.0 as usize)
    }

    #[inline]
    pub fn explosion(&self, id: ExplosionId) -> Option<&ExplosionProfile> {
        self.explosions.get(id.0 as usize)
    }

    pub fn projectile_count(&self) -> usize {
        self.projectiles.len()
    }

    pub fn explosion_count(&self) -> usize {
        self.explosions.len()
    }

    /// Look up a projectile profile id by name
    pub fn find_projectile(&self, name: &str) -> Option<ProfileId> {
        self.projectiles
            .iter()
            .position(|p| p.name == name)
            .map(|i| ProfileId(i as u16))
    }

    /// Parse and validate a catalog from JSON
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Check every profile for values the simulation cannot handle
    pub fn validate(&self) -> Result<(), CatalogError> {
        let too_many = self.projectiles.len().max(self.explosions.len());
        if too_many > u16::MAX as usize {
            return Err(CatalogError::TooManyEntries(too_many));
        }

        for e in &self.explosions {
            let bad = |reason: &str| CatalogError::InvalidExplosion {
                name: e.name.clone(),
                reason: reason.to_string(),
            };
            if !(e.radius > 0.0) {
                return Err(bad("radius must be positive"));
            }
            if e.max_damage < 0.0 || e.self_damage_multiplier < 0.0 {
                return Err(bad("damage values must not be negative"));
            }
            if e.falloff.is_empty() {
                return Err(bad("falloff curve has no keys"));
            }
            if !e.falloff.is_finite() {
                return Err(bad("falloff curve keys must be finite"));
            }
        }

        for p in &self.projectiles {
            let bad = |reason: &str| CatalogError::InvalidProfile {
                name: p.name.clone(),
                reason: reason.to_string(),
            };
            if !(p.max_lifetime > 0.0) {
                return Err(bad("max_lifetime must be positive"));
            }
            if p.radius < 0.0 || p.speed < 0.0 || p.drag < 0.0 {
                return Err(bad("radius, speed and drag must not be negative"));
            }
            if !(0.0..=1.0).contains(&p.bounciness) {
                return Err(bad("bounciness must be within [0, 1]"));
            }
            if p.max_bounces < 0 {
                return Err(bad("max_bounces must not be negative"));
            }
            if !p.damage_over_life.is_finite() {
                return Err(bad("damage_over_life keys must be finite"));
            }
            if let Some(id) = p.explosion {
                if self.explosion(id).is_none() {
                    return Err(CatalogError::MissingExplosion {
                        name: p.name.clone(),
                        id: id.0,
                    });
                }
            }
        }
        Ok(())
    }

    /// Built-in profiles used by the server binary when no catalog file is set
    pub fn demo() -> Self {
        let mut catalog = Self::new();

        let frag = catalog.add_explosion(ExplosionProfile {
            name: "frag".to_string(),
            radius: 5.0,
            max_damage: 80.0,
            self_damage_multiplier: 0.5,
            environment_damage_multiplier: 2.0,
            falloff: Curve::linear(),
        });

        catalog.add_projectile(ProjectileProfile {
            name: "rifle_round".to_string(),
            speed: 120.0,
            gravity_scale: 0.1,
            drag: 0.01,
            radius: 0.05,
            min_damage: 12.0,
            max_damage: 25.0,
            // Full damage early, dropping off with age
            damage_over_life: Curve::new(vec![(0.0, 1.0), (1.0, 0.0)]),
            max_lifetime: 2.0,
            ..ProjectileProfile::default()
        });

        catalog.add_projectile(ProjectileProfile {
            name: "grenade".to_string(),
            speed: 20.0,
            gravity_scale: 1.0,
            drag: 0.2,
            radius: 0.15,
            min_damage: 5.0,
            max_damage: 5.0,
            max_lifetime: 3.0,
            max_bounces: 3,
            bounciness: 0.5,
            cannot_bounce_on_entity: true,
            explode_on_expire: true,
            explosion: Some(frag),
            ..ProjectileProfile::default()
        });

        catalog.add_projectile(ProjectileProfile {
            name: "rocket".to_string(),
            speed: 40.0,
            gravity_scale: 0.0,
            radius: 0.2,
            min_damage: 30.0,
            max_damage: 30.0,
            damage_over_life: Curve::constant(1.0),
            max_lifetime: 4.0,
            explosion: Some(frag),
            ..ProjectileProfile::default()
        });

        catalog
    }
}

//! Weapons built from small capabilities
//!
//! A weapon is a fire-control state machine plus optional ammunition and an
//! optional projectile launcher. Anything that fires goes through the
//! [`CanFire`] capability; launchers turn shots into [`SpawnRequest`]s for
//! the projectile manager.

use crossbeam_channel::{unbounded, Receiver, Sender};
use glam::Vec3;
use tracing::debug;

use crate::game::constants::weapon::MAX_ROUNDS_PER_MINUTE;
use crate::game::manager::SpawnRequest;
use crate::game::profile::ProfileId;
use crate::game::registry::EntityId;

/// Something with a trigger
pub trait CanFire {
    /// Whether a pull right now would fire
    fn can_fire(&self) -> bool;

    /// Advance by `dt` with the trigger held or not; true if a shot fired
    fn update_trigger(&mut self, trigger: bool, dt: f32) -> bool;
}

pub trait HasAmmo {
    fn ammunition(&self) -> u32;

    /// Take one attack's worth of ammunition; false if there is not enough
    fn consume_attack(&mut self) -> bool;
}

pub trait HasMuzzlePoint {
    /// World-space muzzle position
    fn muzzle_point(&self) -> Vec3;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FireMode {
    /// One shot per trigger pull
    SemiAuto,
    /// Fires for as long as the trigger is held
    FullAuto,
    /// A pull fires `shots` rounds, then waits `time_between_bursts`
    Burst { shots: u32, time_between_bursts: f32 },
}

/// Rate-of-fire state machine
#[derive(Debug, Clone)]
pub struct FireControl {
    rounds_per_minute: u32,
    time_between_rounds: f32,
    mode: FireMode,
    fire_timer: f32,
    /// Set by a shot, cleared on trigger release (semi-auto)
    fired: bool,
    burst_rounds_fired: u32,
    burst_cooldown: f32,
}

impl FireControl {
    /// `rounds_per_minute` is clamped to `0..=3000`; zero never fires
    pub fn new(rounds_per_minute: u32, mode: FireMode) -> Self {
        let rounds_per_minute = rounds_per_minute.min(MAX_ROUNDS_PER_MINUTE);
        let time_between_rounds = if rounds_per_minute == 0 {
            f32::INFINITY
        } else {
            60.0 / rounds_per_minute as f32
        };
        Self {
            rounds_per_minute,
            time_between_rounds,
            mode,
            // Ready to fire straight away
            fire_timer: time_between_rounds,
            fired: false,
            burst_rounds_fired: 0,
            burst_cooldown: 0.0,
        }
    }

    pub fn rounds_per_minute(&self) -> u32 {
        self.rounds_per_minute
    }

    pub fn time_between_rounds(&self) -> f32 {
        self.time_between_rounds
    }

    pub fn mode(&self) -> FireMode {
        self.mode
    }

    fn burst_in_progress(&self) -> bool {
        self.burst_rounds_fired > 0
    }
}

impl CanFire for FireControl {
    fn can_fire(&self) -> bool {
        if self.rounds_per_minute == 0 || self.fire_timer < self.time_between_rounds {
            return false;
        }
        match self.mode {
            FireMode::FullAuto => true,
            FireMode::SemiAuto => !self.fired,
            FireMode::Burst { .. } => {
                self.burst_in_progress() || (!self.fired && self.burst_cooldown <= 0.0)
            }
        }
    }

    fn update_trigger(&mut self, trigger: bool, dt: f32) -> bool {
        if self.burst_cooldown > 0.0 {
            self.burst_cooldown -= dt;
        }

        let mut shot = false;
        if (trigger || self.burst_in_progress()) && self.can_fire() {
            shot = true;
            self.fired = true;
            // Carry over any excess so long frames do not lose rate
            self.fire_timer %= self.time_between_rounds;

            if let FireMode::Burst {
                shots,
                time_between_bursts,
            } = self.mode
            {
                self.burst_rounds_fired += 1;
                if self.burst_rounds_fired >= shots.max(1) {
                    self.burst_rounds_fired = 0;
                    self.burst_cooldown = time_between_bursts;
                }
            }
        }

        if self.fire_timer < self.time_between_rounds {
            self.fire_timer += dt;
        }
        if !trigger {
            self.fired = false;
        }
        shot
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Magazine {
    pub ammunition: u32,
    pub ammo_per_attack: u32,
}

impl HasAmmo for Magazine {
    fn ammunition(&self) -> u32 {
        self.ammunition
    }

    fn consume_attack(&mut self) -> bool {
        if self.ammunition < self.ammo_per_attack {
            return false;
        }
        self.ammunition -= self.ammo_per_attack;
        true
    }
}

/// Projectile-spawning capability
#[derive(Debug, Clone, PartialEq)]
pub struct Launcher {
    pub profile: ProfileId,
    /// Muzzle position, updated by whoever moves the weapon
    pub muzzle: Vec3,
}

impl HasMuzzlePoint for Launcher {
    fn muzzle_point(&self) -> Vec3 {
        self.muzzle
    }
}

/// Where the holder is aiming from
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aim {
    pub shoot_point: Vec3,
    pub direction: Vec3,
}

#[derive(Debug, Clone)]
pub struct Weapon {
    pub name: String,
    pub fire_control: FireControl,
    pub magazine: Option<Magazine>,
    pub launcher: Option<Launcher>,
}

impl Weapon {
    pub fn new(name: impl Into<String>, fire_control: FireControl) -> Self {
        Self {
            name: name.into(),
            fire_control,
            magazine: None,
            launcher: None,
        }
    }

    pub fn with_magazine(mut self, magazine: Magazine) -> Self {
        self.magazine = Some(magazine);
        self
    }

    pub fn with_launcher(mut self, launcher: Launcher) -> Self {
        self.launcher = Some(launcher);
        self
    }

    /// Advance the trigger; a shot with ammunition and a launcher yields a
    /// spawn request. With `fire_from_muzzle` the simulation starts at the
    /// muzzle, otherwise at the holder's shoot point. Observers always see
    /// it leave the muzzle.
    pub fn update(
        &mut self,
        trigger: bool,
        aim: Aim,
        owner: EntityId,
        fire_from_muzzle: bool,
        dt: f32,
    ) -> Option<SpawnRequest> {
        let has_ammo = self.magazine.as_ref().map_or(true, |m| m.ammo_per_attack <= m.ammunition);
        if !self.fire_control.update_trigger(trigger && has_ammo, dt) {
            return None;
        }
        if let Some(magazine) = &mut self.magazine {
            if !magazine.consume_attack() {
                return None;
            }
        }

        let launcher = self.launcher.as_ref()?;
        let muzzle = launcher.muzzle_point();
        debug!("{} fired by entity {}", self.name, owner);
        Some(SpawnRequest {
            profile: launcher.profile,
            origin: if fire_from_muzzle { muzzle } else { aim.shoot_point },
            visual_origin: muzzle,
            direction: aim.direction,
            owner,
        })
    }
}

impl CanFire for Weapon {
    fn can_fire(&self) -> bool {
        self.fire_control.can_fire()
            && self
                .magazine
                .as_ref()
                .map_or(true, |m| m.ammo_per_attack <= m.ammunition)
    }

    fn update_trigger(&mut self, trigger: bool, dt: f32) -> bool {
        self.fire_control.update_trigger(trigger, dt)
    }
}

/// Equipment lifecycle notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EquipEvent {
    Unequipped(usize),
    Equipped(usize),
}

/// Weapons a holder carries, with at most one equipped.
///
/// Switching always emits `Unequipped(previous)` before `Equipped(next)`.
pub struct Loadout {
    weapons: Vec<Weapon>,
    equipped: Option<usize>,
    events: Sender<EquipEvent>,
    receiver: Receiver<EquipEvent>,
}

impl Loadout {
    pub fn new(weapons: Vec<Weapon>) -> Self {
        let (events, receiver) = unbounded();
        Self {
            weapons,
            equipped: None,
            events,
            receiver,
        }
    }

    /// Equip slot `index`. Returns false for an unknown slot; selecting the
    /// equipped slot again is a no-op.
    pub fn select(&mut self, index: usize) -> bool {
        if index >= self.weapons.len() {
            return false;
        }
        if self.equipped == Some(index) {
            return true;
        }
        if let Some(previous) = self.equipped.take() {
            self.emit(EquipEvent::Unequipped(previous));
        }
        self.equipped = Some(index);
        self.emit(EquipEvent::Equipped(index));
        true
    }

    /// Put the current weapon away
    pub fn holster(&mut self) {
        if let Some(previous) = self.equipped.take() {
            self.emit(EquipEvent::Unequipped(previous));
        }
    }

    fn emit(&self, event: EquipEvent) {
        // The loadout holds a receiver, so the channel cannot be disconnected
        let _ = self.events.send(event);
    }

    pub fn equipped(&self) -> Option<&Weapon> {
        let index = self.equipped?;
        self.weapons.get(index)
    }

    pub fn equipped_mut(&mut self) -> Option<&mut Weapon> {
        let index = self.equipped?;
        self.weapons.get_mut(index)
    }

    /// Listener handle for equipment events
    pub fn events(&self) -> Receiver<EquipEvent> {
        self.receiver.clone()
    }

    pub fn drain_events(&self) -> Vec<EquipEvent> {
        self.receiver.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.weapons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weapons.is_empty()
    }
}

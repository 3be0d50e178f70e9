//! Projectile pool: an arena of records plus a free-slot stack
//!
//! Slots are never removed, so indices stay valid for the life of the pool
//! and double as 16-bit wire identifiers. The pool grows in fixed chunks when
//! no free slot is left; released slots are reused before growing again.
//!
//! The pool is shared between the simulation (sole writer of records) and
//! the replication scheduler (reader) as a [`SharedPool`]. Callers must not
//! hold a guard across an `.await`, and must not cache slot indices across
//! ticks: build the live index list fresh every tick.

use std::sync::Arc;

use bitvec::prelude::*;
use glam::Vec3;
use parking_lot::RwLock;
use tracing::{debug, error, info};

use crate::game::constants::pool::{CHUNK_SIZE, INITIAL_SIZE, MAX_SLOTS};
use crate::game::profile::{ProfileId, ProjectileProfile};
use crate::game::projectile::{Projectile, ProjectileHandle, WireId};
use crate::game::registry::EntityId;

/// Pool shared between the simulation thread and the replication task
pub type SharedPool = Arc<RwLock<ProjectilePool>>;

/// Pool errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Every slot a 16-bit wire id can address is live
    #[error("Projectile pool exhausted ({0} slots live)")]
    CapacityExhausted(usize),
}

pub struct ProjectilePool {
    slots: Vec<Projectile>,
    /// Mirrors `slots[i].alive`; lets the live scan skip dead slots by word
    live: BitVec,
    /// Free slot indices, lowest index on top
    free: Vec<u32>,
    chunk_size: usize,
    live_count: usize,
}

impl ProjectilePool {
    /// Create a pool with `initial_size` slots ready for use
    pub fn new(initial_size: usize, chunk_size: usize) -> Self {
        let mut pool = Self {
            slots: Vec::with_capacity(initial_size),
            live: BitVec::with_capacity(initial_size),
            free: Vec::with_capacity(initial_size),
            chunk_size: chunk_size.max(1),
            live_count: 0,
        };
        pool.grow_by(initial_size.min(MAX_SLOTS));
        pool
    }

    pub fn shared(initial_size: usize, chunk_size: usize) -> SharedPool {
        Arc::new(RwLock::new(Self::new(initial_size, chunk_size)))
    }

    /// Append `count` vacant slots (clamped to the wire-id ceiling).
    /// Returns how many were added.
    fn grow_by(&mut self, count: usize) -> usize {
        let start = self.slots.len();
        let end = (start + count).min(MAX_SLOTS);
        if end <= start {
            return 0;
        }

        self.slots.resize_with(end, Projectile::vacant);
        self.live.resize(end, false);
        // Push in reverse so the lowest new index is handed out first
        self.free.extend((start as u32..end as u32).rev());
        end - start
    }

    /// Grow by one chunk; used when no free slot is left
    fn grow_chunk(&mut self) -> Result<(), PoolError> {
        let added = self.grow_by(self.chunk_size);
        if added == 0 {
            error!(
                "Projectile pool cannot grow past {} slots",
                self.slots.len()
            );
            return Err(PoolError::CapacityExhausted(self.live_count));
        }
        debug!(
            "Projectile pool grew by {} to {} slots",
            added,
            self.slots.len()
        );
        Ok(())
    }

    /// Take a free slot, growing the pool by one chunk if none is left.
    ///
    /// The returned slot is marked alive and its generation bumped; the
    /// caller initialises kinematic state through [`Self::get_mut`].
    pub fn acquire(&mut self, profile: ProfileId) -> Result<ProjectileHandle, PoolError> {
        if self.free.is_empty() {
            self.grow_chunk()?;
        }
        let index = match self.free.pop() {
            Some(index) => index as usize,
            None => return Err(PoolError::CapacityExhausted(self.live_count)),
        };

        let slot = &mut self.slots[index];
        debug_assert!(!slot.alive, "free list held a live slot");
        slot.alive = true;
        slot.generation = slot.generation.wrapping_add(1);
        slot.profile = profile;
        self.live.set(index, true);
        self.live_count += 1;

        Ok(ProjectileHandle {
            index: index as WireId,
            generation: slot.generation,
        })
    }

    /// Acquire a slot and launch it in one step
    pub fn spawn(
        &mut self,
        profile_id: ProfileId,
        profile: &ProjectileProfile,
        position: Vec3,
        direction: Vec3,
        owner: EntityId,
    ) -> Result<ProjectileHandle, PoolError> {
        let handle = self.acquire(profile_id)?;
        self.slots[handle.index as usize].launch(profile_id, profile, position, direction, owner);
        Ok(handle)
    }

    /// Mark a slot free. Returns false if it was already free
    /// (duplicate or late release is a no-op).
    pub fn release(&mut self, index: WireId) -> bool {
        let i = index as usize;
        match self.slots.get_mut(i) {
            Some(slot) if slot.alive => {
                slot.alive = false;
                self.live.set(i, false);
                self.free.push(index as u32);
                self.live_count -= 1;
                true
            }
            _ => false,
        }
    }

    /// Release only if the handle still names the current occupancy
    pub fn release_handle(&mut self, handle: ProjectileHandle) -> bool {
        if self.get(handle).is_some() {
            self.release(handle.index)
        } else {
            false
        }
    }

    /// Live record for a handle, if the handle is current
    pub fn get(&self, handle: ProjectileHandle) -> Option<&Projectile> {
        self.slots
            .get(handle.index as usize)
            .filter(|p| p.alive && p.generation == handle.generation)
    }

    pub fn get_mut(&mut self, handle: ProjectileHandle) -> Option<&mut Projectile> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|p| p.alive && p.generation == handle.generation)
    }

    /// Record at a slot index regardless of state
    #[inline]
    pub fn slot(&self, index: usize) -> Option<&Projectile> {
        self.slots.get(index)
    }

    /// Dense list of live slot indices, in ascending order
    pub fn live_indices(&self) -> Vec<usize> {
        self.live.iter_ones().collect()
    }

    /// Handles of every live slot
    pub fn live_handles(&self) -> Vec<ProjectileHandle> {
        self.live
            .iter_ones()
            .map(|i| ProjectileHandle {
                index: i as WireId,
                generation: self.slots[i].generation,
            })
            .collect()
    }

    /// (wire id, position) for every live slot
    pub fn live_positions(&self) -> Vec<(WireId, Vec3)> {
        self.live
            .iter_ones()
            .map(|i| (i as WireId, self.slots[i].position))
            .collect()
    }

    #[inline]
    pub fn live_count(&self) -> usize {
        self.live_count
    }

    /// Total slots, live or free
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl Default for ProjectilePool {
    fn default() -> Self {
        Self::new(INITIAL_SIZE, CHUNK_SIZE)
    }
}

/// Grow a shared pool to at least `target` slots, one chunk per step,
/// yielding to the runtime between chunks so startup never stalls the
/// simulation or replication tasks.
pub async fn prewarm(pool: &SharedPool, target: usize) -> usize {
    let target = target.min(MAX_SLOTS);
    loop {
        {
            let mut guard = pool.write();
            let capacity = guard.capacity();
            if capacity >= target {
                info!("Projectile pool ready with {} slots", capacity);
                return capacity;
            }
            let step = guard.chunk_size.min(target - capacity);
            guard.grow_by(step);
            debug!("Prewarmed projectile pool to {} slots", guard.capacity());
        }
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(initial: usize, chunk: usize) -> ProjectilePool {
        ProjectilePool::new(initial, chunk)
    }

    #[test]
    fn test_initial_capacity() {
        let p = pool(100, 25);
        assert_eq!(p.capacity(), 100);
        assert_eq!(p.free_count(), 100);
        assert_eq!(p.live_count(), 0);
    }

    #[test]
    fn test_acquire_marks_alive() {
        let mut p = pool(4, 2);
        let h = p.acquire(ProfileId(0)).unwrap();
        assert_eq!(h.index, 0);
        assert!(p.get(h).unwrap().alive);
        assert_eq!(p.live_indices(), vec![0]);
        assert_eq!(p.live_count(), 1);
    }

    #[test]
    fn test_release_recycles_slot() {
        let mut p = pool(2, 2);
        let a = p.acquire(ProfileId(0)).unwrap();
        assert!(p.release(a.index));
        assert!(!p.slot(a.index as usize).unwrap().alive);

        let b = p.acquire(ProfileId(0)).unwrap();
        assert_eq!(b.index, a.index);
        assert_ne!(b.generation, a.generation);
        assert_eq!(p.capacity(), 2);
    }

    #[test]
    fn test_double_release_is_noop() {
        let mut p = pool(2, 2);
        let a = p.acquire(ProfileId(0)).unwrap();
        assert!(p.release(a.index));
        assert!(!p.release(a.index));
        assert_eq!(p.free_count(), 2);
        assert!(!p.release(999));
    }

    #[test]
    fn test_stale_handle_rejected() {
        let mut p = pool(1, 1);
        let old = p.acquire(ProfileId(0)).unwrap();
        p.release(old.index);
        let new = p.acquire(ProfileId(0)).unwrap();

        assert!(p.get(old).is_none());
        assert!(!p.release_handle(old));
        assert!(p.get(new).is_some());
    }

    #[test]
    fn test_grows_by_chunk_when_full() {
        let mut p = pool(2, 3);
        for _ in 0..3 {
            p.acquire(ProfileId(0)).unwrap();
        }
        assert_eq!(p.capacity(), 5);
        assert_eq!(p.free_count(), 2);
    }

    #[test]
    fn test_growth_keeps_existing_indices() {
        let mut p = pool(1, 1);
        let first = p.acquire(ProfileId(0)).unwrap();
        let before = p.live_indices();
        p.acquire(ProfileId(0)).unwrap();
        assert!(p.get(first).is_some());
        assert!(p.live_indices().starts_with(&before));
    }

    #[test]
    fn test_capacity_bounded_by_peak_live() {
        // Capacity never exceeds initial + k * chunk for the smallest k that
        // covers the peak live count
        let (initial, chunk) = (10, 4);
        let mut p = pool(initial, chunk);
        let mut live = Vec::new();
        let mut peak = 0;

        for step in 0..400usize {
            // Grow in waves, shrink between them
            let wave = (step / 50) % 2 == 0;
            if wave || live.is_empty() {
                live.push(p.acquire(ProfileId(0)).unwrap());
            } else {
                let h: ProjectileHandle = live.remove(step % live.len());
                assert!(p.release(h.index));
            }
            peak = peak.max(live.len());

            let k = peak.saturating_sub(initial).div_ceil(chunk);
            assert!(p.capacity() <= initial + k * chunk);
            assert_eq!(p.live_count(), live.len());
        }
    }

    #[test]
    fn test_alive_flag_matches_live_mask() {
        let mut p = pool(8, 4);
        let handles: Vec<_> = (0..6).map(|_| p.acquire(ProfileId(0)).unwrap()).collect();
        p.release(handles[1].index);
        p.release(handles[4].index);

        for i in 0..p.capacity() {
            let alive = p.slot(i).unwrap().alive;
            assert_eq!(alive, p.live_indices().contains(&i));
        }
    }

    #[test]
    fn test_wire_id_ceiling() {
        let mut p = pool(MAX_SLOTS - 1, 10);
        assert_eq!(p.capacity(), MAX_SLOTS - 1);
        for _ in 0..MAX_SLOTS {
            p.acquire(ProfileId(0)).unwrap();
        }
        assert_eq!(p.capacity(), MAX_SLOTS);
        assert_eq!(
            p.acquire(ProfileId(0)),
            Err(PoolError::CapacityExhausted(MAX_SLOTS))
        );
    }

    #[test]
    fn test_live_positions() {
        let mut p = pool(3, 1);
        let profile = ProjectileProfile::default();
        let h = p
            .spawn(ProfileId(0), &profile, Vec3::new(1.0, 2.0, 3.0), Vec3::X, 7)
            .unwrap();
        assert_eq!(p.live_positions(), vec![(h.index, Vec3::new(1.0, 2.0, 3.0))]);
    }

    #[tokio::test]
    async fn test_prewarm_grows_in_chunks() {
        let shared = ProjectilePool::shared(10, 25);
        let capacity = prewarm(&shared, 100).await;
        assert_eq!(capacity, 100);
        assert_eq!(shared.read().free_count(), 100);

        // Already large enough: untouched
        assert_eq!(prewarm(&shared, 50).await, 100);
    }
}

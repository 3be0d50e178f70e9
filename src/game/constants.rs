/// Simulation clock and world physics
pub mod physics {
    use glam::Vec3;

    /// World gravity before per-profile scaling
    pub const GRAVITY: Vec3 = Vec3::new(0.0, -9.81, 0.0);
    /// Server tick rate in Hz
    pub const TICK_RATE: u32 = 50;
    /// Delta time per tick in seconds
    pub const DT: f32 = 1.0 / 50.0;
    /// Tick duration in milliseconds
    pub const TICK_DURATION_MS: u64 = 1000 / TICK_RATE as u64;
}

/// Projectile pool sizing
pub mod pool {
    /// Slots created eagerly at startup
    pub const INITIAL_SIZE: usize = 100;
    /// Slots added each time the pool runs out of free slots
    pub const CHUNK_SIZE: usize = 25;
    /// Hard ceiling: slot indices double as 16-bit wire identifiers
    pub const MAX_SLOTS: usize = u16::MAX as usize + 1;
}

/// Collision batch resolver
pub mod collision {
    /// Candidate hits returned per projectile by the batched sweep
    pub const MAX_HITS: usize = 4;
    /// Explosions spawned by an impact sit this far off the surface
    pub const IMPACT_SURFACE_OFFSET: f32 = 0.02;
    /// Accumulated float error tolerated when comparing age to lifetime
    /// (twenty 0.1 s ticks must expire a 2.0 s projectile on the twentieth)
    pub const LIFETIME_EPSILON: f32 = 1e-4;
}

/// Explosion cascade
pub mod explosion {
    /// Colliders processed per cascade; extra overlaps are dropped
    pub const MAX_OVERLAPS: usize = 16;
}

/// Replication scheduler pacing
pub mod replication {
    /// Entries per position batch packet (wire limit)
    pub const BATCH_SIZE: usize = 64;
    /// Interval between full-set packets while live count <= BATCH_SIZE
    pub const SHORT_INTERVAL_MS: u64 = 60;
    /// Interval between chunk packets while live count > BATCH_SIZE
    pub const LONG_INTERVAL_MS: u64 = 100;
    /// Re-check interval while there is nothing to replicate
    pub const IDLE_POLL_MS: u64 = 20;
}

/// Observer-side presentation
pub mod observer {
    /// Units per second the visual position chases the replicated target
    pub const LERP_SPEED: f32 = 10.0;
}

/// Networking constants
pub mod net {
    /// Maximum framed message size
    pub const MAX_MESSAGE_SIZE: usize = 65536;
    /// Default observer stream port
    pub const OBSERVER_PORT: u16 = 4500;
    /// Default metrics port
    pub const METRICS_PORT: u16 = 9090;
    /// Frames buffered per observer before it starts skipping
    pub const OBSERVER_BACKLOG: usize = 1024;
    /// How often the hub drains the outbound queue
    pub const PUMP_INTERVAL_MS: u64 = 5;
}

/// Weapon fire control
pub mod weapon {
    /// Upper rate-of-fire clamp; faster than this is below one tick per round
    pub const MAX_ROUNDS_PER_MINUTE: u32 = 3000;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_rate() {
        assert_eq!(physics::TICK_RATE, 50);
        assert!((physics::DT - 1.0 / 50.0).abs() < 0.0001);
        assert_eq!(physics::TICK_DURATION_MS, 20);
    }

    #[test]
    fn test_wire_ids_fit_u16() {
        assert_eq!(pool::MAX_SLOTS - 1, u16::MAX as usize);
        assert!(pool::INITIAL_SIZE <= pool::MAX_SLOTS);
    }

    #[test]
    fn test_replication_pacing() {
        assert_eq!(replication::BATCH_SIZE, 64);
        // Chunked mode trades latency for bandwidth
        assert!(replication::LONG_INTERVAL_MS > replication::SHORT_INTERVAL_MS);
    }
}

//! Volley Server Library
//!
//! Server-authoritative projectile simulation with batched collision
//! resolution, explosion cascades and paced position replication to
//! observers.
//!
//! # Features
//!
//! - `metrics_extended` - Per-hit and per-bounce counters in the hot path (enabled by default)

pub mod config;
pub mod util;
pub mod game;
pub mod net;
pub mod metrics;

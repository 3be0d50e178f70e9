use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::game::constants::{collision, explosion, net, physics, pool, replication};
use crate::net::replication::ReplicationConfig;

/// Engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Pool slots created at startup
    pub pool_initial_size: usize,
    /// Pool slots added per growth step
    pub pool_chunk_size: usize,
    /// Candidate hits per projectile per tick
    pub max_hits: usize,
    /// Colliders processed per explosion
    pub max_overlaps: usize,
    /// Positions per replication packet
    pub replication_batch_size: usize,
    pub replication_short_interval_ms: u64,
    pub replication_long_interval_ms: u64,
    pub replication_idle_poll_ms: u64,
    /// Start projectiles at the muzzle instead of the holder's shoot point
    pub fire_from_muzzle: bool,
    /// Address observers connect to
    pub observer_bind_address: IpAddr,
    pub observer_port: u16,
    pub metrics_port: u16,
    /// JSON profile catalog; the built-in demo catalog is used if unset
    pub profiles_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_rate: physics::TICK_RATE,
            pool_initial_size: pool::INITIAL_SIZE,
            pool_chunk_size: pool::CHUNK_SIZE,
            max_hits: collision::MAX_HITS,
            max_overlaps: explosion::MAX_OVERLAPS,
            replication_batch_size: replication::BATCH_SIZE,
            replication_short_interval_ms: replication::SHORT_INTERVAL_MS,
            replication_long_interval_ms: replication::LONG_INTERVAL_MS,
            replication_idle_poll_ms: replication::IDLE_POLL_MS,
            fire_from_muzzle: false,
            observer_bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            observer_port: net::OBSERVER_PORT,
            metrics_port: net::METRICS_PORT,
            profiles_path: None,
        }
    }
}

/// Configuration rejected by [`EngineConfig::validate`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value}")]
    OutOfRange {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("Replication long interval ({long} ms) must not be shorter than the short interval ({short} ms)")]
    IntervalOrder { short: u64, long: u64 },
}

impl EngineConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from any variable source; invalid values keep the
    /// default and log a warning
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let env = Lookup(lookup);

        env.parse("TICK_RATE", "1-1000", |v: &u32| (1..=1000).contains(v), &mut config.tick_rate);
        env.parse(
            "POOL_INITIAL_SIZE",
            "1-65536",
            |v: &usize| (1..=pool::MAX_SLOTS).contains(v),
            &mut config.pool_initial_size,
        );
        env.parse("POOL_CHUNK_SIZE", "> 0", |v: &usize| *v > 0, &mut config.pool_chunk_size);
        env.parse("MAX_HITS", "1-64", |v: &usize| (1..=64).contains(v), &mut config.max_hits);
        env.parse("MAX_OVERLAPS", "> 0", |v: &usize| *v > 0, &mut config.max_overlaps);
        env.parse(
            "REPLICATION_BATCH_SIZE",
            "1-64",
            |v: &usize| (1..=replication::BATCH_SIZE).contains(v),
            &mut config.replication_batch_size,
        );
        env.parse(
            "REPLICATION_SHORT_INTERVAL_MS",
            "> 0",
            |v: &u64| *v > 0,
            &mut config.replication_short_interval_ms,
        );
        env.parse(
            "REPLICATION_LONG_INTERVAL_MS",
            "> 0",
            |v: &u64| *v > 0,
            &mut config.replication_long_interval_ms,
        );
        env.parse(
            "REPLICATION_IDLE_POLL_MS",
            "> 0",
            |v: &u64| *v > 0,
            &mut config.replication_idle_poll_ms,
        );
        env.parse("FIRE_FROM_MUZZLE", "true or false", |_: &bool| true, &mut config.fire_from_muzzle);
        env.parse(
            "OBSERVER_BIND_ADDRESS",
            "an IP address",
            |_: &IpAddr| true,
            &mut config.observer_bind_address,
        );
        env.parse("OBSERVER_PORT", "> 0", |v: &u16| *v > 0, &mut config.observer_port);
        env.parse("METRICS_PORT", "> 0", |v: &u16| *v > 0, &mut config.metrics_port);

        if let Some(path) = env.get("PROFILES_PATH") {
            if !path.is_empty() {
                config.profiles_path = Some(PathBuf::from(path));
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn check<T: ToString>(
            ok: bool,
            name: &'static str,
            expected: &'static str,
            value: T,
        ) -> Result<(), ConfigError> {
            if ok {
                Ok(())
            } else {
                Err(ConfigError::OutOfRange {
                    name,
                    expected,
                    value: value.to_string(),
                })
            }
        }

        check((1..=1000).contains(&self.tick_rate), "tick_rate", "1-1000", self.tick_rate)?;
        check(
            (1..=pool::MAX_SLOTS).contains(&self.pool_initial_size),
            "pool_initial_size",
            "1-65536",
            self.pool_initial_size,
        )?;
        check(self.pool_chunk_size > 0, "pool_chunk_size", "> 0", self.pool_chunk_size)?;
        check(self.max_hits > 0, "max_hits", "> 0", self.max_hits)?;
        check(self.max_overlaps > 0, "max_overlaps", "> 0", self.max_overlaps)?;
        check(
            (1..=replication::BATCH_SIZE).contains(&self.replication_batch_size),
            "replication_batch_size",
            "1-64",
            self.replication_batch_size,
        )?;
        check(self.observer_port > 0, "observer_port", "> 0", self.observer_port)?;
        check(self.metrics_port > 0, "metrics_port", "> 0", self.metrics_port)?;
        if self.replication_long_interval_ms < self.replication_short_interval_ms {
            return Err(ConfigError::IntervalOrder {
                short: self.replication_short_interval_ms,
                long: self.replication_long_interval_ms,
            });
        }
        Ok(())
    }

    /// Seconds per simulation tick
    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.tick_rate.max(1)))
    }

    pub fn replication(&self) -> ReplicationConfig {
        ReplicationConfig {
            batch_size: self.replication_batch_size,
            short_interval: Duration::from_millis(self.replication_short_interval_ms),
            long_interval: Duration::from_millis(self.replication_long_interval_ms),
            idle_poll: Duration::from_millis(self.replication_idle_poll_ms),
        }
    }
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
    }

    fn parse<T, V>(&self, name: &str, expected: &str, valid: V, target: &mut T)
    where
        T: FromStr,
        V: Fn(&T) -> bool,
    {
        let Some(raw) = self.get(name) else {
            return;
        };
        match raw.trim().parse::<T>() {
            Ok(parsed) if valid(&parsed) => *target = parsed,
            Ok(_) => tracing::warn!("{} must be {}, using default", name, expected),
            Err(_) => tracing::warn!("Invalid {} '{}', using default", name, raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> EngineConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.tick_rate, 50);
        assert_eq!(config.pool_initial_size, 100);
        assert_eq!(config.pool_chunk_size, 25);
        assert_eq!(config.max_hits, 4);
        assert_eq!(config.max_overlaps, 16);
        assert_eq!(config.replication_batch_size, 64);
        assert!(!config.fire_from_muzzle);
        assert_eq!(config.observer_port, 4500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default() {
        let config = EngineConfig::load_or_default();
        assert!(config.tick_rate > 0);
    }

    #[test]
    fn test_overrides_applied() {
        let config = from_vars(&[
            ("TICK_RATE", "60"),
            ("REPLICATION_BATCH_SIZE", "32"),
            ("FIRE_FROM_MUZZLE", "true"),
            ("OBSERVER_BIND_ADDRESS", "127.0.0.1"),
            ("PROFILES_PATH", "profiles.json"),
        ]);
        assert_eq!(config.tick_rate, 60);
        assert_eq!(config.replication().batch_size, 32);
        assert!(config.fire_from_muzzle);
        assert_eq!(config.observer_bind_address, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.profiles_path, Some(PathBuf::from("profiles.json")));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = from_vars(&[
            ("TICK_RATE", "fast"),
            ("REPLICATION_BATCH_SIZE", "65"),
            ("MAX_HITS", "0"),
            ("OBSERVER_PORT", "0"),
        ]);
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_validate_rejects_bad_batch_size() {
        let config = EngineConfig {
            replication_batch_size: 100,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { name: "replication_batch_size", .. })
        ));
    }

    #[test]
    fn test_validate_interval_order() {
        let config = EngineConfig {
            replication_short_interval_ms: 200,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::IntervalOrder { short: 200, long: 100 })
        );
    }

    #[test]
    fn test_tick_timing() {
        let config = EngineConfig::default();
        assert!((config.tick_dt() - 0.02).abs() < 1e-6);
        assert_eq!(config.tick_duration(), Duration::from_millis(20));
    }
}

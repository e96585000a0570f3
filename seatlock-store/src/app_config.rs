use seatlock_core::{LockStrategy, TripId};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub allocation: AllocationConfig,
    #[serde(default)]
    pub seed: Option<SeedConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Upper bound on waiting for a pooled connection before a claim fails.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

fn default_max_connections() -> u32 { 20 }
fn default_acquire_timeout() -> u64 { 30 }

#[derive(Debug, Deserialize, Clone)]
pub struct AllocationConfig {
    pub trip_id: TripId,
    #[serde(default)]
    pub lock_strategy: LockStrategy,
    /// Unset means one concurrent claim per requester.
    #[serde(default)]
    pub max_in_flight: Option<usize>,
}

/// Rows to provision before the run, for demos against an empty database.
#[derive(Debug, Deserialize, Clone)]
pub struct SeedConfig {
    pub requesters: usize,
    pub seats: usize,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `SEATLOCK__ALLOCATION__TRIP_ID=2`
            .add_source(config::Environment::with_prefix("SEATLOCK").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults_fill_optional_fields() {
        let config = parse(
            r#"
            [database]
            url = "postgres://localhost/airline"

            [allocation]
            trip_id = 1
            "#,
        );

        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.database.acquire_timeout_secs, 30);
        assert_eq!(config.allocation.lock_strategy, LockStrategy::SkipLocked);
        assert!(config.allocation.max_in_flight.is_none());
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_explicit_allocation_settings() {
        let config = parse(
            r#"
            [database]
            url = "postgres://localhost/airline"
            max_connections = 8

            [allocation]
            trip_id = 4
            lock_strategy = "exclusive"
            max_in_flight = 16

            [seed]
            requesters = 120
            seats = 120
            "#,
        );

        assert_eq!(config.database.max_connections, 8);
        assert_eq!(config.allocation.trip_id, 4);
        assert_eq!(config.allocation.lock_strategy, LockStrategy::Exclusive);
        assert_eq!(config.allocation.max_in_flight, Some(16));
        assert_eq!(config.seed.unwrap().seats, 120);
    }
}

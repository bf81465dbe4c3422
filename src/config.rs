//! Dispatcher configuration.

use std::str::FromStr;
use std::time::Duration;

use crate::cache::DEFAULT_SHARDS;
use crate::error::ConfigError;

/// Default per-script queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// What happens to commands still queued for a script when it is retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetirePolicy {
    /// Deliver everything already queued, then stop.
    #[default]
    Drain,
    /// Drop queued commands; only the in-flight delivery completes.
    Discard,
}

impl FromStr for RetirePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drain" => Ok(RetirePolicy::Drain),
            "discard" => Ok(RetirePolicy::Discard),
            other => Err(format!("expected `drain` or `discard`, got `{}`", other)),
        }
    }
}

/// What intake does with a command whose target queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Skip the full script for this command, count it as overflowed and
    /// publish a `QueueFull` failure. Other scripts are never held up.
    #[default]
    Drop,
    /// Wait for space. Lossless, but a stuck script stalls intake for every
    /// script until it is retired.
    Wait,
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(OverflowPolicy::Drop),
            "wait" => Ok(OverflowPolicy::Wait),
            other => Err(format!("expected `drop` or `wait`, got `{}`", other)),
        }
    }
}

/// Default upper bound on how long `retire` waits for a worker to finish.
pub const DEFAULT_RETIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Dispatcher settings.
///
/// All fields have defaults; hosts can override them from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Capacity of each script's queue.
    pub queue_capacity: usize,
    /// Intake behaviour when a script's queue is full.
    pub overflow_policy: OverflowPolicy,
    /// Policy applied to queued commands on retirement.
    pub retire_policy: RetirePolicy,
    /// How long `retire` waits for the worker's in-flight call and drain.
    /// Past it the worker is left to finish on its own.
    pub retire_timeout: Duration,
    /// Shard count of the cache built by [`crate::cache::ShardedCache::from_config`].
    pub cache_shards: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        DispatcherConfig {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
            retire_policy: RetirePolicy::default(),
            retire_timeout: DEFAULT_RETIRE_TIMEOUT,
            cache_shards: DEFAULT_SHARDS,
        }
    }
}

impl DispatcherConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `DAPP_QUEUE_CAPACITY`     | `1024`  |
    /// | `DAPP_OVERFLOW_POLICY`    | `drop`  |
    /// | `DAPP_RETIRE_POLICY`      | `drain` |
    /// | `DAPP_RETIRE_TIMEOUT_MS`  | `30000` |
    /// | `DAPP_CACHE_SHARDS`       | `16`    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Loads a `.env` file if one exists, then reads the environment.
    pub fn from_dotenv() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            tracing::debug!(error = %e, "No .env file loaded");
        }
        Self::from_env()
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = DispatcherConfig::default();

        let queue_capacity = match lookup("DAPP_QUEUE_CAPACITY") {
            Some(raw) => parse_var("DAPP_QUEUE_CAPACITY", &raw)?,
            None => defaults.queue_capacity,
        };
        let overflow_policy = match lookup("DAPP_OVERFLOW_POLICY") {
            Some(raw) => parse_var("DAPP_OVERFLOW_POLICY", &raw)?,
            None => defaults.overflow_policy,
        };
        let retire_policy = match lookup("DAPP_RETIRE_POLICY") {
            Some(raw) => parse_var("DAPP_RETIRE_POLICY", &raw)?,
            None => defaults.retire_policy,
        };
        let retire_timeout = match lookup("DAPP_RETIRE_TIMEOUT_MS") {
            Some(raw) => Duration::from_millis(parse_var("DAPP_RETIRE_TIMEOUT_MS", &raw)?),
            None => defaults.retire_timeout,
        };
        let cache_shards = match lookup("DAPP_CACHE_SHARDS") {
            Some(raw) => parse_var("DAPP_CACHE_SHARDS", &raw)?,
            None => defaults.cache_shards,
        };

        let config = DispatcherConfig { queue_capacity, overflow_policy, retire_policy, retire_timeout, cache_shards };
        config.validate()?;
        Ok(config)
    }

    /// Rejects a zero queue capacity and shard counts that are not a non-zero
    /// power of two.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                var: "DAPP_QUEUE_CAPACITY",
                value: self.queue_capacity.to_string(),
                reason: "must be greater than zero".into(),
            });
        }
        if !self.cache_shards.is_power_of_two() {
            return Err(ConfigError::Invalid {
                var: "DAPP_CACHE_SHARDS",
                value: self.cache_shards.to_string(),
                reason: "must be a non-zero power of two".into(),
            });
        }
        Ok(())
    }
}

fn parse_var<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = DispatcherConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, DispatcherConfig::default());
        assert_eq!(config.queue_capacity, 1024);
        assert_eq!(config.overflow_policy, OverflowPolicy::Drop);
        assert_eq!(config.retire_policy, RetirePolicy::Drain);
        assert_eq!(config.retire_timeout, Duration::from_secs(30));
        assert_eq!(config.cache_shards, 16);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = DispatcherConfig::from_lookup(lookup(&[
            ("DAPP_QUEUE_CAPACITY", "8"),
            ("DAPP_OVERFLOW_POLICY", "WAIT"),
            ("DAPP_RETIRE_POLICY", "Discard"),
            ("DAPP_RETIRE_TIMEOUT_MS", "250"),
            ("DAPP_CACHE_SHARDS", "64"),
        ]))
        .unwrap();
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.overflow_policy, OverflowPolicy::Wait);
        assert_eq!(config.retire_timeout, Duration::from_millis(250));
        assert_eq!(config.retire_policy, RetirePolicy::Discard);
        assert_eq!(config.cache_shards, 64);
    }

    #[test]
    fn invalid_values_are_errors() {
        let err = DispatcherConfig::from_lookup(lookup(&[("DAPP_QUEUE_CAPACITY", "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "DAPP_QUEUE_CAPACITY", .. }));

        let err = DispatcherConfig::from_lookup(lookup(&[("DAPP_QUEUE_CAPACITY", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "DAPP_QUEUE_CAPACITY", .. }));

        let err = DispatcherConfig::from_lookup(lookup(&[("DAPP_RETIRE_POLICY", "later")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "DAPP_RETIRE_POLICY", .. }));

        let err = DispatcherConfig::from_lookup(lookup(&[("DAPP_OVERFLOW_POLICY", "spill")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "DAPP_OVERFLOW_POLICY", .. }));

        let err = DispatcherConfig::from_lookup(lookup(&[("DAPP_RETIRE_TIMEOUT_MS", "-1")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "DAPP_RETIRE_TIMEOUT_MS", .. }));

        let err = DispatcherConfig::from_lookup(lookup(&[("DAPP_CACHE_SHARDS", "12")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "DAPP_CACHE_SHARDS", .. }));
    }
}

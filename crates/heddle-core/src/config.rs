//! TOML configuration.
//!
//! ```toml
//! [scheduler]
//! ready_queue_prefix = "ready"
//! worker_ttl_ms = 15000
//! reaper_interval_ms = 1000
//!
//! [[pool]]
//! name = "default"
//! warm_pool = 2
//! capabilities = ["cpu"]
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::Capabilities;
use crate::error::{Result, SchedulerError};
use crate::scheduler::SchedulerOptions;
use crate::spawner::SpawnerConfig;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HeddleConfig {
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default = "default_pools")]
    pub pool: Vec<PoolConfig>,
}

impl Default for HeddleConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerSection::default(),
            pool: default_pools(),
        }
    }
}

fn default_pools() -> Vec<PoolConfig> {
    vec![PoolConfig::named("default")]
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSection {
    pub ready_queue_prefix: String,
    pub worker_ttl_ms: u64,
    pub reaper_interval_ms: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            ready_queue_prefix: "ready".to_string(),
            worker_ttl_ms: 15_000,
            reaper_interval_ms: 1_000,
        }
    }
}

impl SchedulerSection {
    pub fn worker_ttl(&self) -> Duration {
        Duration::from_millis(self.worker_ttl_ms)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }

    pub fn options(&self) -> SchedulerOptions {
        SchedulerOptions {
            ready_queue_prefix: self.ready_queue_prefix.clone(),
            worker_ttl: self.worker_ttl(),
            reaper_interval: self.reaper_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    pub name: String,
    #[serde(default = "default_warm_pool")]
    pub warm_pool: usize,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    #[serde(default = "default_idle_ms")]
    pub idle_ms: u64,
    #[serde(default = "default_heartbeat_ms")]
    pub heartbeat_ms: u64,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

fn default_warm_pool() -> usize {
    1
}

fn default_poll_ms() -> u64 {
    250
}

fn default_idle_ms() -> u64 {
    15_000
}

fn default_heartbeat_ms() -> u64 {
    5_000
}

impl PoolConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            warm_pool: default_warm_pool(),
            poll_ms: default_poll_ms(),
            idle_ms: default_idle_ms(),
            heartbeat_ms: default_heartbeat_ms(),
            capabilities: Vec::new(),
        }
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities.iter().cloned().collect()
    }

    pub fn spawner_config(&self) -> SpawnerConfig {
        SpawnerConfig {
            pool: self.name.clone(),
            warm_pool: self.warm_pool,
            poll: self.poll(),
            idle: self.idle(),
            heartbeat: self.heartbeat(),
            capabilities: self.capabilities(),
        }
    }
}

/// Read and deserialize a config file. No semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<HeddleConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| {
        SchedulerError::Config(format!("reading config file at {}: {e}", path.display()))
    })?;
    Ok(toml::from_str(&contents)?)
}

/// Load a config file and run [`validate`] on it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<HeddleConfig> {
    let config = load_from_path(path)?;
    validate(&config)?;
    Ok(config)
}

/// Semantic checks:
/// - the ready queue prefix is non-empty, ttl and reaper interval are non-zero
/// - pool names are non-empty and unique
/// - every pool keeps at least one warm worker
/// - heartbeats are more frequent than the idle timeout
pub fn validate(config: &HeddleConfig) -> Result<()> {
    let s = &config.scheduler;
    if s.ready_queue_prefix.is_empty() {
        return Err(invalid("[scheduler].ready_queue_prefix must not be empty"));
    }
    if s.worker_ttl_ms == 0 {
        return Err(invalid("[scheduler].worker_ttl_ms must be >= 1"));
    }
    if s.reaper_interval_ms == 0 {
        return Err(invalid("[scheduler].reaper_interval_ms must be >= 1"));
    }

    let mut seen = HashSet::new();
    for pool in &config.pool {
        if pool.name.trim().is_empty() {
            return Err(invalid("pool name must not be empty"));
        }
        if !seen.insert(pool.name.as_str()) {
            return Err(invalid(format!("duplicate pool '{}'", pool.name)));
        }
        if pool.warm_pool == 0 {
            return Err(invalid(format!("pool '{}': warm_pool must be >= 1", pool.name)));
        }
        if pool.poll_ms == 0 {
            return Err(invalid(format!("pool '{}': poll_ms must be >= 1", pool.name)));
        }
        if pool.heartbeat_ms >= pool.idle_ms {
            return Err(invalid(format!(
                "pool '{}': heartbeat_ms ({}) must be below idle_ms ({})",
                pool.name, pool.heartbeat_ms, pool.idle_ms
            )));
        }
    }
    Ok(())
}

fn invalid(msg: impl Into<String>) -> SchedulerError {
    SchedulerError::Config(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn empty_file_uses_defaults() {
        let file = write_config("");
        let config = load_and_validate(file.path()).unwrap();
        assert_eq!(config, HeddleConfig::default());
        assert_eq!(config.pool[0].name, "default");
        assert_eq!(config.scheduler.options(), SchedulerOptions::default());
    }

    #[test]
    fn pools_and_durations_are_read() {
        let file = write_config(
            r#"
            [scheduler]
            ready_queue_prefix = "rq"
            worker_ttl_ms = 3000

            [[pool]]
            name = "cpu"
            warm_pool = 3
            poll_ms = 50
            idle_ms = 2000
            heartbeat_ms = 500
            capabilities = ["cpu", "disk"]

            [[pool]]
            name = "gpu"
            "#,
        );
        let config = load_and_validate(file.path()).unwrap();
        assert_eq!(config.scheduler.worker_ttl(), Duration::from_secs(3));
        assert_eq!(config.scheduler.reaper_interval(), Duration::from_secs(1));

        let cpu = config.pool[0].spawner_config();
        assert_eq!(cpu.warm_pool, 3);
        assert_eq!(cpu.poll, Duration::from_millis(50));
        assert_eq!(cpu.capabilities.to_string(), "{cpu, disk}");

        assert_eq!(config.pool[1].warm_pool, 1);
        assert_eq!(config.pool[1].idle(), Duration::from_secs(15));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let file = write_config("[scheduler]\nready_prefix = \"x\"\n");
        assert!(matches!(
            load_from_path(file.path()),
            Err(SchedulerError::Toml(_))
        ));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_from_path(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, SchedulerError::Config(_)));
    }

    #[rstest]
    #[case::empty_prefix("[scheduler]\nready_queue_prefix = \"\"\n", "ready_queue_prefix")]
    #[case::zero_ttl("[scheduler]\nworker_ttl_ms = 0\n", "worker_ttl_ms")]
    #[case::empty_name("[[pool]]\nname = \" \"\n", "must not be empty")]
    #[case::duplicate("[[pool]]\nname = \"a\"\n[[pool]]\nname = \"a\"\n", "duplicate pool")]
    #[case::no_workers("[[pool]]\nname = \"a\"\nwarm_pool = 0\n", "warm_pool")]
    #[case::slow_heartbeat("[[pool]]\nname = \"a\"\nheartbeat_ms = 100\nidle_ms = 100\n", "heartbeat_ms")]
    fn invalid_configs_are_rejected(#[case] toml: &str, #[case] needle: &str) {
        let file = write_config(toml);
        let err = load_and_validate(file.path()).unwrap_err();
        assert!(
            err.to_string().contains(needle),
            "expected {needle:?} in {err}"
        );
    }
}

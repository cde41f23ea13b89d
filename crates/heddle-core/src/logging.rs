//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Level priority:
//! 1. explicit level (e.g. a `--log-level` flag)
//! 2. `HEDDLE_LOG` environment variable ("info", "debug", ...)
//! 3. `info`

use std::str::FromStr;

use tracing_subscriber::fmt;

use crate::error::{Result, SchedulerError};

pub const LOG_ENV: &str = "HEDDLE_LOG";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn level(self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// Level to use given an explicit choice and the environment value.
pub fn resolve_level(explicit: Option<LogLevel>, env: Option<&str>) -> LogLevel {
    explicit
        .or_else(|| env.and_then(|s| s.parse().ok()))
        .unwrap_or(LogLevel::Info)
}

/// Install the global subscriber, writing to stderr. Call once at startup.
pub fn init_logging(explicit: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV).ok();
    let level = resolve_level(explicit, env.as_deref());

    fmt()
        .with_max_level(level.level())
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| SchedulerError::Config(format!("logging already initialised: {e}")))
}

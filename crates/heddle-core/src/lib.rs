//! heddle-core
//!
//! Dependency-aware distributed task scheduling.
//!
//! # Modules
//! - **domain**: tasks, statuses, ids, labels, dependency graph
//! - **predicate**: the sandboxed edge predicate language
//! - **ports**: storage, queue, clock and gateway abstractions
//! - **impls**: in-memory and file-backed port implementations
//! - **scheduler**: submit/patch/finish/pick/requeue and dependency release
//! - **registry**: worker records with heartbeat expiry
//! - **runtime**: task handlers and their registry
//! - **worker**: the pick/handle/report loop of one worker process
//! - **spawner**: warm pools, liveness and crash recovery
//! - **app**: the reaper loop
//! - **config** / **logging**: TOML configuration and tracing setup

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod logging;
pub mod ports;
pub mod predicate;
pub mod registry;
pub mod runtime;
pub mod scheduler;
pub mod spawner;
pub mod worker;

pub use crate::error::{Result, SchedulerError};
pub use crate::scheduler::{Scheduler, SchedulerOptions};

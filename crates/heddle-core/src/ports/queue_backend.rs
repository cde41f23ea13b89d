//! QueueBackend port: lists, hashes and sets keyed by string.
//!
//! Shaped after a Redis-like broker so a networked implementation is a thin
//! adapter. The scheduler keeps three kinds of data here:
//! - ready queues: list `{prefix}:{pool}` of serialized task records
//! - worker records: hash `worker:{id}`
//! - pool and label bookkeeping: sets `pools`, `label:{l}:tasks` and hash
//!   `label:{l}:meta`
//!
//! # Design
//! - every single operation is atomic per key
//! - no operation spans keys, pools are independent partitions
//! - `pop` never blocks; callers decide how to back off

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;

#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Append to the tail of the list at `key`.
    async fn push(&self, key: &str, value: String) -> Result<()>;

    /// Remove and return the head of the list at `key`.
    async fn pop(&self, key: &str) -> Result<Option<String>>;

    /// Items `start..=stop` of the list without removing them. Negative
    /// indices count from the tail (`-1` is the last element).
    async fn range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>>;

    async fn len(&self, key: &str) -> Result<usize>;

    /// Set the given fields of the hash at `key`, creating it if needed.
    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<()>;

    /// All fields of the hash at `key`; empty when absent.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Delete `key` whatever its type. Returns whether it existed.
    async fn del(&self, key: &str) -> Result<bool>;

    /// Keys of any type starting with `prefix`, sorted.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Add `member` to the set at `key`. Returns whether it was new.
    async fn sadd(&self, key: &str, member: &str) -> Result<bool>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>>;
}

//! InMemoryQueueBackend - in-process QueueBackend for development and tests.
//!
//! # Implementation
//! - one `Mutex` around all lists, hashes and sets
//! - the lock is never held across an `.await`, so a plain `std::sync`
//!   mutex is enough
//! - a poisoned lock surfaces as `SchedulerError::Backend`

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::error::{Result, SchedulerError};
use crate::ports::QueueBackend;

#[derive(Default)]
struct State {
    lists: HashMap<String, VecDeque<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
    sets: HashMap<String, BTreeSet<String>>,
}

/// # Example
/// ```ignore
/// let queue = InMemoryQueueBackend::new();
/// queue.push("ready:default", task_json).await?;
/// let next = queue.pop("ready:default").await?;
/// ```
#[derive(Default)]
pub struct InMemoryQueueBackend {
    state: Mutex<State>,
}

impl InMemoryQueueBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|e| SchedulerError::Backend(format!("queue state poisoned: {e}")))
    }
}

/// Clamp Redis-style inclusive indices to `0..len`.
fn normalize(start: isize, stop: isize, len: usize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[async_trait]
impl QueueBackend for InMemoryQueueBackend {
    async fn push(&self, key: &str, value: String) -> Result<()> {
        self.lock()?
            .lists
            .entry(key.to_string())
            .or_default()
            .push_back(value);
        Ok(())
    }

    async fn pop(&self, key: &str) -> Result<Option<String>> {
        let mut state = self.lock()?;
        let Some(list) = state.lists.get_mut(key) else {
            return Ok(None);
        };
        let value = list.pop_front();
        if list.is_empty() {
            state.lists.remove(key);
        }
        Ok(value)
    }

    async fn range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let state = self.lock()?;
        let Some(list) = state.lists.get(key) else {
            return Ok(Vec::new());
        };
        Ok(match normalize(start, stop, list.len()) {
            Some((from, to)) => list.range(from..=to).cloned().collect(),
            None => Vec::new(),
        })
    }

    async fn len(&self, key: &str) -> Result<usize> {
        Ok(self.lock()?.lists.get(key).map_or(0, VecDeque::len))
    }

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<()> {
        let mut state = self.lock()?;
        let hash = state.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self.lock()?.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let mut state = self.lock()?;
        let list = state.lists.remove(key).is_some();
        let hash = state.hashes.remove(key).is_some();
        let set = state.sets.remove(key).is_some();
        Ok(list || hash || set)
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let state = self.lock()?;
        let keys: BTreeSet<String> = state
            .lists
            .keys()
            .chain(state.hashes.keys())
            .chain(state.sets.keys())
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        Ok(keys.into_iter().collect())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .lock()?
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()?
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }
}

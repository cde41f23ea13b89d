//! Worker registry.
//!
//! Worker records live in the queue backend as hashes keyed
//! `worker:{id}`:
//!
//! | field        | content                                  |
//! |--------------|------------------------------------------|
//! | `pool`       | pool name                                |
//! | `url`        | endpoint                                 |
//! | `advertises` | JSON list of capability names            |
//! | `last_seen`  | milliseconds since the Unix epoch        |

use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::{Capabilities, WorkerId, WorkerRecord, WorkerRegistration};
use crate::error::{Result, SchedulerError};
use crate::ports::{Clock, ManifestFetcher, QueueBackend};

pub const WORKER_KEY_PREFIX: &str = "worker:";

pub fn worker_key(id: &WorkerId) -> String {
    format!("{WORKER_KEY_PREFIX}{id}")
}

pub struct WorkerRegistry {
    backend: Arc<dyn QueueBackend>,
    clock: Arc<dyn Clock>,
    manifests: Option<Arc<dyn ManifestFetcher>>,
}

impl WorkerRegistry {
    pub fn new(backend: Arc<dyn QueueBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            manifests: None,
        }
    }

    /// Enable the capability handshake for registrations without a manifest.
    pub fn with_manifests(mut self, manifests: Arc<dyn ManifestFetcher>) -> Self {
        self.manifests = Some(manifests);
        self
    }

    /// Upsert a worker record.
    ///
    /// When the registration carries no capabilities, the worker's manifest
    /// is fetched from its endpoint. A failed handshake is logged and the
    /// worker is registered with an empty set; it can still serve handlers
    /// that require nothing.
    pub async fn register(&self, registration: WorkerRegistration) -> Result<WorkerRecord> {
        let capabilities = match registration.capabilities {
            Some(caps) if !caps.is_empty() => caps,
            _ => self.handshake(&registration.id, &registration.endpoint).await,
        };

        let record = WorkerRecord {
            id: registration.id,
            pool: registration.pool,
            endpoint: registration.endpoint,
            capabilities,
            last_seen: self.clock.now(),
        };
        self.write(&record).await?;

        info!(
            worker_id = %record.id,
            pool = %record.pool,
            endpoint = %record.endpoint,
            capabilities = %record.capabilities,
            "worker registered"
        );
        Ok(record)
    }

    async fn handshake(&self, id: &WorkerId, endpoint: &str) -> Capabilities {
        let Some(fetcher) = &self.manifests else {
            return Capabilities::new();
        };
        match fetcher.fetch(endpoint).await {
            Ok(caps) => {
                debug!(worker_id = %id, endpoint, capabilities = %caps, "fetched worker manifest");
                caps
            }
            Err(e) => {
                warn!(worker_id = %id, endpoint, error = %e, "manifest handshake failed");
                Capabilities::new()
            }
        }
    }

    /// Refresh `last_seen`.
    ///
    /// An unknown worker is re-registered if `pool` and `endpoint` are both
    /// given (the registry may have lost its state); otherwise the
    /// heartbeat is rejected with `Ok(false)`.
    pub async fn heartbeat(
        &self,
        id: &WorkerId,
        pool: Option<&str>,
        endpoint: Option<&str>,
    ) -> Result<bool> {
        if self.get(id).await?.is_some() {
            let mut fields = vec![("last_seen".to_string(), self.now_millis())];
            if let Some(pool) = pool {
                fields.push(("pool".into(), pool.to_string()));
            }
            if let Some(endpoint) = endpoint {
                fields.push(("url".into(), endpoint.to_string()));
            }
            self.backend.hset(&worker_key(id), &fields).await?;
            return Ok(true);
        }

        match (pool, endpoint) {
            (Some(pool), Some(endpoint)) => {
                info!(worker_id = %id, pool, "heartbeat from unknown worker, re-registering");
                self.register(WorkerRegistration::new(id.clone(), pool, endpoint))
                    .await?;
                Ok(true)
            }
            _ => {
                warn!(worker_id = %id, "heartbeat from unknown worker rejected");
                Ok(false)
            }
        }
    }

    pub async fn get(&self, id: &WorkerId) -> Result<Option<WorkerRecord>> {
        let fields = self.backend.hgetall(&worker_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        decode(id.clone(), &fields).map(Some)
    }

    /// Registered workers, optionally restricted to one pool, ordered by id.
    pub async fn list(&self, pool: Option<&str>) -> Result<Vec<WorkerRecord>> {
        let mut records = Vec::new();
        for key in self.backend.keys(WORKER_KEY_PREFIX).await? {
            let id = WorkerId::new(&key[WORKER_KEY_PREFIX.len()..]);
            let fields = self.backend.hgetall(&key).await?;
            if fields.is_empty() {
                continue;
            }
            let record = decode(id, &fields)?;
            if pool.is_none_or(|p| p == record.pool) {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    pub async fn deregister(&self, id: &WorkerId) -> Result<bool> {
        let removed = self.backend.del(&worker_key(id)).await?;
        if removed {
            info!(worker_id = %id, "worker deregistered");
        }
        Ok(removed)
    }

    /// Remove every worker not seen within `ttl` and return their records.
    pub async fn expire(&self, ttl: Duration) -> Result<Vec<WorkerRecord>> {
        let now = self.clock.now();
        let mut expired = Vec::new();
        for record in self.list(None).await? {
            if record.is_expired(now, ttl) && self.backend.del(&worker_key(&record.id)).await? {
                warn!(
                    worker_id = %record.id,
                    pool = %record.pool,
                    last_seen = %record.last_seen,
                    "worker expired"
                );
                expired.push(record);
            }
        }
        Ok(expired)
    }

    async fn write(&self, record: &WorkerRecord) -> Result<()> {
        let fields = vec![
            ("pool".to_string(), record.pool.clone()),
            ("url".to_string(), record.endpoint.clone()),
            (
                "advertises".to_string(),
                serde_json::to_string(&record.capabilities)?,
            ),
            (
                "last_seen".to_string(),
                record.last_seen.timestamp_millis().to_string(),
            ),
        ];
        self.backend.hset(&worker_key(&record.id), &fields).await
    }

    fn now_millis(&self) -> String {
        self.clock.now().timestamp_millis().to_string()
    }
}

fn decode(id: WorkerId, fields: &HashMap<String, String>) -> Result<WorkerRecord> {
    let field = |name: &str| {
        fields.get(name).ok_or_else(|| {
            SchedulerError::Backend(format!("worker record {id} is missing field {name}"))
        })
    };

    let capabilities: Capabilities = serde_json::from_str(field("advertises")?)?;
    let millis: i64 = field("last_seen")?
        .parse()
        .map_err(|e| SchedulerError::Backend(format!("worker record {id}: bad last_seen: {e}")))?;
    let last_seen: DateTime<Utc> = Utc
        .timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| SchedulerError::Backend(format!("worker record {id}: last_seen out of range")))?;

    Ok(WorkerRecord {
        pool: field("pool")?.clone(),
        endpoint: field("url")?.clone(),
        capabilities,
        last_seen,
        id,
    })
}

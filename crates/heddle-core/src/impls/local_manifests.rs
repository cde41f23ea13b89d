use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::Capabilities;
use crate::error::{Result, SchedulerError};
use crate::ports::ManifestFetcher;

/// In-process manifest directory.
///
/// Workers running in the same process publish their manifest under their
/// endpoint before registering; the registry then fetches it from here.
#[derive(Default)]
pub struct LocalManifests {
    manifests: RwLock<HashMap<String, Capabilities>>,
}

impl LocalManifests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, endpoint: impl Into<String>, capabilities: Capabilities) -> Result<()> {
        self.manifests
            .write()
            .map_err(|e| SchedulerError::Backend(format!("manifest directory poisoned: {e}")))?
            .insert(endpoint.into(), capabilities);
        Ok(())
    }
}

#[async_trait]
impl ManifestFetcher for LocalManifests {
    async fn fetch(&self, endpoint: &str) -> Result<Capabilities> {
        self.manifests
            .read()
            .map_err(|e| SchedulerError::Backend(format!("manifest directory poisoned: {e}")))?
            .get(endpoint)
            .cloned()
            .ok_or_else(|| SchedulerError::NotFound {
                kind: "manifest",
                id: endpoint.to_string(),
            })
    }
}

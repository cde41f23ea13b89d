//! ManifestFetcher port: ask a worker what it can do.
//!
//! Used by the registry when a worker registers without listing its
//! capabilities inline. Over a network this would be a request to the
//! worker's endpoint; in-process it is a lookup.

use async_trait::async_trait;

use crate::domain::Capabilities;
use crate::error::Result;

#[async_trait]
pub trait ManifestFetcher: Send + Sync {
    async fn fetch(&self, endpoint: &str) -> Result<Capabilities>;
}

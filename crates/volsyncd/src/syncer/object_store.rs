//! Object-store prefix mirroring.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::deadline::Deadline;
use crate::error::{Result, SyncError};
use crate::fsutil::ensure_dir;
use crate::request::S3Details;
use crate::s3::ObjectStoreClient;
use crate::syncer::Syncer;

/// Upper bound for the connectivity probe, inside the job deadline.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// The slice of the object-store client this strategy needs.
#[async_trait]
pub(crate) trait ObjectStore: Send + Sync {
    async fn list(&self, prefix: &str, deadline: &Deadline) -> Result<Vec<String>>;
    async fn fetch(&self, key: &str, dest: &Path, deadline: &Deadline) -> Result<()>;
}

#[async_trait]
impl ObjectStore for ObjectStoreClient<'_> {
    async fn list(&self, prefix: &str, deadline: &Deadline) -> Result<Vec<String>> {
        ObjectStoreClient::list(self, prefix, deadline).await
    }

    async fn fetch(&self, key: &str, dest: &Path, deadline: &Deadline) -> Result<()> {
        ObjectStoreClient::fetch(self, key, dest, deadline).await
    }
}

pub struct ObjectStoreSyncer {
    details: S3Details,
    target: PathBuf,
    timeout: Duration,
}

impl ObjectStoreSyncer {
    pub fn new(details: S3Details, target: PathBuf, timeout: Duration) -> Self {
        Self {
            details,
            target,
            timeout,
        }
    }

    /// Connects and verifies reachability, retrying once with the opposite
    /// addressing style for endpoints outside the public cloud domain.
    async fn connect(&self, deadline: &Deadline) -> Result<ObjectStoreClient<'_>> {
        let client = ObjectStoreClient::connect(&self.details)?;
        let probe_budget = deadline.remaining_capped(PROBE_TIMEOUT)?;

        match client.probe(probe_budget).await {
            Ok(()) => Ok(client),
            Err(first) if !client.is_cloud_endpoint() => {
                log::warn!(
                    "connectivity probe failed ({}), retrying with flipped addressing style",
                    first
                );
                let flipped = client.with_flipped_style();
                let probe_budget = deadline.remaining_capped(PROBE_TIMEOUT)?;
                flipped.probe(probe_budget).await.map_err(|second| {
                    SyncError::Network(format!(
                        "object store unreachable with both addressing styles: {}; {}",
                        first, second
                    ))
                })?;
                Ok(flipped)
            }
            Err(e) => Err(e),
        }
    }

    async fn mirror(&self, store: &dyn ObjectStore, deadline: &Deadline) -> Result<()> {
        let prefix = &self.details.path;
        let keys = store.list(prefix, deadline).await?;

        let mut downloaded = 0usize;
        for key in &keys {
            let Some(relative) = relative_key(key, prefix) else {
                continue;
            };
            let local = self.target.join(&relative);

            if let Some(parent) = local.parent() {
                ensure_dir(parent)?;
            }
            if let Err(e) = store.fetch(key, &local, deadline).await {
                // A half-written file must not look like a synced one.
                let _ = std::fs::remove_file(&local);
                return Err(e);
            }
            downloaded += 1;
        }

        log::info!(
            "downloaded {} of {} listed keys from bucket {} into {}",
            downloaded,
            keys.len(),
            self.details.bucket_name,
            self.target.display()
        );
        Ok(())
    }
}

#[async_trait]
impl Syncer for ObjectStoreSyncer {
    async fn sync(&self) -> Result<()> {
        let deadline = Deadline::after(self.timeout);
        ensure_dir(&self.target)?;

        let client = self.connect(&deadline).await?;
        self.mirror(&client, &deadline).await
    }
}

/// Local path for `key` relative to `prefix`.
///
/// Directory placeholder keys (trailing separator) yield `None`; a key equal
/// to the prefix falls back to its base name so a single-object prefix still
/// lands somewhere sensible.
fn relative_key(key: &str, prefix: &str) -> Option<String> {
    if key.ends_with('/') {
        return None;
    }

    let relative = key.strip_prefix(prefix).unwrap_or(key);
    let relative = relative.trim_start_matches('/');
    if relative.is_empty() {
        return key
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());
    }
    Some(relative.to_string())
}

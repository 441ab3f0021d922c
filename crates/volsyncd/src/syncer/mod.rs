//! Source synchronization strategies.
//!
//! One strategy per source kind, all behind the [`Syncer`] capability. The
//! factory parses and validates the untyped detail map into the matching
//! typed record before any strategy exists; everything it rejects is a
//! validation error raised before the first byte of I/O.

pub mod git;
pub mod http;
pub mod object_store;
pub mod remote_fs;
pub mod replace;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::exec::{CommandRunner, SystemRunner};
use crate::request::{
    GitDetails, HttpDetails, S3Details, Source, SourceKind, SshDetails,
};

pub use replace::{replace_with, ReplaceTransaction};

/// One synchronization attempt against one target directory.
#[async_trait]
pub trait Syncer: Send + Sync {
    async fn sync(&self) -> Result<()>;
}

/// Builds a validated strategy for a source specification.
pub struct SyncerFactory {
    runner: Arc<dyn CommandRunner>,
}

impl SyncerFactory {
    pub fn new() -> Self {
        Self {
            runner: Arc::new(SystemRunner),
        }
    }

    /// Factory with a substitute process executor, for tests.
    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Parses `source` and constructs the matching strategy.
    ///
    /// Pure: parsing and cross-field validation only, no filesystem or
    /// network access. Every error out of here is validation-kinded.
    pub fn build(
        &self,
        source: &Source,
        target: &Path,
        timeout: Duration,
    ) -> Result<Box<dyn Syncer>> {
        let kind = SourceKind::parse(&source.kind)?;
        log::debug!(
            "building {} syncer for {}",
            kind.as_str(),
            target.display()
        );

        let target = target.to_path_buf();
        match kind {
            SourceKind::Ssh => {
                let details = SshDetails::from_value(&source.details)?;
                Ok(Box::new(remote_fs::RemoteFsSyncer::new(
                    details,
                    target,
                    timeout,
                    self.runner.clone(),
                )))
            }
            SourceKind::Git => {
                let details = GitDetails::from_value(&source.details)?;
                Ok(Box::new(git::GitSyncer::new(
                    details,
                    target,
                    timeout,
                    self.runner.clone(),
                )))
            }
            SourceKind::Http => {
                let details = HttpDetails::from_value(&source.details)?;
                Ok(Box::new(http::HttpSyncer::new(details, target, timeout)))
            }
            SourceKind::S3 => {
                let details = S3Details::from_value(&source.details)?;
                Ok(Box::new(object_store::ObjectStoreSyncer::new(
                    details, target, timeout,
                )))
            }
        }
    }
}

impl Default for SyncerFactory {
    fn default() -> Self {
        Self::new()
    }
}

//! volsyncd core: on-demand synchronization of remote sources into a local
//! volume directory.
//!
//! Four source kinds (SSH mirror, git repository, HTTP download,
//! S3-compatible object store) implement one [`Syncer`] capability; the
//! [`SyncOrchestrator`] admits at most one job at a time and runs it
//! asynchronously. Destructive repository replacement goes through a
//! stage-then-swap transaction that either fully succeeds or leaves the
//! original content intact.

pub mod deadline;
pub mod error;
pub mod exec;
pub mod fsutil;
pub mod mask;
pub mod orchestrator;
pub mod request;
pub mod s3;
pub mod secrets;
pub mod syncer;

pub use error::{ErrorKind, Result, SyncError};
pub use mask::mask_credentials;
pub use orchestrator::{Admission, SyncOrchestrator};
pub use request::{parse_timeout, Source, SourceKind, SyncRequest, Target};
pub use secrets::KeyMaterial;
pub use syncer::{Syncer, SyncerFactory};

//! Single-flight sync admission and execution.
//!
//! At most one synchronization runs per process. The busy flag lives behind
//! one mutex inside the orchestrator and is only reachable through
//! `try_acquire`, which hands out a guard; dropping the guard is the one
//! place the flag is cleared, so it happens exactly once per accepted job
//! whether the job succeeds, fails, times out or panics.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::Result;
use crate::request::{parse_timeout, SyncRequest};
use crate::syncer::{Syncer, SyncerFactory};

/// Outcome of an admission attempt. Validation failures are reported as
/// errors instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The job was accepted and now runs asynchronously.
    Accepted,
    /// Another job is still running; nothing was started.
    Busy,
}

/// The process-wide busy flag. At most one guard exists at a time.
#[derive(Debug, Default)]
struct BusyFlag {
    busy: Mutex<bool>,
}

impl BusyFlag {
    fn try_acquire(self: &Arc<Self>) -> Option<BusyGuard> {
        let mut busy = self.busy.lock().expect("busy flag lock poisoned");
        if *busy {
            return None;
        }
        *busy = true;
        Some(BusyGuard {
            flag: Arc::clone(self),
        })
    }

    fn is_set(&self) -> bool {
        *self.busy.lock().expect("busy flag lock poisoned")
    }
}

/// Releases the busy flag on drop.
struct BusyGuard {
    flag: Arc<BusyFlag>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        *self.flag.busy.lock().expect("busy flag lock poisoned") = false;
    }
}

pub struct SyncOrchestrator {
    factory: SyncerFactory,
    flag: Arc<BusyFlag>,
    default_timeout: Duration,
}

impl SyncOrchestrator {
    pub fn new(default_timeout: Duration) -> Self {
        Self::with_factory(SyncerFactory::new(), default_timeout)
    }

    pub fn with_factory(factory: SyncerFactory, default_timeout: Duration) -> Self {
        Self {
            factory,
            flag: Arc::new(BusyFlag::default()),
            default_timeout,
        }
    }

    /// Admits a sync request.
    ///
    /// Validation happens synchronously and strictly before the busy flag
    /// is consulted, so a malformed request is rejected the same way
    /// whether the orchestrator is idle or busy, and never starts I/O.
    /// Must be called from within a tokio runtime.
    pub fn request_sync(&self, request: &SyncRequest) -> Result<Admission> {
        request.target.validate()?;
        let timeout = match &request.timeout {
            Some(value) => parse_timeout(value)?,
            None => self.default_timeout,
        };
        let syncer = self
            .factory
            .build(&request.source, &request.target.path, timeout)?;

        log::info!(
            "sync requested: type={} target={} timeout={:?}",
            request.source.kind,
            request.target.path.display(),
            timeout
        );
        Ok(self.launch(syncer))
    }

    /// Starts `syncer` asynchronously if no job is running.
    fn launch(&self, syncer: Box<dyn Syncer>) -> Admission {
        let Some(guard) = self.flag.try_acquire() else {
            log::warn!("sync rejected: another synchronization is in progress");
            return Admission::Busy;
        };

        tokio::spawn(async move {
            // The guard rides inside the task; its drop is the single
            // release point, even if sync() panics.
            let _guard = guard;
            match syncer.sync().await {
                Ok(()) => log::info!("sync completed successfully"),
                Err(e) => log::error!("sync failed ({}): {}", e.kind().as_str(), e),
            }
        });

        Admission::Accepted
    }

    /// Whether a job is currently running.
    pub fn is_busy(&self) -> bool {
        self.flag.is_set()
    }
}

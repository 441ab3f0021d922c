//! Per-job deadline tracking.

use std::time::{Duration, Instant};

use crate::error::{Result, SyncError};

/// Deadline shared by every I/O step of one sync job.
///
/// Created once when the job starts; each step asks for the remaining
/// budget and receives `SyncError::Timeout` once the budget is spent, so a
/// slow early step shrinks what the later steps may use.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    end: Instant,
    total: Duration,
}

impl Deadline {
    /// Starts a deadline `total` from now.
    pub fn after(total: Duration) -> Self {
        Self {
            end: Instant::now() + total,
            total,
        }
    }

    /// Remaining budget, or a timeout error when it is exhausted.
    pub fn remaining(&self) -> Result<Duration> {
        let now = Instant::now();
        if now >= self.end {
            return Err(self.expired());
        }
        Ok(self.end - now)
    }

    /// Remaining budget capped at `limit`, for steps with their own bound
    /// (e.g. a connectivity probe).
    pub fn remaining_capped(&self, limit: Duration) -> Result<Duration> {
        Ok(self.remaining()?.min(limit))
    }

    /// The timeout error for this deadline, reporting the full budget.
    pub fn expired(&self) -> SyncError {
        SyncError::Timeout(self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_shrinks_toward_zero() {
        let deadline = Deadline::after(Duration::from_secs(60));
        let first = deadline.remaining().unwrap();
        assert!(first <= Duration::from_secs(60));
        assert!(first > Duration::from_secs(59));
    }

    #[test]
    fn expired_deadline_errors() {
        let deadline = Deadline::after(Duration::from_millis(0));
        let err = deadline.remaining().unwrap_err();
        assert!(matches!(err, SyncError::Timeout(_)));
    }

    #[test]
    fn capped_remaining_honors_the_cap() {
        let deadline = Deadline::after(Duration::from_secs(300));
        let capped = deadline
            .remaining_capped(Duration::from_secs(10))
            .unwrap();
        assert!(capped <= Duration::from_secs(10));
    }
}

//! Cooperative cancellation for long raster work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::{ZoniError, ZoniResult};

/// Shared cancel flag plus an optional deadline. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Same flag, deadline replaced when `timeout` is given and earlier.
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        let candidate = timeout.and_then(|t| Instant::now().checked_add(t));
        let deadline = match (self.deadline, candidate) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Self {
            flag: Arc::clone(&self.flag),
            deadline,
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// `Err(Cancelled)` once cancelled or past the deadline.
    pub fn check(&self, stage: &str) -> ZoniResult<()> {
        if self.flag.load(Ordering::Relaxed) {
            return Err(ZoniError::Cancelled(format!("{stage}: cancelled by caller")));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(ZoniError::Cancelled(format!("{stage}: deadline exceeded")));
        }
        Ok(())
    }
}

//! Global request throttle
//!
//! One [`RateLimiter`] is shared by every request a client makes, so
//! concurrent callers are serialized to at most one request per
//! `min_interval`.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::CeError;
use crate::retry::sleep_cancellable;
use crate::Result;

/// Enforces a minimum interval between consecutive requests.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Wait until the next request may go out, then claim the slot.
    ///
    /// The guard is held while sleeping so waiters queue up behind each
    /// other. Cancellation is observed both while queued and while sleeping.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(CeError::Cancelled);
        }

        // async mutex: the guard lives across the pacing sleep below
        let mut last = tokio::select! {
            guard = self.last.lock() => guard,
            _ = cancel.cancelled() => return Err(CeError::Cancelled),
        };

        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                sleep_cancellable(self.min_interval - elapsed, cancel).await?;
            }
        }
        *last = Some(Instant::now());
        Ok(())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_millis(120))
    }
}

//! Request counters for a client instance.
//!
//! Counters are incremented silently at the call site. Call
//! [`ClientMetrics::flush`] to emit the current values as a single
//! `tracing::info!` event (e.g. at the end of a probe run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Lightweight atomic counters, no locking.
#[derive(Debug, Default)]
pub struct ClientMetrics {
    requests_sent: AtomicU64,
    retries: AtomicU64,
    compiles: AtomicU64,
    cache_hits: AtomicU64,
}

/// Point-in-time copy of [`ClientMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub requests_sent: u64,
    pub retries: u64,
    pub compiles: u64,
    pub cache_hits: u64,
}

impl ClientMetrics {
    pub const fn new() -> Self {
        Self {
            requests_sent: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            compiles: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
        }
    }

    /// One HTTP attempt went out (retries included).
    pub fn inc_requests(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// A compile was answered by the service (not the cache).
    pub fn inc_compiles(&self) {
        self.compiles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cache_hits", "counter incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            compiles: self.compiles.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            requests_sent = s.requests_sent,
            retries = s.retries,
            compiles = s.compiles,
            cache_hits = s.cache_hits,
        );
    }
}

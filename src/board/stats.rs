use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters updated by the update pipeline and the read paths.
pub(crate) struct BoardStats {
    updates: AtomicU64,
    sync_applies: AtomicU64,
    batches: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl BoardStats {
    pub(crate) fn new() -> Self {
        BoardStats {
            updates: AtomicU64::new(0),
            sync_applies: AtomicU64::new(0),
            batches: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn record_updates(&self, count: u64) {
        self.updates.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_sync_apply(&self) {
        self.sync_applies.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_batch(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BoardMetrics {
        BoardMetrics {
            updates: self.updates.load(Ordering::Relaxed),
            sync_applies: self.sync_applies.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of leaderboard activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardMetrics {
    /// Score updates applied (batched and synchronous).
    pub updates: u64,
    /// Updates that bypassed the queue because it was full.
    pub sync_applies: u64,
    /// Mutation commits (each bumps the version and drops the cache).
    pub batches: u64,
    /// `top_n` reads served from the rank cache.
    pub cache_hits: u64,
    /// `top_n` reads that had to consult the skip list.
    pub cache_misses: u64,
}

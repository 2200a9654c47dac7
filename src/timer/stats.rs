use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters updated by the scheduling and firing paths.
pub(crate) struct TimerStats {
    scheduled: AtomicU64,
    fired: AtomicU64,
    cancelled: AtomicU64,
    panicked: AtomicU64,
}

impl TimerStats {
    pub(crate) fn new() -> Self {
        TimerStats {
            scheduled: AtomicU64::new(0),
            fired: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn record_scheduled(&self) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_fired(&self) {
        self.fired.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> TimerMetrics {
        TimerMetrics {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            fired: self.fired.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of timer activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerMetrics {
    /// Tasks accepted by `schedule_at` / `schedule_after`.
    pub scheduled: u64,
    /// Actions that ran to completion.
    pub fired: u64,
    /// Successful cancellations.
    pub cancelled: u64,
    /// Actions that panicked and were suppressed.
    pub panicked: u64,
}

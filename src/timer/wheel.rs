//! Hierarchical wheel levels.
//!
//! ## Algorithm
//!
//! A level is a ring of `size` buckets, each spanning one `tick_ms`, so the
//! level covers `interval_ms = tick_ms * size` from its current tick.  A
//! task due beyond that range is delegated to an overflow level whose tick
//! equals this level's whole interval; overflow levels are created lazily,
//! at most once, the first time a task needs one.  All levels share one
//! delay queue: a bucket enters the queue when its first occupant sets its
//! expiration, and the driver advances the clock and flushes buckets as the
//! queue delivers them.
//!
//! When an overflow bucket is flushed, each of its tasks is re-offered to
//! the root level (`try_add` in the driver): still-distant tasks land in a
//! coarse bucket again, nearer ones fall into a finer slot, and tasks whose
//! deadline is inside the current tick fire.  Nothing is dropped.
//!
//! ## References
//! - Varghese & Lauck (1987). *Hashed and Hierarchical Timing Wheels.*
//! - Kafka: `kafka.utils.timer.TimingWheel` (purgatory timer).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};

use super::bucket::Bucket;
use super::delay_queue::DelayQueue;
use super::task::TimerTask;

/// Rounds `x` down to a multiple of `m`.
#[inline]
pub(crate) fn truncate(x: i64, m: i64) -> i64 {
    x - x % m
}

pub(crate) struct Wheel {
    tick_ms: i64,
    size: i64,
    /// `tick_ms * size`; a task farther out than this overflows.
    interval_ms: i64,
    /// Always a multiple of `tick_ms`.
    current_tick_ms: AtomicI64,
    buckets: Vec<Arc<Bucket>>,
    /// Shared across every level of the hierarchy.
    queue: Arc<DelayQueue<Arc<Bucket>>>,
    /// Coarser level, created on first use.  `OnceLock` gives the
    /// create-once CAS semantics without a nullable pointer.
    overflow: OnceLock<Box<Wheel>>,
}

impl Wheel {
    pub(crate) fn new(
        tick_ms: i64,
        size: i64,
        start_ms: i64,
        queue: Arc<DelayQueue<Arc<Bucket>>>,
    ) -> Self {
        debug_assert!(tick_ms > 0 && size > 0);
        Wheel {
            tick_ms,
            size,
            interval_ms: tick_ms * size,
            current_tick_ms: AtomicI64::new(truncate(start_ms, tick_ms)),
            buckets: (0..size).map(|_| Bucket::new()).collect(),
            queue,
            overflow: OnceLock::new(),
        }
    }

    /// Places `task` into the hierarchy.
    ///
    /// Returns `false` when the deadline is inside the current tick: the
    /// caller must fire the task immediately instead.
    pub(crate) fn add(&self, task: &Arc<TimerTask>) -> bool {
        let current = self.current_tick_ms.load(Ordering::SeqCst);
        let expiry = task.expiry_ms();

        if expiry < current + self.tick_ms {
            // Already inside the current tick.
            false
        } else if expiry < current + self.interval_ms {
            let virtual_id = expiry / self.tick_ms;
            let bucket = &self.buckets[(virtual_id % self.size) as usize];
            bucket.add(Arc::clone(task));
            // First occupant of this incarnation puts the bucket in the
            // delay queue; later tasks for the same slot ride along.
            if bucket.set_expiration(virtual_id * self.tick_ms) {
                self.queue.offer(Arc::clone(bucket), virtual_id * self.tick_ms);
            }
            true
        } else {
            self.overflow(current).add(task)
        }
    }

    fn overflow(&self, current_ms: i64) -> &Wheel {
        &**self.overflow.get_or_init(|| {
            tracing::debug!(
                tick_ms = self.interval_ms,
                size = self.size,
                "creating overflow wheel"
            );
            Box::new(Wheel::new(
                self.interval_ms,
                self.size,
                current_ms,
                Arc::clone(&self.queue),
            ))
        })
    }

    /// Advances this level (and, transitively, coarser levels) to the tick
    /// containing `time_ms`.  A no-op unless at least one whole tick has
    /// passed.
    pub(crate) fn advance_clock(&self, time_ms: i64) {
        let current = self.current_tick_ms.load(Ordering::SeqCst);
        if time_ms >= current + self.tick_ms {
            let aligned = truncate(time_ms, self.tick_ms);
            self.current_tick_ms.store(aligned, Ordering::SeqCst);
            if let Some(overflow) = self.overflow.get() {
                overflow.advance_clock(aligned);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn current_tick_ms(&self) -> i64 {
        self.current_tick_ms.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn overflow_tick_ms(&self) -> Option<i64> {
        self.overflow.get().map(|w| w.tick_ms)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

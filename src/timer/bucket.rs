//! A wheel slot: the tasks due in one tick-aligned instant.
//!
//! A bucket cycles between two states.  While `expiration_ms == VACANT` it
//! is idle; the first task linked into it flips the expiration to a real
//! deadline, and that flip is the caller's signal to offer the bucket into
//! the shared delay queue.  When the delay queue delivers it, the driver
//! flushes it and the expiration resets to `VACANT`, ready for the ring
//! slot's next revolution.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::task::TimerTask;

/// Sentinel expiration for a bucket not currently in the delay queue.
pub(crate) const VACANT: i64 = -1;

pub(crate) struct Bucket {
    /// Absolute tick-aligned deadline, or [`VACANT`].
    expiration_ms: AtomicI64,
    /// Linked tasks in insertion order.  Firing order within one bucket
    /// follows this order.
    tasks: Mutex<Vec<Arc<TimerTask>>>,
}

impl Bucket {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Bucket {
            expiration_ms: AtomicI64::new(VACANT),
            tasks: Mutex::new(Vec::new()),
        })
    }

    #[inline]
    pub(crate) fn expiration_ms(&self) -> i64 {
        self.expiration_ms.load(Ordering::SeqCst)
    }

    /// Atomically replaces the expiration; `true` iff the value changed.
    ///
    /// The first change away from [`VACANT`] marks the bucket's entry into
    /// the delay queue for this incarnation.
    pub(crate) fn set_expiration(&self, expiration_ms: i64) -> bool {
        self.expiration_ms.swap(expiration_ms, Ordering::SeqCst) != expiration_ms
    }

    /// Links `task` at the tail and installs the back-reference.
    pub(crate) fn add(self: &Arc<Self>, task: Arc<TimerTask>) {
        let mut tasks = self.tasks.lock();
        task.set_bucket(Some(Arc::downgrade(self)));
        tasks.push(task);
    }

    /// Unlinks `task` iff its back-reference still points at this bucket.
    ///
    /// Returns `false` when the task has already been flushed out (the
    /// back-reference moved or cleared) or was never linked here.
    pub(crate) fn remove(self: &Arc<Self>, task: &Arc<TimerTask>) -> bool {
        let mut tasks = self.tasks.lock();
        match task.bucket() {
            Some(owner) if Arc::ptr_eq(&owner, self) => {}
            _ => return false,
        }
        let Some(pos) = tasks.iter().position(|t| Arc::ptr_eq(t, task)) else {
            return false;
        };
        tasks.remove(pos);
        task.set_bucket(None);
        true
    }

    /// Two-phase drain.
    ///
    /// Phase one, under the lock: detach every task, clear back-references,
    /// reset the expiration to [`VACANT`].  Phase two, lock released: run
    /// `reinsert` on each task in insertion order.  Reinsertion re-enters
    /// the wheel and may take other bucket locks, so it must not run under
    /// this bucket's lock.
    pub(crate) fn flush(&self, reinsert: impl Fn(Arc<TimerTask>)) {
        let drained = {
            let mut tasks = self.tasks.lock();
            for task in tasks.iter() {
                task.set_bucket(None);
            }
            self.set_expiration(VACANT);
            std::mem::take(&mut *tasks)
        };
        for task in drained {
            reinsert(task);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.tasks.lock().len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Cancellable timer task and its user-facing handle.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::bucket::Bucket;
use super::stats::TimerStats;

/// A scheduled action.  Taken out of the task exactly once, either by the
/// fire path or never (cancelled tasks keep it until dropped).
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Internal task state shared between the wheel, its bucket, and the
/// user-held [`TaskHandle`].
///
/// The back-reference to the owning bucket is a `Weak` handle swapped under
/// a small mutex: the bucket list owns the strong side, so dropping a wheel
/// frees every pending task without reference cycles.
pub(crate) struct TimerTask {
    expiry_ms: i64,
    job: Mutex<Option<Job>>,
    bucket: Mutex<Option<Weak<Bucket>>>,
}

impl TimerTask {
    pub(crate) fn new(expiry_ms: i64, job: Job) -> Arc<Self> {
        Arc::new(TimerTask {
            expiry_ms,
            job: Mutex::new(Some(job)),
            bucket: Mutex::new(None),
        })
    }

    /// Absolute deadline; immutable after creation.
    #[inline]
    pub(crate) fn expiry_ms(&self) -> i64 {
        self.expiry_ms
    }

    /// Removes and returns the job.  `None` if it already ran.
    pub(crate) fn take_job(&self) -> Option<Job> {
        self.job.lock().take()
    }

    /// Upgrades the bucket back-reference, if the task is currently linked.
    pub(crate) fn bucket(&self) -> Option<Arc<Bucket>> {
        self.bucket.lock().as_ref().and_then(Weak::upgrade)
    }

    pub(crate) fn set_bucket(&self, bucket: Option<Weak<Bucket>>) {
        *self.bucket.lock() = bucket;
    }
}

/// Handle returned by [`TimingWheel::schedule_at`]; lets the caller cancel
/// a pending task.
///
/// [`TimingWheel::schedule_at`]: super::TimingWheel::schedule_at
#[derive(Clone)]
pub struct TaskHandle {
    task: Arc<TimerTask>,
    stats: Arc<TimerStats>,
}

impl TaskHandle {
    pub(crate) fn new(task: Arc<TimerTask>, stats: Arc<TimerStats>) -> Self {
        TaskHandle { task, stats }
    }

    /// The task's absolute deadline in milliseconds.
    pub fn expiry_ms(&self) -> i64 {
        self.task.expiry_ms()
    }

    /// Best-effort cancellation.
    ///
    /// Returns `true` iff the task was unlinked from a bucket before
    /// firing; after a `true` return the action will never run.  A task
    /// that already fired, was dispatched immediately at schedule time, or
    /// is mid-flush returns `false`.
    ///
    /// The loop follows the back-reference: a concurrent flush may move
    /// the task to a finer-grained bucket between the read and the
    /// `remove` call, in which case `remove` fails and the new bucket is
    /// tried.  The loop ends when the back-reference is empty.
    pub fn cancel(&self) -> bool {
        let mut cancelled = false;
        while let Some(bucket) = self.task.bucket() {
            cancelled = bucket.remove(&self.task);
        }
        if cancelled {
            self.stats.record_cancelled();
        }
        cancelled
    }
}

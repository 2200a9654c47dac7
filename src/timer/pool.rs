//! Fire pool: runs user actions off the driver threads.
//!
//! The drain worker must never execute user code inline, or one slow or
//! panicking action would stall every later bucket.  Jobs are pushed onto
//! an unbounded channel and executed by a small set of worker threads, each
//! dispatch wrapped in `catch_unwind`: a panicking action is logged and
//! suppressed, and the worker loop continues.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::unbounded;

use super::stats::TimerStats;
use super::task::Job;

pub(crate) struct FirePool {
    tx: crossbeam_channel::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl FirePool {
    pub(crate) fn spawn(size: usize, stats: Arc<TimerStats>) -> Self {
        let (tx, rx) = unbounded::<Job>();
        let workers = (0..size)
            .map(|_| {
                let rx = rx.clone();
                let stats = Arc::clone(&stats);
                std::thread::spawn(move || {
                    for job in rx.iter() {
                        match catch_unwind(AssertUnwindSafe(job)) {
                            Ok(()) => stats.record_fired(),
                            Err(payload) => {
                                stats.record_panicked();
                                let msg = payload
                                    .downcast_ref::<&str>()
                                    .map(|s| (*s).to_owned())
                                    .or_else(|| payload.downcast_ref::<String>().cloned())
                                    .unwrap_or_else(|| "non-string panic payload".to_owned());
                                tracing::error!(panic = %msg, "timer action panicked");
                            }
                        }
                    }
                })
            })
            .collect();
        FirePool { tx, workers }
    }

    /// Queues a job; never blocks the caller.
    pub(crate) fn execute(&self, job: Job) {
        // Send only fails after shutdown dropped the receiver side; a job
        // arriving that late is discarded, matching stop() semantics.
        let _ = self.tx.send(job);
    }

    /// Drains queued jobs and joins every worker.
    pub(crate) fn shutdown(self) {
        drop(self.tx);
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn jobs_run_and_are_counted() {
        let stats = Arc::new(TimerStats::new());
        let pool = FirePool::spawn(2, Arc::clone(&stats));
        let ran = Arc::new(AtomicU32::new(0));
        for _ in 0..10 {
            let ran = Arc::clone(&ran);
            pool.execute(Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        pool.shutdown();
        assert_eq!(ran.load(Ordering::SeqCst), 10);
        assert_eq!(stats.snapshot().fired, 10);
    }

    #[test]
    fn panicking_job_does_not_kill_the_worker() {
        let stats = Arc::new(TimerStats::new());
        let pool = FirePool::spawn(1, Arc::clone(&stats));
        let ran = Arc::new(AtomicU32::new(0));

        pool.execute(Box::new(|| panic!("boom")));
        let ran2 = Arc::clone(&ran);
        pool.execute(Box::new(move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        }));
        pool.shutdown();

        assert_eq!(ran.load(Ordering::SeqCst), 1, "job after the panic still ran");
        let snap = stats.snapshot();
        assert_eq!(snap.panicked, 1);
        assert_eq!(snap.fired, 1);
    }
}

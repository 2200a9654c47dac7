//! Hierarchical timing wheel with a delay-queue driver.
//!
//! A cancellable in-process timer scheduler: near-constant insertion cost,
//! expiry-driven advancement (the driver sleeps exactly until the next
//! bucket deadline, no fixed-frequency polling), and lazy overflow wheels
//! for arbitrarily far deadlines.
//!
//! Two background threads drive a started wheel: the **poll worker** runs
//! the delay queue and delivers expired buckets; the **drain worker**
//! advances the wheel clock and flushes each bucket, reinserting tasks that
//! are not yet due (the cascade) and firing the rest on a small worker
//! pool.
//!
//! # Example
//! ```
//! use flywheel::timer::TimerBuilder;
//! use std::sync::mpsc::channel;
//! use std::time::Duration;
//!
//! let wheel = TimerBuilder::new(20, 64).build().unwrap();
//! wheel.start();
//!
//! let (tx, rx) = channel();
//! wheel.schedule_after(40, move || {
//!     let _ = tx.send("fired");
//! });
//! assert_eq!(rx.recv_timeout(Duration::from_secs(2)), Ok("fired"));
//!
//! wheel.stop();
//! ```

mod bucket;
mod delay_queue;
mod pool;
mod pqueue;
mod stats;
mod task;
mod wheel;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::Error;
use bucket::Bucket;
use delay_queue::DelayQueue;
use pool::FirePool;
use stats::TimerStats;
use task::TimerTask;
use wheel::Wheel;

pub use stats::TimerMetrics;
pub use task::TaskHandle;

/// Millisecond clock capability.  All deadlines handed to the wheel must
/// use the same base as the clock it was built with.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a [`TimingWheel`].
///
/// # Example
/// ```
/// use flywheel::timer::TimerBuilder;
///
/// let wheel = TimerBuilder::new(100, 512)
///     .workers(4)
///     .build()
///     .unwrap();
/// ```
pub struct TimerBuilder {
    tick_ms: i64,
    wheel_size: i64,
    start_ms: Option<i64>,
    clock: Option<Clock>,
    workers: usize,
    queue_capacity: usize,
}

impl TimerBuilder {
    /// `tick_ms` is the finest wheel granularity; `wheel_size` the number
    /// of buckets per level.  One level spans `tick_ms * wheel_size`
    /// milliseconds; longer deadlines overflow to coarser levels.
    pub fn new(tick_ms: i64, wheel_size: i64) -> Self {
        TimerBuilder {
            tick_ms,
            wheel_size,
            start_ms: None,
            clock: None,
            workers: 2,
            queue_capacity: 64,
        }
    }

    /// Anchors the wheel at an explicit start time instead of the clock's
    /// current reading.
    pub fn start_ms(mut self, ms: i64) -> Self {
        self.start_ms = Some(ms);
        self
    }

    /// Supplies the millisecond time source.  Defaults to milliseconds
    /// elapsed since build time.
    pub fn clock<F>(mut self, now_fn: F) -> Self
    where
        F: Fn() -> i64 + Send + Sync + 'static,
    {
        self.clock = Some(Arc::new(now_fn));
        self
    }

    /// Number of fire-pool threads running user actions (default: 2).
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    pub fn build(self) -> Result<TimingWheel, Error> {
        if self.tick_ms <= 0 {
            return Err(Error::InvalidArgument("tick_ms must be positive"));
        }
        if self.wheel_size <= 0 {
            return Err(Error::InvalidArgument("wheel_size must be positive"));
        }
        if self.workers == 0 {
            return Err(Error::InvalidArgument("workers must be at least 1"));
        }

        let clock: Clock = self.clock.unwrap_or_else(|| {
            let epoch = Instant::now();
            Arc::new(move || epoch.elapsed().as_millis() as i64)
        });
        let start_ms = self.start_ms.unwrap_or_else(|| clock());
        let stats = Arc::new(TimerStats::new());
        let queue = Arc::new(DelayQueue::with_capacity(self.queue_capacity));

        Ok(TimingWheel {
            inner: Arc::new(TimerInner {
                wheel: Wheel::new(self.tick_ms, self.wheel_size, start_ms, Arc::clone(&queue)),
                queue,
                clock,
                pool: Mutex::new(Some(FirePool::spawn(self.workers, Arc::clone(&stats)))),
                stats,
            }),
            running: Mutex::new(None),
            stopped: AtomicBool::new(false),
        })
    }
}

// ---------------------------------------------------------------------------
// TimingWheel
// ---------------------------------------------------------------------------

struct TimerInner {
    wheel: Wheel,
    queue: Arc<DelayQueue<Arc<Bucket>>>,
    clock: Clock,
    /// Taken (and shut down) once on `stop`.
    pool: Mutex<Option<FirePool>>,
    stats: Arc<TimerStats>,
}

impl TimerInner {
    /// Inserts `task` into the hierarchy, or fires it immediately when its
    /// deadline is already inside the current tick.  Doubles as the
    /// cascade reinsertion path during bucket flush.
    fn try_add(&self, task: Arc<TimerTask>) {
        if !self.wheel.add(&task) {
            if let Some(job) = task.take_job() {
                if let Some(pool) = &*self.pool.lock() {
                    pool.execute(job);
                }
            }
        }
    }
}

struct Running {
    stop_tx: Sender<()>,
    poll_worker: JoinHandle<()>,
    drain_worker: JoinHandle<()>,
}

/// A started wheel owns two driver threads and a fire pool; [`stop`]
/// closes the stop channel and joins all of them before returning.
///
/// The handle is cheap to share (`Arc` inside) and all methods take
/// `&self`.
///
/// [`stop`]: TimingWheel::stop
pub struct TimingWheel {
    inner: Arc<TimerInner>,
    running: Mutex<Option<Running>>,
    stopped: AtomicBool,
}

impl TimingWheel {
    /// Spawns the poll and drain workers.  A no-op if already started or
    /// already stopped; the wheel lifecycle is start-once / stop-once.
    pub fn start(&self) {
        let mut running = self.running.lock();
        if running.is_some() || self.stopped.load(Ordering::SeqCst) {
            return;
        }

        let (stop_tx, stop_rx) = bounded::<()>(0);

        let poll_worker = {
            let inner = Arc::clone(&self.inner);
            let stop = stop_rx.clone();
            std::thread::spawn(move || {
                let clock = Arc::clone(&inner.clock);
                let now = move || clock();
                inner.queue.poll(&stop, &now);
            })
        };

        let drain_worker = {
            let inner = Arc::clone(&self.inner);
            let stop = stop_rx;
            std::thread::spawn(move || drain_loop(&inner, &stop))
        };

        tracing::debug!("timing wheel started");
        *running = Some(Running {
            stop_tx,
            poll_worker,
            drain_worker,
        });
    }

    /// Schedules `job` to run at the absolute deadline `expiry_ms` (same
    /// base as the wheel's clock).  A deadline already inside the current
    /// tick fires immediately on the pool.
    pub fn schedule_at<F>(&self, expiry_ms: i64, job: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let task = TimerTask::new(expiry_ms, Box::new(job));
        self.inner.stats.record_scheduled();
        self.inner.try_add(Arc::clone(&task));
        TaskHandle::new(task, Arc::clone(&self.inner.stats))
    }

    /// Schedules `job` to run `delay_ms` from now.  Negative delays are
    /// treated as zero.
    pub fn schedule_after<F>(&self, delay_ms: i64, job: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let now = (self.inner.clock)();
        self.schedule_at(now + delay_ms.max(0), job)
    }

    /// Stops the drivers and blocks until both workers and the fire pool
    /// have exited.  Idempotent.  After `stop` returns no further timer
    /// actions run.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let Some(running) = self.running.lock().take() else {
            return;
        };
        drop(running.stop_tx);
        let _ = running.poll_worker.join();
        let _ = running.drain_worker.join();
        if let Some(pool) = self.inner.pool.lock().take() {
            pool.shutdown();
        }
        tracing::debug!("timing wheel stopped");
    }

    /// Point-in-time counters for scheduled / fired / cancelled / panicked
    /// tasks.
    pub fn metrics(&self) -> TimerMetrics {
        self.inner.stats.snapshot()
    }
}

impl Drop for TimingWheel {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Drain worker: advances the clock to each expired bucket and flushes it,
/// reclassifying every entry through `try_add`.
fn drain_loop(inner: &TimerInner, stop: &Receiver<()>) {
    loop {
        select! {
            recv(stop) -> _ => return,
            recv(inner.queue.expired()) -> msg => {
                let Ok(bucket) = msg else { return };
                inner.wheel.advance_clock(bucket.expiration_ms());
                bucket.flush(|task| inner.try_add(task));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests (driver-level; scenario tests live in tests/timer.rs)
// ---------------------------------------------------------------------------

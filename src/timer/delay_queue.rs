//! Blocking delay queue: consumers sleep exactly until the head deadline.
//!
//! ## Protocol
//!
//! A single consumer runs [`DelayQueue::poll`] on its own thread.  Producers
//! call [`DelayQueue::offer`] from anywhere.  Progress is expiry-driven,
//! never polled on a fixed frequency:
//!
//! - The consumer peeks the heap; if the head is due it is popped and handed
//!   to the `expired` rendezvous channel.
//! - If the head is `delta` ms in the future, the consumer parks on
//!   `select! { wakeup, after(delta), stop }`.
//! - A producer that installs a **new head** while the consumer sleeps
//!   clears the `sleeping` flag with a CAS and sends one token on the
//!   capacity-1 wakeup channel.  The CAS guarantees at most one token is in
//!   flight, so `try_send` never meets a full buffer.
//!
//! The delicate case is a timeout racing an offer: the consumer's timer
//! fires while a producer concurrently wins the CAS.  On timeout the
//! consumer swaps `sleeping` to `false`; seeing that the flag was *already*
//! cleared, it drains the producer's token with a blocking `recv` before
//! looping, so a stale token can never wake a later park spuriously.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{after, bounded, select, Receiver, Sender};
use parking_lot::Mutex;

use super::pqueue::PriorityQueue;

pub(crate) struct DelayQueue<T> {
    heap: Mutex<PriorityQueue<T>>,
    /// True while the consumer is parked (or about to park) with an empty
    /// or not-yet-due heap.  Set before the heap mutex is released so a
    /// racing `offer` cannot miss the parked state.
    sleeping: AtomicBool,
    wakeup_tx: Sender<()>,
    wakeup_rx: Receiver<()>,
    expired_tx: Sender<T>,
    expired_rx: Receiver<T>,
}

impl<T: Send> DelayQueue<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        let (wakeup_tx, wakeup_rx) = bounded(1);
        // Rendezvous channel: an expired payload is handed directly to the
        // drain worker, keeping at most one popped item outside the heap.
        let (expired_tx, expired_rx) = bounded(0);
        DelayQueue {
            heap: Mutex::new(PriorityQueue::with_capacity(capacity)),
            sleeping: AtomicBool::new(false),
            wakeup_tx,
            wakeup_rx,
            expired_tx,
            expired_rx,
        }
    }

    /// Channel on which expired payloads are delivered, in deadline order.
    pub(crate) fn expired(&self) -> &Receiver<T> {
        &self.expired_rx
    }

    /// Inserts `payload` with an absolute millisecond deadline.
    ///
    /// Wakes the consumer iff the payload became the new heap root while
    /// the consumer was sleeping.
    pub(crate) fn offer(&self, payload: T, expiration_ms: i64) {
        let index = self.heap.lock().offer(payload, expiration_ms);
        if index == 0
            && self
                .sleeping
                .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            // Sole winner of the CAS; the slot in the wakeup channel is free.
            let _ = self.wakeup_tx.try_send(());
        }
    }

    /// Single-consumer loop: delivers due payloads to [`expired`] until the
    /// stop channel closes.
    ///
    /// `now_fn` supplies the current time in milliseconds on the same base
    /// as the deadlines passed to [`offer`].
    ///
    /// [`expired`]: DelayQueue::expired
    pub(crate) fn poll(&self, stop: &Receiver<()>, now_fn: &dyn Fn() -> i64) {
        loop {
            let now = now_fn();

            let (item, delta) = {
                let mut heap = self.heap.lock();
                let (item, delta) = heap.peek_and_shift(now);
                if item.is_none() {
                    self.sleeping.store(true, Ordering::SeqCst);
                }
                (item, delta)
            };

            match item {
                Some(payload) => {
                    select! {
                        send(self.expired_tx, payload) -> res => {
                            if res.is_err() {
                                return; // drain side went away
                            }
                        }
                        recv(stop) -> _ => return,
                    }
                }
                None if delta == 0 => {
                    // Empty heap: park until a producer wakes us.
                    select! {
                        recv(self.wakeup_rx) -> _ => continue,
                        recv(stop) -> _ => return,
                    }
                }
                None => {
                    select! {
                        recv(self.wakeup_rx) -> _ => continue,
                        recv(after(Duration::from_millis(delta as u64))) -> _ => {
                            if !self.sleeping.swap(false, Ordering::SeqCst) {
                                // A concurrent offer won the CAS between our
                                // timeout and this swap; its token is in (or
                                // entering) the channel.  Drain it so the next
                                // park does not wake immediately.
                                let _ = self.wakeup_rx.recv();
                            }
                        }
                        recv(stop) -> _ => return,
                    }
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.heap.lock().len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    fn millis_clock() -> (Instant, impl Fn() -> i64) {
        let epoch = Instant::now();
        (epoch, move || epoch.elapsed().as_millis() as i64)
    }

    fn spawn_poller(
        dq: Arc<DelayQueue<u32>>,
        stop: Receiver<()>,
    ) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            let (_epoch, now) = millis_clock();
            dq.poll(&stop, &now);
        })
    }

    #[test]
    fn due_item_is_delivered_after_its_delay() {
        let dq = Arc::new(DelayQueue::with_capacity(8));
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let handle = spawn_poller(Arc::clone(&dq), stop_rx);

        let t0 = Instant::now();
        dq.offer(7, 60);
        let got = dq
            .expired()
            .recv_timeout(Duration::from_secs(2))
            .expect("item should be delivered");
        assert_eq!(got, 7);
        assert!(
            t0.elapsed() >= Duration::from_millis(50),
            "delivered too early: {:?}",
            t0.elapsed()
        );

        drop(stop_tx);
        handle.join().unwrap();
    }

    #[test]
    fn offer_wakes_a_sleeping_consumer() {
        let dq = Arc::new(DelayQueue::with_capacity(8));
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let handle = spawn_poller(Arc::clone(&dq), stop_rx);

        // Let the consumer park on an empty heap first.
        std::thread::sleep(Duration::from_millis(50));
        assert!(dq.sleeping.load(Ordering::SeqCst), "consumer should be parked");

        dq.offer(42, 0); // already due; must wake and deliver promptly
        let got = dq
            .expired()
            .recv_timeout(Duration::from_millis(500))
            .expect("wakeup should deliver the item");
        assert_eq!(got, 42);

        drop(stop_tx);
        handle.join().unwrap();
    }

    #[test]
    fn new_root_preempts_a_longer_sleep() {
        let dq = Arc::new(DelayQueue::with_capacity(8));
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let handle = spawn_poller(Arc::clone(&dq), stop_rx);

        dq.offer(1, 5_000); // consumer sleeps toward a far deadline
        std::thread::sleep(Duration::from_millis(30));
        dq.offer(2, 0); // nearer deadline must preempt it

        let got = dq
            .expired()
            .recv_timeout(Duration::from_millis(500))
            .expect("new root should be delivered promptly");
        assert_eq!(got, 2);
        assert_eq!(dq.len(), 1, "far item remains queued");

        drop(stop_tx);
        handle.join().unwrap();
    }

    #[test]
    fn closing_stop_unblocks_the_poll_loop() {
        let dq: Arc<DelayQueue<u32>> = Arc::new(DelayQueue::with_capacity(8));
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let handle = spawn_poller(Arc::clone(&dq), stop_rx);

        std::thread::sleep(Duration::from_millis(20));
        drop(stop_tx);
        handle.join().unwrap(); // must not hang
    }

    #[test]
    fn items_arrive_in_deadline_order() {
        let dq = Arc::new(DelayQueue::with_capacity(8));
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let handle = spawn_poller(Arc::clone(&dq), stop_rx);

        dq.offer(3, 90);
        dq.offer(1, 30);
        dq.offer(2, 60);

        let mut got = Vec::new();
        for _ in 0..3 {
            got.push(dq.expired().recv_timeout(Duration::from_secs(2)).unwrap());
        }
        assert_eq!(got, vec![1, 2, 3]);

        drop(stop_tx);
        handle.join().unwrap();
    }
}

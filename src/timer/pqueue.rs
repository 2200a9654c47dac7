//! Binary min-heap keyed by absolute millisecond deadlines.
//!
//! This is the storage layer underneath [`DelayQueue`]: the queue holds the
//! mutex and the wakeup machinery, the heap just orders payloads.  Two
//! departures from a stock binary heap:
//!
//! - `peek_and_shift` combines "is the head due?" and "pop it" into one
//!   call, returning the remaining wait in milliseconds when the head is
//!   still in the future.  The delay-queue consumer sleeps exactly that
//!   long instead of polling.
//! - Equal deadlines are ordered by an offer sequence number, so buckets
//!   that expire on the same instant are delivered in the order they were
//!   offered.
//!
//! Capacity is managed for bursty loads: the slab grows geometrically and
//! is halved once utilization falls below a quarter of a large allocation.
//!
//! [`DelayQueue`]: super::delay_queue::DelayQueue

/// Deadlines at or below this value are clamped on `offer`.
pub(crate) const MIN_PRIORITY_MS: i64 = 0;

/// Shrink is considered only above this capacity.
const SHRINK_FLOOR: usize = 64;

struct Slot<T> {
    priority: i64,
    /// Tie-breaker: offer order within equal priorities.
    seq: u64,
    payload: T,
}

impl<T> Slot<T> {
    #[inline]
    fn key(&self) -> (i64, u64) {
        (self.priority, self.seq)
    }
}

/// A min-heap of `(priority_ms, payload)` pairs.
///
/// Not thread-safe on its own; [`DelayQueue`](super::delay_queue::DelayQueue)
/// wraps it in a mutex.
pub(crate) struct PriorityQueue<T> {
    slots: Vec<Slot<T>>,
    next_seq: u64,
}

impl<T> PriorityQueue<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        PriorityQueue {
            slots: Vec::with_capacity(capacity),
            next_seq: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Inserts `payload` with the given absolute deadline.
    ///
    /// Non-positive deadlines are clamped to [`MIN_PRIORITY_MS`].  Returns
    /// the slot index after sift-up; index `0` means the new item is the
    /// heap root, which is what the delay queue uses to decide whether the
    /// sleeping consumer must be woken.
    pub(crate) fn offer(&mut self, payload: T, priority: i64) -> usize {
        let priority = priority.max(MIN_PRIORITY_MS);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.push(Slot {
            priority,
            seq,
            payload,
        });
        self.sift_up(self.slots.len() - 1)
    }

    /// If the root's deadline is `<= now_ms`, pops and returns it with a
    /// zero delta.  Otherwise leaves the heap untouched and returns the
    /// milliseconds until the root is due (`0` delta with `None` payload
    /// means the heap is empty).
    pub(crate) fn peek_and_shift(&mut self, now_ms: i64) -> (Option<T>, i64) {
        let Some(head) = self.slots.first() else {
            return (None, 0);
        };
        if head.priority > now_ms {
            return (None, head.priority - now_ms);
        }
        (Some(self.pop_root()), 0)
    }

    fn pop_root(&mut self) -> T {
        let last = self.slots.len() - 1;
        self.slots.swap(0, last);
        let slot = self.slots.pop().unwrap();
        if !self.slots.is_empty() {
            self.sift_down(0);
        }
        self.maybe_shrink();
        slot.payload
    }

    /// Halves the backing allocation when utilization drops below 25%.
    fn maybe_shrink(&mut self) {
        let cap = self.slots.capacity();
        if cap > SHRINK_FLOOR && self.slots.len() < cap / 4 {
            self.slots.shrink_to(cap / 2);
        }
    }

    fn sift_up(&mut self, mut idx: usize) -> usize {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.slots[idx].key() >= self.slots[parent].key() {
                break;
            }
            self.slots.swap(idx, parent);
            idx = parent;
        }
        idx
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.slots.len();
        loop {
            let left = idx * 2 + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut smallest = left;
            if right < len && self.slots[right].key() < self.slots[left].key() {
                smallest = right;
            }
            if self.slots[smallest].key() >= self.slots[idx].key() {
                break;
            }
            self.slots.swap(idx, smallest);
            idx = smallest;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_reports_root_replacement() {
        let mut pq = PriorityQueue::with_capacity(4);
        assert_eq!(pq.offer("a", 100), 0, "first offer is the root");
        assert_eq!(pq.offer("b", 200), 1, "later deadline is not the root");
        assert_eq!(pq.offer("c", 50), 0, "earlier deadline displaces the root");
    }

    #[test]
    fn peek_and_shift_pops_due_items_in_order() {
        let mut pq = PriorityQueue::with_capacity(4);
        pq.offer("late", 300);
        pq.offer("early", 100);
        pq.offer("mid", 200);

        let (item, delta) = pq.peek_and_shift(250);
        assert_eq!(item, Some("early"));
        assert_eq!(delta, 0);
        let (item, _) = pq.peek_and_shift(250);
        assert_eq!(item, Some("mid"));
        let (item, delta) = pq.peek_and_shift(250);
        assert_eq!(item, None);
        assert_eq!(delta, 50, "head is 50 ms away");
    }

    #[test]
    fn empty_heap_reports_zero_delta() {
        let mut pq: PriorityQueue<u32> = PriorityQueue::with_capacity(0);
        assert_eq!(pq.peek_and_shift(1_000), (None, 0));
    }

    #[test]
    fn equal_deadlines_pop_in_offer_order() {
        let mut pq = PriorityQueue::with_capacity(8);
        for label in ["first", "second", "third", "fourth"] {
            pq.offer(label, 100);
        }
        let mut out = Vec::new();
        while let (Some(v), _) = pq.peek_and_shift(100) {
            out.push(v);
        }
        assert_eq!(out, vec!["first", "second", "third", "fourth"]);
    }

    #[test]
    fn negative_priority_is_clamped() {
        let mut pq = PriorityQueue::with_capacity(2);
        pq.offer("x", -500);
        let (item, delta) = pq.peek_and_shift(0);
        assert_eq!(item, Some("x"), "clamped deadline is immediately due");
        assert_eq!(delta, 0);
    }

    #[test]
    fn shrinks_after_burst_drains() {
        let mut pq = PriorityQueue::with_capacity(0);
        for i in 0..1_000i64 {
            pq.offer(i, i);
        }
        let cap_at_peak = pq.slots.capacity();
        for _ in 0..990 {
            pq.peek_and_shift(2_000).0.unwrap();
        }
        assert_eq!(pq.len(), 10);
        assert!(
            pq.slots.capacity() < cap_at_peak,
            "capacity should have been halved after the burst drained"
        );
    }
}

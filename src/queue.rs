//! Deduping ordered queue (C4): a FIFO that refuses to enqueue a value
//! equal to its current tail.
//!
//! Grounded on `watchdog.utils.bricks.OrderedSetQueue`/`SkipRepeatsQueue`,
//! restated around a `std::collections::VecDeque` behind a `Condvar` rather
//! than Python's `queue.Queue` locking primitive. Only the *tail* is
//! checked — duplicates separated by any other item are allowed through
//! (spec.md §4.4, §9 Open Questions).

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A thread-safe FIFO queue that drops a `put` equal to the current tail.
///
/// The invariant maintained at all times: no two adjacent items in the
/// queue are equal. Non-adjacent repetitions, and repetitions separated by
/// an intervening `get`, are permitted.
pub struct SkipRepeatsQueue<T> {
    inner: Mutex<VecDeque<T>>,
    not_empty: Condvar,
}

impl<T: PartialEq> Default for SkipRepeatsQueue<T> {
    fn default() -> Self {
        SkipRepeatsQueue {
            inner: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
        }
    }
}

impl<T: PartialEq> SkipRepeatsQueue<T> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `item` unless it equals the current tail, in which case the
    /// put is a no-op.
    pub fn put(&self, item: T) {
        let mut queue = self.inner.lock().unwrap();
        if queue.back() == Some(&item) {
            return;
        }
        queue.push_back(item);
        self.not_empty.notify_one();
    }

    /// Blocks until an item is available or `timeout` elapses, then pops
    /// and returns the head.
    pub fn get(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.inner.lock().unwrap();
        loop {
            if let Some(item) = queue.pop_front() {
                return Some(item);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, result) = self
                .not_empty
                .wait_timeout(queue, deadline - now)
                .unwrap();
            queue = guard;
            if result.timed_out() && queue.is_empty() {
                return None;
            }
        }
    }

    /// Non-blocking pop of the head, if any.
    pub fn try_get(&self) -> Option<T> {
        self.inner.lock().unwrap().pop_front()
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_duplicates_are_skipped() {
        let q: SkipRepeatsQueue<i32> = SkipRepeatsQueue::new();
        q.put(1);
        q.put(1);
        q.put(1);
        assert_eq!(q.len(), 1);
        assert_eq!(q.get(Duration::from_millis(10)), Some(1));
        assert_eq!(q.try_get(), None);
    }

    #[test]
    fn non_adjacent_duplicates_pass_through() {
        let q: SkipRepeatsQueue<i32> = SkipRepeatsQueue::new();
        q.put(1);
        q.put(2);
        q.put(1);
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn duplicate_after_intervening_get_is_allowed() {
        let q: SkipRepeatsQueue<i32> = SkipRepeatsQueue::new();
        q.put(1);
        assert_eq!(q.get(Duration::from_millis(10)), Some(1));
        q.put(1);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn quantified_dedup_invariant() {
        // For every maximal run of equal elements in the put sequence,
        // exactly one survives; the survivors are a subsequence of the
        // puts with no two adjacent equal elements.
        let puts = [1, 1, 1, 2, 2, 3, 1, 1, 4];
        let q: SkipRepeatsQueue<i32> = SkipRepeatsQueue::new();
        for p in puts {
            q.put(p);
        }
        let mut drained = Vec::new();
        while let Some(item) = q.try_get() {
            drained.push(item);
        }
        assert_eq!(drained, vec![1, 2, 3, 1, 4]);
        for w in drained.windows(2) {
            assert_ne!(w[0], w[1]);
        }
    }

    #[test]
    fn get_times_out_when_empty() {
        let q: SkipRepeatsQueue<i32> = SkipRepeatsQueue::new();
        assert_eq!(q.get(Duration::from_millis(20)), None);
    }
}

//! Delayed queue (C5): a FIFO whose items become visible only after a
//! per-item delay has elapsed, with search-and-remove of still-pending
//! items by predicate.
//!
//! Used by the inotify move grouper (C8) to hold `MOVED_FROM` events
//! briefly so a matching `MOVED_TO` can claim them by cookie. Grounded on
//! `watchdog.observers.inotify_buffer`'s `DelayedQueue` (itself built atop
//! `queue.Queue` plus a sorted list of pending deadlines); restated here
//! with a single `Mutex`-guarded `Vec` and a `Condvar`, since the pending
//! set is always small (bounded by in-flight renames).

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

struct Pending<T> {
    ready_at: Instant,
    item: T,
}

struct Inner<T> {
    items: Vec<Pending<T>>,
    closed: bool,
}

/// A delay-gated FIFO. See the module documentation for the intended usage.
pub struct DelayQueue<T> {
    inner: Mutex<Inner<T>>,
    signal: Condvar,
}

impl<T> Default for DelayQueue<T> {
    fn default() -> Self {
        DelayQueue {
            inner: Mutex::new(Inner {
                items: Vec::new(),
                closed: false,
            }),
            signal: Condvar::new(),
        }
    }
}

impl<T> DelayQueue<T> {
    /// Creates an empty, open delay queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `item`, becoming visible to [`DelayQueue::get`] only once
    /// `delay` has elapsed (a zero delay makes it visible immediately).
    pub fn put(&self, item: T, delay: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.items.push(Pending {
            ready_at: Instant::now() + delay,
            item,
        });
        self.signal.notify_all();
    }

    /// Blocks until an item's delay has elapsed, then removes and returns
    /// it (the earliest-ready item, ties broken by insertion order).
    /// Returns `None` once the queue has been [`DelayQueue::close`]d and
    /// has no more ready items.
    pub fn get(&self) -> Option<T> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(idx) = Self::ready_index(&inner.items) {
                return Some(inner.items.remove(idx).item);
            }
            if inner.closed {
                return None;
            }
            match Self::next_deadline(&inner.items) {
                Some(deadline) => {
                    let now = Instant::now();
                    if deadline > now {
                        let (guard, _) = self
                            .signal
                            .wait_timeout(inner, deadline - now)
                            .unwrap();
                        inner = guard;
                    }
                }
                None => {
                    inner = self.signal.wait(inner).unwrap();
                }
            }
        }
    }

    /// Non-blocking variant of [`DelayQueue::get`]: returns the earliest
    /// ready item if one exists, without waiting for the next deadline.
    pub fn try_get(&self) -> Option<T> {
        let mut inner = self.inner.lock().unwrap();
        let idx = Self::ready_index(&inner.items)?;
        Some(inner.items.remove(idx).item)
    }

    /// Removes and returns the first pending item matching `predicate`,
    /// whether or not its delay has elapsed.
    pub fn remove<F>(&self, mut predicate: F) -> Option<T>
    where
        F: FnMut(&T) -> bool,
    {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner.items.iter().position(|p| predicate(&p.item))?;
        Some(inner.items.remove(idx).item)
    }

    /// Peeks at the first pending item matching `predicate` without
    /// removing it.
    pub fn find<F>(&self, mut predicate: F) -> bool
    where
        F: FnMut(&T) -> bool,
    {
        let inner = self.inner.lock().unwrap();
        inner.items.iter().any(|p| predicate(&p.item))
    }

    /// Closes the queue: every blocked and future [`DelayQueue::get`] call
    /// returns `None` once no ready items remain.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        self.signal.notify_all();
    }

    fn ready_index(items: &[Pending<T>]) -> Option<usize> {
        let now = Instant::now();
        items
            .iter()
            .enumerate()
            .filter(|(_, p)| p.ready_at <= now)
            .min_by_key(|(_, p)| p.ready_at)
            .map(|(idx, _)| idx)
    }

    fn next_deadline(items: &[Pending<T>]) -> Option<Instant> {
        items.iter().map(|p| p.ready_at).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn not_yet_ready_item_is_still_removable() {
        let q: DelayQueue<i32> = DelayQueue::new();
        q.put(1, Duration::from_millis(60));
        assert_eq!(q.remove(|_| true), Some(1));
    }

    #[test]
    fn try_get_returns_none_before_deadline() {
        let q: DelayQueue<i32> = DelayQueue::new();
        q.put(5, Duration::from_secs(5));
        assert_eq!(q.try_get(), None);
    }

    #[test]
    fn try_get_returns_item_once_ready() {
        let q: DelayQueue<i32> = DelayQueue::new();
        q.put(5, Duration::ZERO);
        assert_eq!(q.try_get(), Some(5));
    }

    #[test]
    fn remove_bypasses_the_delay() {
        let q: DelayQueue<i32> = DelayQueue::new();
        q.put(42, Duration::from_secs(5));
        assert_eq!(q.remove(|i| *i == 42), Some(42));
    }

    #[test]
    fn find_peeks_without_removing() {
        let q: DelayQueue<i32> = DelayQueue::new();
        q.put(7, Duration::from_secs(5));
        assert!(q.find(|i| *i == 7));
        assert!(q.find(|i| *i == 7)); // still there
    }

    #[test]
    fn get_blocks_until_ready_then_returns() {
        let q = Arc::new(DelayQueue::new());
        q.put(9, Duration::from_millis(30));
        let start = Instant::now();
        let got = q.get();
        assert_eq!(got, Some(9));
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn close_unblocks_waiters() {
        let q = Arc::new(DelayQueue::<i32>::new());
        let q2 = Arc::clone(&q);
        let handle = thread::spawn(move || q2.get());
        thread::sleep(Duration::from_millis(20));
        q.close();
        assert_eq!(handle.join().unwrap(), None);
    }
}

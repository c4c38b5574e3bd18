//! Move grouper (C8): pairs `IN_MOVED_FROM` with `IN_MOVED_TO` by cookie
//! within a bounded delay, via the shared [`DelayQueue`].
//!
//! Grounded on `watchdog.observers.inotify_move_event_grouper` /
//! `inotify_buffer.InotifyBuffer`'s pending-cookie bookkeeping.

use std::time::Duration;

use inotify::EventMask;

use crate::delay_queue::DelayQueue;
use crate::inotify::wrapper::RawEvent;

/// Default window within which a `MOVED_FROM` waits for its matching
/// `MOVED_TO` before surfacing alone (spec.md §4.8).
pub const DEFAULT_MOVE_WINDOW: Duration = Duration::from_millis(500);

/// What [`MoveGrouper::read_event`] yields: either a single raw event, or a
/// matched `(from, to)` rename pair.
pub enum Grouped {
    Single(RawEvent),
    Pair(RawEvent, RawEvent),
}

/// Wraps a [`DelayQueue`] to pair `MOVED_FROM`/`MOVED_TO` events by cookie.
pub struct MoveGrouper {
    queue: DelayQueue<Grouped>,
    window: Duration,
}

impl MoveGrouper {
    /// Creates a grouper with the default move-pairing window.
    pub fn new() -> Self {
        MoveGrouper {
            queue: DelayQueue::new(),
            window: DEFAULT_MOVE_WINDOW,
        }
    }

    /// Feeds a raw event into the grouper (spec.md §4.8).
    pub fn put(&self, event: RawEvent) {
        if event.mask.contains(EventMask::MOVED_FROM) {
            self.queue.put(Grouped::Single(event), self.window);
            return;
        }

        if event.mask.contains(EventMask::MOVED_TO) {
            let cookie = event.cookie;
            let matched = self.queue.remove(|item| match item {
                Grouped::Single(pending) => {
                    pending.mask.contains(EventMask::MOVED_FROM) && pending.cookie == cookie
                }
                Grouped::Pair(..) => false,
            });

            match matched {
                Some(Grouped::Single(from)) => {
                    self.queue.put(Grouped::Pair(from, event), Duration::ZERO);
                }
                _ => {
                    self.queue.put(Grouped::Single(event), Duration::ZERO);
                }
            }
            return;
        }

        self.queue.put(Grouped::Single(event), Duration::ZERO);
    }

    /// Blocks until the next grouped item is ready. Returns `None` once the
    /// grouper has been [`MoveGrouper::close`]d.
    pub fn read_event(&self) -> Option<Grouped> {
        self.queue.get()
    }

    /// Non-blocking: drains one grouped item if it is already ready,
    /// without waiting out a pending `MOVED_FROM`'s window.
    pub fn try_read_event(&self) -> Option<Grouped> {
        self.queue.try_get()
    }

    /// Unblocks any waiter in [`MoveGrouper::read_event`].
    pub fn close(&self) {
        self.queue.close();
    }
}

impl Default for MoveGrouper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inotify::wrapper::InotifyChannel;
    use inotify::WatchMask;

    /// Opens a throwaway channel purely to mint a real `WatchDescriptor`
    /// to stamp onto fabricated raw events; the grouper only inspects
    /// `mask`/`cookie`, never the descriptor itself.
    fn sample_wd() -> inotify::WatchDescriptor {
        let dir = tempfile::tempdir().unwrap();
        let mut channel = InotifyChannel::open().unwrap();
        channel
            .add_watch(dir.path(), WatchMask::ALL_EVENTS)
            .unwrap()
            .unwrap()
    }

    fn raw(mask: EventMask, cookie: u32) -> RawEvent {
        RawEvent {
            wd: sample_wd(),
            mask,
            cookie,
            name: None,
        }
    }

    #[test]
    fn matching_cookie_pairs_events() {
        let grouper = MoveGrouper::new();
        grouper.put(raw(EventMask::MOVED_FROM, 7));
        grouper.put(raw(EventMask::MOVED_TO, 7));

        match grouper.read_event() {
            Some(Grouped::Pair(from, to)) => {
                assert!(from.mask.contains(EventMask::MOVED_FROM));
                assert!(to.mask.contains(EventMask::MOVED_TO));
            }
            _ => panic!("expected a paired move"),
        }
    }

    #[test]
    fn unmatched_moved_from_surfaces_alone_after_window() {
        let grouper = MoveGrouper::new();
        grouper.put(raw(EventMask::MOVED_FROM, 42));
        match grouper.read_event() {
            Some(Grouped::Single(event)) => {
                assert!(event.mask.contains(EventMask::MOVED_FROM));
            }
            _ => panic!("expected a lone MOVED_FROM"),
        }
    }
}

//! The shared event bus: a [`SkipRepeatsQueue`] of `(Event, Watch)` tuples
//! between emitters and the dispatcher (spec.md §3, "Bus item"; §9,
//! "the deduping queue... does not globally deduplicate").

use std::sync::Arc;
use std::time::Duration;

use crate::event::Event;
use crate::queue::SkipRepeatsQueue;
use crate::watch::Watch;

/// One item travelling through the [`Bus`]: an event paired with the watch
/// that produced it.
pub type BusItem = (Event, Watch);

/// The bus sitting between per-watch emitters (C6/C9/C10/C11) and the
/// observer's dispatch loop (C12).
///
/// Two items are duplicates iff both the event and the watch compare
/// equal; only the current tail is checked (spec.md §3, §9).
#[derive(Clone, Default)]
pub struct Bus {
    queue: Arc<SkipRepeatsQueue<BusItem>>,
}

impl Bus {
    /// Creates a new, empty bus.
    pub fn new() -> Self {
        Bus::default()
    }

    /// Publishes `event` for `watch`. A no-op if it equals the current tail.
    pub fn publish(&self, event: Event, watch: Watch) {
        self.queue.put((event, watch));
    }

    /// Blocks up to `timeout` for the next item.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<BusItem> {
        self.queue.get(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecursiveMode;
    use crate::event::EventKind;
    use std::time::Duration;

    #[test]
    fn duplicate_tail_is_suppressed() {
        let bus = Bus::new();
        let watch = Watch::new("/tmp/T", RecursiveMode::Recursive);
        let event = Event::new(EventKind::Modified, "/tmp/T/a");

        bus.publish(event.clone(), watch.clone());
        bus.publish(event.clone(), watch.clone());
        bus.publish(event.clone(), watch.clone());

        assert_eq!(
            bus.recv_timeout(Duration::from_millis(10)),
            Some((event, watch))
        );
        assert_eq!(bus.recv_timeout(Duration::from_millis(10)), None);
    }
}

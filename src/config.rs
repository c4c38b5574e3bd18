//! Configuration types: recursion mode, event-kind filters, backend tuning.

use std::time::Duration;

use crate::event::EventKind;

/// Indicates whether only the provided directory or its sub-directories as
/// well should be watched.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
pub enum RecursiveMode {
    /// Watch all sub-directories as well, including directories created
    /// after installing the watch.
    Recursive,
    /// Watch only the provided directory (or file).
    NonRecursive,
}

impl RecursiveMode {
    pub(crate) fn is_recursive(self) -> bool {
        matches!(self, RecursiveMode::Recursive)
    }
}

bitflags::bitflags! {
    /// A mask over [`EventKind`] variants, used to restrict which events a
    /// watch or handler cares about (spec.md §3, "Watch").
    ///
    /// An empty mask is treated as "all kinds" by [`EventFilter::matches`].
    #[derive(Default)]
    pub struct EventFilter: u16 {
        /// Matches [`EventKind::Created`].
        const CREATED = 0b0000_0001;
        /// Matches [`EventKind::Deleted`].
        const DELETED = 0b0000_0010;
        /// Matches [`EventKind::Modified`].
        const MODIFIED = 0b0000_0100;
        /// Matches [`EventKind::Moved`].
        const MOVED = 0b0000_1000;
        /// Matches [`EventKind::Opened`].
        const OPENED = 0b0001_0000;
        /// Matches [`EventKind::Closed`].
        const CLOSED = 0b0010_0000;
        /// Matches [`EventKind::ClosedNoWrite`].
        const CLOSED_NO_WRITE = 0b0100_0000;
    }
}

impl EventFilter {
    /// Returns `true` iff this filter admits the given event kind. An empty
    /// filter admits every kind.
    pub fn matches(&self, kind: EventKind) -> bool {
        if self.is_empty() {
            return true;
        }
        self.contains(EventFilter::from(kind))
    }
}

impl From<EventKind> for EventFilter {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Created => EventFilter::CREATED,
            EventKind::Deleted => EventFilter::DELETED,
            EventKind::Modified => EventFilter::MODIFIED,
            EventKind::Moved => EventFilter::MOVED,
            EventKind::Opened => EventFilter::OPENED,
            EventKind::Closed => EventFilter::CLOSED,
            EventKind::ClosedNoWrite => EventFilter::CLOSED_NO_WRITE,
        }
    }
}

/// Backend-tuning configuration.
///
/// Some options only apply to specific backends; setting an option a given
/// backend doesn't understand is harmless (it is simply ignored).
///
/// ```
/// # use std::time::Duration;
/// # use sentrywatch::Config;
/// let config = Config::default()
///     .with_poll_interval(Duration::from_secs(1))
///     .with_follow_symlinks(false);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub struct Config {
    poll_interval: Duration,
    compare_contents: bool,
    follow_symlinks: bool,
    ignore_device: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            poll_interval: Duration::from_secs(1),
            compare_contents: false,
            follow_symlinks: true,
            ignore_device: false,
        }
    }
}

impl Config {
    /// For the polling backend (C6): interval between successive snapshots.
    /// Defaults to one second, matching spec.md §4.6.
    pub fn with_poll_interval(mut self, dur: Duration) -> Self {
        self.poll_interval = dur;
        self
    }

    /// Current poll interval.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Reserved for future content-hash comparison in the polling backend.
    /// Currently unused by any backend; exists so callers can future-proof
    /// their config literals.
    pub fn with_compare_contents(mut self, compare_contents: bool) -> Self {
        self.compare_contents = compare_contents;
        self
    }

    /// Current `compare_contents` setting.
    pub fn compare_contents(&self) -> bool {
        self.compare_contents
    }

    /// Whether to follow symlinks when scanning directories (C3). On by default.
    pub fn with_follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Current `follow_symlinks` setting.
    pub fn follow_symlinks(&self) -> bool {
        self.follow_symlinks
    }

    /// Whether snapshot identity should ignore device id, so that entries
    /// surviving a device reassignment (e.g. a remount) aren't reported as
    /// deleted+created (C3, "ignore-device" option). Off by default.
    pub fn with_ignore_device(mut self, ignore: bool) -> Self {
        self.ignore_device = ignore;
        self
    }

    /// Current `ignore_device` setting.
    pub fn ignore_device(&self) -> bool {
        self.ignore_device
    }
}

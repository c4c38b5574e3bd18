//! Event handler interface (C13): the user-facing polymorphic callback
//! surface, plus the built-in pattern-matching and logging variants.
//!
//! Grounded on `watchdog.events.FileSystemEventHandler`/
//! `PatternMatchingEventHandler`/`LoggingFileSystemEventHandler`
//! (`original_source/watchdog/events.py`), restated as a trait with a
//! default `dispatch` method rather than Python's per-instance method map.

use crate::event::{Event, EventKind};
use crate::pattern::{GlobPatterns, RegexPatterns};

/// Implemented by anything that wants to receive dispatched events
/// (spec.md §4.13).
///
/// `dispatch` calls [`EventHandler::on_any_event`] first, then the
/// kind-specific method; callers rarely need to override `dispatch`
/// itself — only the two pattern-matching wrappers below do, to filter
/// before either callback runs.
pub trait EventHandler: Send {
    /// Called for every event, before the kind-specific method.
    fn on_any_event(&self, _event: &Event) {}

    fn on_created(&self, _event: &Event) {}
    fn on_deleted(&self, _event: &Event) {}
    fn on_modified(&self, _event: &Event) {}
    fn on_moved(&self, _event: &Event) {}
    fn on_opened(&self, _event: &Event) {}
    fn on_closed(&self, _event: &Event) {}
    fn on_closed_no_write(&self, _event: &Event) {}

    /// Routes `event` to `on_any_event` and the matching kind-specific
    /// method (spec.md §4.13).
    fn dispatch(&self, event: &Event) {
        self.on_any_event(event);
        match event.kind() {
            EventKind::Created => self.on_created(event),
            EventKind::Deleted => self.on_deleted(event),
            EventKind::Modified => self.on_modified(event),
            EventKind::Moved => self.on_moved(event),
            EventKind::Opened => self.on_opened(event),
            EventKind::Closed => self.on_closed(event),
            EventKind::ClosedNoWrite => self.on_closed_no_write(event),
        }
    }
}

/// Wraps a base handler with glob allow/deny lists and an
/// ignore-directories flag (spec.md §4.13; `watchdog`'s
/// `PatternMatchingEventHandler`).
///
/// A [`EventKind::Moved`] event is let through if either its source or
/// destination path matches, mirroring watchdog checking both `src_path`
/// and `dest_path` when present.
pub struct PatternMatchingEventHandler<H: EventHandler> {
    inner: H,
    allow: GlobPatterns,
    deny: GlobPatterns,
    ignore_directories: bool,
}

impl<H: EventHandler> PatternMatchingEventHandler<H> {
    pub fn new(inner: H, allow: GlobPatterns, deny: GlobPatterns) -> Self {
        PatternMatchingEventHandler {
            inner,
            allow,
            deny,
            ignore_directories: false,
        }
    }

    pub fn with_ignore_directories(mut self, ignore: bool) -> Self {
        self.ignore_directories = ignore;
        self
    }

    fn admits(&self, event: &Event) -> bool {
        if self.ignore_directories && event.is_directory() {
            return false;
        }
        let src_matches = crate::pattern::matches(event.src_path(), &self.allow, &self.deny);
        let dest_matches = event
            .dest_path()
            .map(|p| crate::pattern::matches(p, &self.allow, &self.deny))
            .unwrap_or(false);
        src_matches || dest_matches
    }
}

impl<H: EventHandler> EventHandler for PatternMatchingEventHandler<H> {
    fn dispatch(&self, event: &Event) {
        if self.admits(event) {
            self.inner.dispatch(event);
        }
    }
}

/// Regex-based equivalent of [`PatternMatchingEventHandler`] (spec.md
/// §4.13; `watchdog`'s `RegexMatchingEventHandler`).
pub struct RegexMatchingEventHandler<H: EventHandler> {
    inner: H,
    allow: RegexPatterns,
    deny: RegexPatterns,
    ignore_directories: bool,
}

impl<H: EventHandler> RegexMatchingEventHandler<H> {
    pub fn new(inner: H, allow: RegexPatterns, deny: RegexPatterns) -> Self {
        RegexMatchingEventHandler {
            inner,
            allow,
            deny,
            ignore_directories: false,
        }
    }

    pub fn with_ignore_directories(mut self, ignore: bool) -> Self {
        self.ignore_directories = ignore;
        self
    }

    fn admits(&self, event: &Event) -> bool {
        if self.ignore_directories && event.is_directory() {
            return false;
        }
        let src_matches = crate::pattern::matches_regex(event.src_path(), &self.allow, &self.deny);
        let dest_matches = event
            .dest_path()
            .map(|p| crate::pattern::matches_regex(p, &self.allow, &self.deny))
            .unwrap_or(false);
        src_matches || dest_matches
    }
}

impl<H: EventHandler> EventHandler for RegexMatchingEventHandler<H> {
    fn dispatch(&self, event: &Event) {
        if self.admits(event) {
            self.inner.dispatch(event);
        }
    }
}

/// Emits one structured `log::info!` line per event (spec.md §4.12b;
/// `watchdog.events.LoggingEventHandler`).
#[derive(Default)]
pub struct LoggingEventHandler;

impl LoggingEventHandler {
    pub fn new() -> Self {
        LoggingEventHandler
    }

    fn what(event: &Event) -> &'static str {
        if event.is_directory() {
            "directory"
        } else {
            "file"
        }
    }
}

impl EventHandler for LoggingEventHandler {
    fn on_created(&self, event: &Event) {
        log::info!("created {}: {}", Self::what(event), event.src_path().display());
    }

    fn on_deleted(&self, event: &Event) {
        log::info!("deleted {}: {}", Self::what(event), event.src_path().display());
    }

    fn on_modified(&self, event: &Event) {
        log::info!("modified {}: {}", Self::what(event), event.src_path().display());
    }

    fn on_moved(&self, event: &Event) {
        log::info!(
            "moved {}: {} -> {}",
            Self::what(event),
            event.src_path().display(),
            event.dest_path().map(|p| p.display().to_string()).unwrap_or_default()
        );
    }

    fn on_opened(&self, event: &Event) {
        log::info!("opened {}: {}", Self::what(event), event.src_path().display());
    }

    fn on_closed(&self, event: &Event) {
        log::info!("closed {}: {}", Self::what(event), event.src_path().display());
    }

    fn on_closed_no_write(&self, event: &Event) {
        log::info!(
            "closed (read-only) {}: {}",
            Self::what(event),
            event.src_path().display()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::GlobPatterns;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler(Arc<AtomicUsize>);

    impl EventHandler for CountingHandler {
        fn on_any_event(&self, _event: &Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn globs(pats: &[&str]) -> GlobPatterns {
        let owned: Vec<String> = pats.iter().map(|s| s.to_string()).collect();
        GlobPatterns::new(&owned, true).unwrap()
    }

    #[test]
    fn dispatch_routes_to_kind_specific_method() {
        let seen = Arc::new(AtomicUsize::new(0));
        struct Seen(Arc<AtomicUsize>);
        impl EventHandler for Seen {
            fn on_created(&self, _event: &Event) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        let handler = Seen(Arc::clone(&seen));
        handler.dispatch(&Event::new(EventKind::Created, "/a"));
        handler.dispatch(&Event::new(EventKind::Deleted, "/a"));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pattern_handler_filters_by_allow_list() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = PatternMatchingEventHandler::new(
            CountingHandler(Arc::clone(&count)),
            globs(&["*.rs"]),
            GlobPatterns::none(),
        );
        handler.dispatch(&Event::new(EventKind::Created, "/a.rs"));
        handler.dispatch(&Event::new(EventKind::Created, "/a.py"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pattern_handler_admits_move_by_either_path() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = PatternMatchingEventHandler::new(
            CountingHandler(Arc::clone(&count)),
            globs(&["*.rs"]),
            GlobPatterns::none(),
        );
        handler.dispatch(&Event::moved("/a.py", "/a.rs"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ignore_directories_suppresses_dir_events() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = PatternMatchingEventHandler::new(
            CountingHandler(Arc::clone(&count)),
            GlobPatterns::none(),
            GlobPatterns::none(),
        )
        .with_ignore_directories(true);
        handler.dispatch(&Event::new(EventKind::Created, "/a").with_directory(true));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}

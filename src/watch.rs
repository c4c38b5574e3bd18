//! The [`Watch`] value type (spec.md §3): a declaration of interest in
//! changes under a path.

use std::path::{Path, PathBuf};

use crate::config::{EventFilter, RecursiveMode};

/// A scheduled watch: a path, a recursion mode, and an optional event-kind
/// filter.
///
/// Watches are value-typed: two watches with equal `(path, recursive,
/// filter)` are the same watch, and are served by the same emitter (spec.md
/// §3 invariants). Watches are created by [`crate::Observer::schedule`] and
/// destroyed by [`crate::Observer::unschedule`]; they are never mutated.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Watch {
    path: PathBuf,
    recursive: bool,
    filter: EventFilter,
}

impl Watch {
    /// Creates a new watch over `path`.
    pub fn new(path: impl Into<PathBuf>, mode: RecursiveMode) -> Self {
        Watch {
            path: path.into(),
            recursive: mode.is_recursive(),
            filter: EventFilter::empty(),
        }
    }

    /// Restricts this watch to a subset of event kinds.
    pub fn with_filter(mut self, filter: EventFilter) -> Self {
        self.filter = filter;
        self
    }

    /// The path this watch monitors.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether subdirectories are watched recursively.
    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// The event-kind filter associated with this watch, if any.
    pub fn filter(&self) -> EventFilter {
        self.filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_watches_hash_equal() {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let a = Watch::new("/tmp/x", RecursiveMode::Recursive);
        let b = Watch::new("/tmp/x", RecursiveMode::Recursive);
        assert_eq!(a, b);

        let mut ha = DefaultHasher::new();
        let mut hb = DefaultHasher::new();
        a.hash(&mut ha);
        b.hash(&mut hb);
        assert_eq!(ha.finish(), hb.finish());
    }

    #[test]
    fn differing_recursive_flag_is_a_different_watch() {
        let a = Watch::new("/tmp/x", RecursiveMode::Recursive);
        let b = Watch::new("/tmp/x", RecursiveMode::NonRecursive);
        assert_ne!(a, b);
    }
}

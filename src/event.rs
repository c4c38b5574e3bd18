//! The event model (C1): a single tagged value type shared by every backend
//! and by the dispatcher.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// The kind of filesystem mutation an [`Event`] describes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum EventKind {
    /// A file or directory was created.
    Created,
    /// A file or directory was deleted.
    Deleted,
    /// A file or directory's contents or metadata changed.
    Modified,
    /// A file or directory was renamed or moved; carries a destination path.
    Moved,
    /// A file or directory was opened (not available on every backend).
    Opened,
    /// A file that had been opened for writing was closed.
    Closed,
    /// A file that had been opened read-only was closed.
    ClosedNoWrite,
}

/// A single filesystem mutation, as produced by an emitter.
///
/// Two events are equal iff every field compares equal, including
/// `is_directory` and `dest_path` — a directory-modified and a
/// file-modified event for the same path are never equal (spec.md §3).
/// Events are immutable after construction.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Event {
    kind: EventKind,
    src_path: PathBuf,
    dest_path: Option<PathBuf>,
    is_directory: bool,
    is_synthetic: bool,
}

impl Event {
    /// Builds a new event of the given kind for `src_path`.
    pub fn new(kind: EventKind, src_path: impl Into<PathBuf>) -> Self {
        Event {
            kind,
            src_path: src_path.into(),
            dest_path: None,
            is_directory: false,
            is_synthetic: false,
        }
    }

    /// Builds a [`EventKind::Moved`] event from `src_path` to `dest_path`.
    pub fn moved(src_path: impl Into<PathBuf>, dest_path: impl Into<PathBuf>) -> Self {
        Event {
            kind: EventKind::Moved,
            src_path: src_path.into(),
            dest_path: Some(dest_path.into()),
            is_directory: false,
            is_synthetic: false,
        }
    }

    /// Marks this event as describing a directory rather than a file.
    pub fn with_directory(mut self, is_directory: bool) -> Self {
        self.is_directory = is_directory;
        self
    }

    /// Marks this event as synthetic: produced by the emitter itself (e.g. a
    /// per-descendant Moved following a recursive directory rename) rather
    /// than reported directly by the OS.
    pub fn with_synthetic(mut self, is_synthetic: bool) -> Self {
        self.is_synthetic = is_synthetic;
        self
    }

    /// The kind of mutation this event describes.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// The path the mutation concerns. For [`EventKind::Moved`], this is the
    /// origin path.
    pub fn src_path(&self) -> &Path {
        &self.src_path
    }

    /// The destination path, present only for [`EventKind::Moved`] events.
    pub fn dest_path(&self) -> Option<&Path> {
        self.dest_path.as_deref()
    }

    /// Whether this event concerns a directory (as opposed to a file).
    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    /// Whether this event was synthesized by the emitter rather than
    /// observed directly from the OS.
    pub fn is_synthetic(&self) -> bool {
        self.is_synthetic
    }
}

/// Walks `new_dir` and returns one synthetic [`EventKind::Moved`] event per
/// descendant, mapping each path found under `new_dir` back to its
/// corresponding path under `old_dir`.
///
/// Used by every backend (C8/C9/C10/C11) to report a recursive directory
/// rename/move as a single top-level Moved plus one synthetic Moved per
/// descendant file and directory (spec.md §4.1, §4.9, §4.10, §4.11).
pub fn synthetic_moves(old_dir: &Path, new_dir: &Path) -> Vec<Event> {
    let mut events = Vec::new();
    for entry in WalkDir::new(new_dir).min_depth(1).into_iter().flatten() {
        let rel = match entry.path().strip_prefix(new_dir) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let old_path = old_dir.join(rel);
        let is_dir = entry.file_type().is_dir();
        events.push(
            Event::moved(old_path, entry.path().to_path_buf())
                .with_directory(is_dir)
                .with_synthetic(true),
        );
    }
    events
}

/// Walks `root` (after a recursive directory creation, or after discovering
/// pre-existing content under a newly-watched subtree) and returns one
/// synthetic [`EventKind::Created`] event per descendant.
///
/// Grounded on the inotify emitter's recursive-watch policy (spec.md §4.7):
/// "the emitter also walks that new directory for pre-existing content and
/// synthesizes Created events."
pub fn synthetic_creations(root: &Path) -> Vec<Event> {
    let mut events = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).into_iter().flatten() {
        let is_dir = entry.file_type().is_dir();
        events.push(
            Event::new(EventKind::Created, entry.path().to_path_buf())
                .with_directory(is_dir)
                .with_synthetic(true),
        );
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_covers_all_fields() {
        let a = Event::new(EventKind::Modified, "/a").with_directory(true);
        let b = Event::new(EventKind::Modified, "/a").with_directory(false);
        assert_ne!(a, b, "dir-modified and file-modified must not compare equal");
    }

    #[test]
    fn moved_event_carries_dest() {
        let e = Event::moved("/a", "/b");
        assert_eq!(e.kind(), EventKind::Moved);
        assert_eq!(e.dest_path(), Some(Path::new("/b")));
    }

    #[test]
    fn synthetic_moves_walks_new_tree() {
        let dir = tempfile::tempdir().unwrap();
        let new_root = dir.path().join("b");
        std::fs::create_dir_all(new_root.join("c")).unwrap();
        std::fs::write(new_root.join("c").join("f"), b"x").unwrap();

        let old_root = dir.path().join("a").join("b");
        let events = synthetic_moves(&old_root, &new_root);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.is_synthetic()));
        assert!(events
            .iter()
            .any(|e| e.is_directory() && e.dest_path() == Some(new_root.join("c").as_path())));
        assert!(events.iter().any(|e| !e.is_directory()
            && e.dest_path() == Some(new_root.join("c").join("f").as_path())));
    }
}

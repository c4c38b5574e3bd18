//! Inotify emitter (C9): ties the kernel channel ([`InotifyChannel`]) and
//! the move grouper ([`MoveGrouper`]) together into an [`Emitter`].
//!
//! A single background thread alternates between draining raw kernel
//! events (handling bookkeeping — new-directory auto-watch, overflow,
//! watch teardown — inline) and draining whatever the grouper has paired
//! or timed out, translating both into bus events. Grounded on
//! `watchdog.observers.inotify_c.InotifyEmitter` for the translation table
//! and the recursive auto-watch policy (spec.md §4.9).

use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use inotify::{EventMask, WatchMask};
use walkdir::WalkDir;

use crate::bus::Bus;
use crate::config::Config;
use crate::emitter::{Emitter, StopFlag};
use crate::error::Result;
use crate::event::{synthetic_creations, synthetic_moves, Event, EventKind};
use crate::inotify::grouper::{Grouped, MoveGrouper};
use crate::inotify::wrapper::{InotifyChannel, RawEvent};
use crate::watch::Watch;

/// Every kernel event this crate cares about; [`crate::observer::Observer`]
/// applies a watch's [`crate::config::EventFilter`] at dispatch time rather
/// than at the kernel mask, the same split C6's polling backend uses
/// (spec.md §4.6, §4.9).
fn base_mask() -> WatchMask {
    WatchMask::CREATE
        | WatchMask::DELETE
        | WatchMask::DELETE_SELF
        | WatchMask::MODIFY
        | WatchMask::ATTRIB
        | WatchMask::MOVED_FROM
        | WatchMask::MOVED_TO
        | WatchMask::OPEN
        | WatchMask::CLOSE_WRITE
        | WatchMask::CLOSE_NOWRITE
}

/// The inotify backend: one kernel channel plus a move grouper per watch.
pub struct InotifyEmitter {
    stop: StopFlag,
    thread: Option<JoinHandle<()>>,
}

impl Emitter for InotifyEmitter {
    fn start(watch: Watch, bus: Bus, _config: Config) -> Result<Self> {
        let stop = StopFlag::new();
        let worker_stop = stop.clone();
        let mask = base_mask();

        let mut channel = InotifyChannel::open()?;
        add_watch_tree(&mut channel, watch.path(), mask, watch.is_recursive())?;

        let thread = thread::Builder::new()
            .name(format!("sentrywatch-inotify:{}", watch.path().display()))
            .spawn(move || {
                let grouper = MoveGrouper::new();
                'outer: loop {
                    if worker_stop.is_set() {
                        break;
                    }

                    match channel.read_events(&worker_stop) {
                        Ok(raws) => {
                            let mut root_deleted = false;
                            for raw in raws {
                                if handle_raw(&mut channel, &grouper, &bus, &watch, mask, raw) {
                                    root_deleted = true;
                                    break;
                                }
                            }
                            if root_deleted {
                                // The watch root itself is gone: emit a
                                // DirDeleted for it and stop this emitter
                                // (spec.md §4.9, §7). The observer keeps
                                // running other watches.
                                break 'outer;
                            }
                        }
                        Err(err) => {
                            log::error!(
                                "inotify read failed for {}: {err}",
                                watch.path().display()
                            );
                            break 'outer;
                        }
                    }

                    if worker_stop.is_set() {
                        break;
                    }

                    while let Some(grouped) = grouper.try_read_event() {
                        handle_grouped(&mut channel, &bus, &watch, mask, grouped);
                    }
                }
                grouper.close();
            })
            .map_err(std::io::Error::from)?;

        Ok(InotifyEmitter {
            stop,
            thread: Some(thread),
        })
    }

    fn stop(&mut self) {
        self.stop.signal();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for InotifyEmitter {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Adds a watch for `root`, and for every descendant directory when
/// `recursive` (spec.md §4.9: "a recursive watch is implemented as one
/// kernel watch per directory").
fn add_watch_tree(channel: &mut InotifyChannel, root: &Path, mask: WatchMask, recursive: bool) -> Result<()> {
    channel.add_watch(root, mask)?;
    if !recursive {
        return Ok(());
    }
    for entry in WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_dir() {
            channel.add_watch(entry.path(), mask)?;
        }
    }
    Ok(())
}

/// Handles one raw kernel frame: bookkeeping events (overflow, ignored,
/// self-delete) are applied inline; `MOVED_FROM`/`MOVED_TO` are handed to
/// the grouper for pairing; everything else translates directly. Returns
/// `true` when the watch root itself was just deleted, telling the caller
/// to stop this emitter (spec.md §4.9, §7).
fn handle_raw(
    channel: &mut InotifyChannel,
    grouper: &MoveGrouper,
    bus: &Bus,
    watch: &Watch,
    mask: WatchMask,
    raw: RawEvent,
) -> bool {
    if raw.mask.contains(EventMask::Q_OVERFLOW) {
        // The kernel dropped events we can no longer reconstruct; the best
        // we can do is tell the caller the root may have changed (spec.md
        // §4.9).
        bus.publish(
            Event::new(EventKind::Modified, watch.path().to_path_buf()).with_directory(true),
            watch.clone(),
        );
        return false;
    }

    if raw.mask.contains(EventMask::IGNORED) {
        channel.forget(&raw.wd);
        return false;
    }

    if raw.mask.contains(EventMask::DELETE_SELF) {
        if let Some(path) = channel.path_for(&raw.wd) {
            if path == watch.path() {
                bus.publish(
                    Event::new(EventKind::Deleted, watch.path().to_path_buf()).with_directory(true),
                    watch.clone(),
                );
                return true;
            }
        }
        return false;
    }

    if raw.mask.contains(EventMask::MOVED_FROM) || raw.mask.contains(EventMask::MOVED_TO) {
        grouper.put(raw);
        return false;
    }

    translate_single(channel, bus, watch, mask, raw);
    false
}

/// Translates one non-move raw event into a bus event, per the kernel
/// mask -> common `EventKind` table (spec.md §4.9).
fn translate_single(channel: &mut InotifyChannel, bus: &Bus, watch: &Watch, mask: WatchMask, raw: RawEvent) {
    let Some(dir) = channel.path_for(&raw.wd).map(Path::to_path_buf) else {
        return;
    };
    let path = join_name(&dir, raw.name.as_deref());
    let is_directory = raw.mask.contains(EventMask::ISDIR);

    if raw.mask.contains(EventMask::CREATE) {
        bus.publish(
            Event::new(EventKind::Created, path.clone()).with_directory(is_directory),
            watch.clone(),
        );
        if is_directory && watch.is_recursive() {
            extend_watch(channel, bus, watch, mask, &path);
        }
        return;
    }
    if raw.mask.contains(EventMask::DELETE) {
        bus.publish(
            Event::new(EventKind::Deleted, path).with_directory(is_directory),
            watch.clone(),
        );
        return;
    }
    if raw.mask.contains(EventMask::MODIFY) || raw.mask.contains(EventMask::ATTRIB) {
        bus.publish(
            Event::new(EventKind::Modified, path).with_directory(is_directory),
            watch.clone(),
        );
        return;
    }
    if raw.mask.contains(EventMask::OPEN) {
        bus.publish(
            Event::new(EventKind::Opened, path).with_directory(is_directory),
            watch.clone(),
        );
        return;
    }
    if raw.mask.contains(EventMask::CLOSE_WRITE) {
        bus.publish(
            Event::new(EventKind::Closed, path).with_directory(is_directory),
            watch.clone(),
        );
        return;
    }
    if raw.mask.contains(EventMask::CLOSE_NOWRITE) {
        bus.publish(
            Event::new(EventKind::ClosedNoWrite, path).with_directory(is_directory),
            watch.clone(),
        );
    }
}

/// Handles a grouped move: a matched pair translates to one `Moved` event
/// (plus synthetic per-descendant `Moved`s when a directory moved), while
/// a lone surfaced half falls back to `Deleted`/`Created` (spec.md §4.8).
fn handle_grouped(channel: &mut InotifyChannel, bus: &Bus, watch: &Watch, mask: WatchMask, grouped: Grouped) {
    match grouped {
        Grouped::Pair(from, to) => {
            let Some(from_dir) = channel.path_for(&from.wd).map(Path::to_path_buf) else {
                return;
            };
            let Some(to_dir) = channel.path_for(&to.wd).map(Path::to_path_buf) else {
                return;
            };
            let from_path = join_name(&from_dir, from.name.as_deref());
            let to_path = join_name(&to_dir, to.name.as_deref());
            let is_directory = to.mask.contains(EventMask::ISDIR);

            bus.publish(
                Event::moved(from_path.clone(), to_path.clone()).with_directory(is_directory),
                watch.clone(),
            );

            if is_directory && watch.is_recursive() {
                channel.rewrite_prefix(&from_path, &to_path);
                for synth in synthetic_moves(&from_path, &to_path) {
                    bus.publish(synth, watch.clone());
                }
            }
        }
        Grouped::Single(raw) => handle_unpaired_move(channel, bus, watch, mask, raw),
    }
}

/// A `MOVED_FROM` with no matching `MOVED_TO` left the watched tree
/// entirely and is reported as `Deleted`; a `MOVED_TO` with no matching
/// `MOVED_FROM` arrived from outside the watched tree and is reported as
/// `Created` (spec.md §4.8).
fn handle_unpaired_move(channel: &mut InotifyChannel, bus: &Bus, watch: &Watch, mask: WatchMask, raw: RawEvent) {
    let Some(dir) = channel.path_for(&raw.wd).map(Path::to_path_buf) else {
        return;
    };
    let path = join_name(&dir, raw.name.as_deref());
    let is_directory = raw.mask.contains(EventMask::ISDIR);

    if raw.mask.contains(EventMask::MOVED_FROM) {
        bus.publish(
            Event::new(EventKind::Deleted, path).with_directory(is_directory),
            watch.clone(),
        );
        return;
    }

    bus.publish(
        Event::new(EventKind::Created, path.clone()).with_directory(is_directory),
        watch.clone(),
    );
    if is_directory && watch.is_recursive() {
        extend_watch(channel, bus, watch, mask, &path);
    }
}

/// Adds a watch for a newly appeared directory and synthesizes `Created`
/// events for anything already inside it, since the kernel never reports
/// pre-existing content (spec.md §4.9).
fn extend_watch(channel: &mut InotifyChannel, bus: &Bus, watch: &Watch, mask: WatchMask, path: &Path) {
    if let Err(err) = add_watch_tree(channel, path, mask, true) {
        log::warn!("failed to extend watch onto {}: {err}", path.display());
        return;
    }
    for synth in synthetic_creations(path) {
        bus.publish(synth, watch.clone());
    }
}

fn join_name(dir: &Path, name: Option<&std::ffi::OsStr>) -> PathBuf {
    match name {
        Some(name) => dir.join(name),
        None => dir.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecursiveMode;
    use std::time::Duration;

    fn recv_created(bus: &Bus, suffix: &str) -> bool {
        for _ in 0..30 {
            if let Some((event, _)) = bus.recv_timeout(Duration::from_millis(200)) {
                if event.kind() == EventKind::Created && event.src_path().ends_with(suffix) {
                    return true;
                }
            }
        }
        false
    }

    #[test]
    fn detects_a_created_file() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Bus::new();
        let watch = Watch::new(dir.path(), RecursiveMode::Recursive);
        let mut emitter = InotifyEmitter::start(watch, bus.clone(), Config::default()).unwrap();

        std::fs::write(dir.path().join("a"), b"hi").unwrap();
        assert!(recv_created(&bus, "a"));

        emitter.stop();
    }

    #[test]
    fn recursive_watch_extends_to_new_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Bus::new();
        let watch = Watch::new(dir.path(), RecursiveMode::Recursive);
        let mut emitter = InotifyEmitter::start(watch, bus.clone(), Config::default()).unwrap();

        std::fs::create_dir(dir.path().join("sub")).unwrap();
        assert!(recv_created(&bus, "sub"));
        std::fs::write(dir.path().join("sub").join("nested"), b"hi").unwrap();
        assert!(recv_created(&bus, "nested"));

        emitter.stop();
    }

    #[test]
    fn root_deletion_stops_the_emitter() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let bus = Bus::new();
        let watch = Watch::new(&root, RecursiveMode::Recursive);
        let mut emitter = InotifyEmitter::start(watch, bus.clone(), Config::default()).unwrap();

        std::fs::remove_dir_all(&root).unwrap();

        let mut saw_root_deleted = false;
        for _ in 0..30 {
            if let Some((event, _)) = bus.recv_timeout(Duration::from_millis(200)) {
                if event.kind() == EventKind::Deleted && event.is_directory() && event.src_path() == root {
                    saw_root_deleted = true;
                    break;
                }
            }
        }
        assert!(saw_root_deleted);
        // The emitter's thread should already have exited on its own;
        // `stop` just joins it rather than signaling anything new.
        emitter.stop();
    }

    #[test]
    fn rename_within_root_is_reported_as_moved() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old"), b"hi").unwrap();
        let bus = Bus::new();
        let watch = Watch::new(dir.path(), RecursiveMode::Recursive);
        let mut emitter = InotifyEmitter::start(watch, bus.clone(), Config::default()).unwrap();

        std::fs::rename(dir.path().join("old"), dir.path().join("new")).unwrap();

        let mut saw_move = false;
        for _ in 0..30 {
            if let Some((event, _)) = bus.recv_timeout(Duration::from_millis(200)) {
                if event.kind() == EventKind::Moved
                    && event.src_path().ends_with("old")
                    && event.dest_path().map(|p| p.ends_with("new")).unwrap_or(false)
                {
                    saw_move = true;
                    break;
                }
            }
        }
        emitter.stop();
        assert!(saw_move);
    }
}

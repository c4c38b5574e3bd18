//! Polling emitter (C6): periodic directory snapshot + diff, usable on any
//! platform.
//!
//! Grounded on `watchdog.observers.polling.PollingEmitter` for the tick
//! loop, and on [`crate::snapshot`] (itself grounded on
//! `watchdog.utils.dirsnapshot`) for the snapshot/diff primitives. The
//! thread-per-emitter shape follows `notify::PollWatcher`'s background
//! thread, adapted to one emitter per [`Watch`] rather than one watcher
//! multiplexing arbitrary paths.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::bus::Bus;
use crate::config::Config;
use crate::emitter::{Emitter, StopFlag};
use crate::error::Result;
use crate::event::{Event, EventKind};
use crate::snapshot::{Diff, Snapshot};
use crate::watch::Watch;

/// The polling backend: snapshots the watched tree every `poll_interval`
/// and diffs it against the previous snapshot (spec.md §4.6).
pub struct PollEmitter {
    stop: StopFlag,
    thread: Option<JoinHandle<()>>,
}

impl Emitter for PollEmitter {
    fn start(watch: Watch, bus: Bus, config: Config) -> Result<Self> {
        let stop = StopFlag::new();
        let worker_stop = stop.clone();
        let interval = config.poll_interval();

        // The first snapshot is taken eagerly, before the tick loop starts
        // (spec.md §4.6).
        let mut previous = Snapshot::scan(
            watch.path(),
            watch.is_recursive(),
            config.follow_symlinks(),
            None,
            config.ignore_device(),
        );

        let thread = thread::Builder::new()
            .name(format!("sentrywatch-poll:{}", watch.path().display()))
            .spawn(move || {
                loop {
                    sleep_in_slices(interval, &worker_stop);
                    if worker_stop.is_set() {
                        return;
                    }

                    if !watch.path().exists() {
                        // The root itself disappeared: emit a DirDeleted
                        // for the root and stop this emitter (spec.md
                        // §4.6). The observer keeps running other watches.
                        bus.publish(
                            Event::new(EventKind::Deleted, watch.path().to_path_buf())
                                .with_directory(true),
                            watch.clone(),
                        );
                        return;
                    }

                    let next = Snapshot::scan(
                        watch.path(),
                        watch.is_recursive(),
                        config.follow_symlinks(),
                        None,
                        config.ignore_device(),
                    );
                    let diff = previous.diff_to(&next);
                    publish_diff(&bus, &watch, &diff);
                    previous = next;
                }
            })
            .map_err(std::io::Error::from)?;

        Ok(PollEmitter {
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

impl Drop for PollEmitter {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleeps for `total`, but in short slices so a [`StopFlag`] set mid-sleep
/// is observed promptly rather than only at the next tick boundary
/// (spec.md §5, "Suspension points").
fn sleep_in_slices(total: Duration, stop: &StopFlag) {
    const SLICE: Duration = Duration::from_millis(100);
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if stop.is_set() {
            return;
        }
        let slice = remaining.min(SLICE);
        thread::sleep(slice);
        remaining -= slice;
    }
}

/// Translates a [`Diff`] into bus events, one per path within a bucket in
/// sorted order; ordering across buckets is unspecified (spec.md §4.6).
fn publish_diff(bus: &Bus, watch: &Watch, diff: &Diff) {
    for p in &diff.files_created {
        bus.publish(
            Event::new(EventKind::Created, p.clone()),
            watch.clone(),
        );
    }
    for p in &diff.dirs_created {
        bus.publish(
            Event::new(EventKind::Created, p.clone()).with_directory(true),
            watch.clone(),
        );
    }
    for p in &diff.files_deleted {
        bus.publish(
            Event::new(EventKind::Deleted, p.clone()),
            watch.clone(),
        );
    }
    for p in &diff.dirs_deleted {
        bus.publish(
            Event::new(EventKind::Deleted, p.clone()).with_directory(true),
            watch.clone(),
        );
    }
    for p in &diff.files_modified {
        bus.publish(
            Event::new(EventKind::Modified, p.clone()),
            watch.clone(),
        );
    }
    for p in &diff.dirs_modified {
        bus.publish(
            Event::new(EventKind::Modified, p.clone()).with_directory(true),
            watch.clone(),
        );
    }
    for (from, to) in &diff.files_moved {
        bus.publish(Event::moved(from.clone(), to.clone()), watch.clone());
    }
    for (from, to) in &diff.dirs_moved {
        bus.publish(
            Event::moved(from.clone(), to.clone()).with_directory(true),
            watch.clone(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecursiveMode;
    use std::time::Duration;

    #[test]
    fn detects_a_created_file() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Bus::new();
        let watch = Watch::new(dir.path(), RecursiveMode::Recursive);
        let config = Config::default().with_poll_interval(Duration::from_millis(50));

        let mut emitter = PollEmitter::start(watch.clone(), bus.clone(), config).unwrap();
        std::fs::write(dir.path().join("a"), b"hi").unwrap();

        let mut saw_created = false;
        for _ in 0..20 {
            if let Some((event, _)) = bus.recv_timeout(Duration::from_millis(200)) {
                if event.kind() == EventKind::Created && event.src_path().ends_with("a") {
                    saw_created = true;
                    break;
                }
            }
        }
        emitter.stop();
        assert!(saw_created);
    }
}

//! Inotify wrapper (C7): opens the kernel notification channel, manages
//! watch descriptors per path, and parses raw event frames.
//!
//! Grounded on `watchdog.observers.inotify_c.Inotify` for the lifecycle and
//! error taxonomy, and on `notify::inotify`'s use of the `inotify` crate
//! plus `mio` for a cancelable, bounded-wait read loop (spec.md §4.7, §5).

use std::collections::HashMap;
use std::ffi::OsString;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

use inotify::{EventMask, Inotify, WatchDescriptor, WatchMask};
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

use crate::emitter::StopFlag;
use crate::error::{Error, ErrorKind, Result};

const INOTIFY_TOKEN: Token = Token(0);

/// A single watch descriptor kept by the wrapper, mirroring spec.md §4.7:
/// "A `Watch` record (path, descriptor, mask, callbacks-by-id) is kept per
/// descriptor." This crate has exactly one callback per descriptor (the
/// owning [`crate::inotify::InotifyEmitter`]), so `refcount` only tracks
/// whether more than one logical subscriber asked for the same path.
#[derive(Debug, Clone)]
struct WatchEntry {
    path: PathBuf,
    mask: WatchMask,
    refcount: usize,
}

/// A raw event frame, as read off the kernel channel (spec.md §6: `{s32 wd,
/// u32 mask, u32 cookie, u32 name_len, char name[name_len]}`), after the
/// `inotify` crate has parsed the frame and stripped trailing NUL padding
/// from `name`.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub wd: WatchDescriptor,
    pub mask: EventMask,
    pub cookie: u32,
    pub name: Option<OsString>,
}

/// Owns the kernel inotify file descriptor and the path<->descriptor maps.
pub struct InotifyChannel {
    inotify: Inotify,
    poll: Poll,
    path_to_wd: HashMap<PathBuf, WatchDescriptor>,
    wd_to_watch: HashMap<WatchDescriptor, WatchEntry>,
}

impl InotifyChannel {
    /// Opens a new kernel notification channel.
    pub fn open() -> Result<Self> {
        let inotify = Inotify::init().map_err(map_io_error)?;
        set_nonblocking(inotify.as_raw_fd())?;

        let poll = Poll::new().map_err(Error::from)?;
        poll.registry()
            .register(
                &mut SourceFd(&inotify.as_raw_fd()),
                INOTIFY_TOKEN,
                Interest::READABLE,
            )
            .map_err(Error::from)?;

        Ok(InotifyChannel {
            inotify,
            poll,
            path_to_wd: HashMap::new(),
            wd_to_watch: HashMap::new(),
        })
    }

    /// Adds a watch for `path` with the given mask, or increments the
    /// refcount if a watch is already held for this exact path (spec.md
    /// §4.7: "a second subscriber for the same path increments the
    /// callback map").
    ///
    /// `EACCES` is swallowed: the path is skipped, per spec.md §4.7's error
    /// taxonomy. Other errors are translated through [`map_io_error`].
    pub fn add_watch(&mut self, path: &Path, mask: WatchMask) -> Result<Option<WatchDescriptor>> {
        if let Some(wd) = self.path_to_wd.get(path).cloned() {
            if let Some(entry) = self.wd_to_watch.get_mut(&wd) {
                entry.refcount += 1;
            }
            return Ok(Some(wd));
        }

        match self.inotify.watches().add(path, mask) {
            Ok(wd) => {
                self.path_to_wd.insert(path.to_path_buf(), wd.clone());
                self.wd_to_watch.insert(
                    wd.clone(),
                    WatchEntry {
                        path: path.to_path_buf(),
                        mask,
                        refcount: 1,
                    },
                );
                Ok(Some(wd))
            }
            Err(err) if err.raw_os_error() == Some(libc::EACCES) => Ok(None),
            Err(err) => Err(map_io_error(err)),
        }
    }

    /// Removes one subscription for `wd`; the underlying kernel watch is
    /// only removed once the last subscriber detaches.
    pub fn remove_watch(&mut self, wd: &WatchDescriptor) -> Result<()> {
        let should_remove = match self.wd_to_watch.get_mut(wd) {
            Some(entry) if entry.refcount > 1 => {
                entry.refcount -= 1;
                false
            }
            Some(_) => true,
            None => return Ok(()),
        };

        if should_remove {
            if let Some(entry) = self.wd_to_watch.remove(wd) {
                self.path_to_wd.remove(&entry.path);
            }
            // The kernel may have already auto-removed this watch (e.g.
            // DELETE_SELF); ignore "not found" errors from an explicit remove.
            let _ = self.inotify.watches().remove(wd.clone());
        }
        Ok(())
    }

    /// Frees the book-keeping for `wd` without touching the kernel, used
    /// when `IN_IGNORED`/`IN_DELETE_SELF` tells us the kernel already
    /// dropped the watch on its own (spec.md §4.7).
    pub fn forget(&mut self, wd: &WatchDescriptor) -> Option<PathBuf> {
        let entry = self.wd_to_watch.remove(wd)?;
        self.path_to_wd.remove(&entry.path);
        Some(entry.path)
    }

    /// The path currently associated with `wd`, if any.
    pub fn path_for(&self, wd: &WatchDescriptor) -> Option<&Path> {
        self.wd_to_watch.get(wd).map(|e| e.path.as_path())
    }

    /// Rewrites every watched path with prefix `old_prefix` to have prefix
    /// `new_prefix` instead, keeping the path<->descriptor maps coherent
    /// after a directory inside the watched subtree is moved (spec.md
    /// §4.7: "the path maps for all descendants must be rewritten").
    pub fn rewrite_prefix(&mut self, old_prefix: &Path, new_prefix: &Path) {
        let affected: Vec<(WatchDescriptor, PathBuf)> = self
            .wd_to_watch
            .iter()
            .filter(|(_, entry)| entry.path.starts_with(old_prefix))
            .map(|(wd, entry)| (wd.clone(), entry.path.clone()))
            .collect();

        for (wd, old_path) in affected {
            let Ok(rel) = old_path.strip_prefix(old_prefix) else {
                continue;
            };
            let new_path = new_prefix.join(rel);
            self.path_to_wd.remove(&old_path);
            self.path_to_wd.insert(new_path.clone(), wd.clone());
            if let Some(entry) = self.wd_to_watch.get_mut(&wd) {
                entry.path = new_path;
            }
        }
    }

    /// Waits for the next batch of raw events, up to one short internal
    /// poll timeout.
    ///
    /// Returns an empty vector both when `stop` was observed and when the
    /// poll simply timed out with nothing pending; callers use the tick to
    /// re-check `stop` and to drain anything that became ready in a
    /// delay-gated queue sitting downstream (spec.md §4.7, §5).
    pub fn read_events(&mut self, stop: &StopFlag) -> Result<Vec<RawEvent>> {
        let mut buffer = [0u8; 4096];
        if stop.is_set() {
            return Ok(Vec::new());
        }

        loop {
            match self.inotify.read_events(&mut buffer) {
                Ok(events) => {
                    return Ok(events
                        .map(|e| RawEvent {
                            wd: e.wd,
                            mask: e.mask,
                            cookie: e.cookie,
                            name: e.name.map(OsString::from),
                        })
                        .collect());
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    let mut events = Events::with_capacity(4);
                    match self.poll.poll(&mut events, Some(Duration::from_millis(200))) {
                        Ok(()) => {
                            if events.is_empty() {
                                // Timed out with nothing readable: let the
                                // caller re-check `stop` and drain the
                                // grouper's delay queue.
                                return Ok(Vec::new());
                            }
                            continue;
                        }
                        Err(poll_err) if poll_err.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(poll_err) => return Err(Error::from(poll_err)),
                    }
                }
                Err(err) if err.raw_os_error() == Some(libc::EBADF) => {
                    // Treated as closure: end-of-stream (spec.md §4.7).
                    return Ok(Vec::new());
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(map_io_error(err)),
            }
        }
    }
}

fn set_nonblocking(fd: std::os::unix::io::RawFd) -> Result<()> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL, 0);
        if flags < 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(std::io::Error::last_os_error().into());
        }
    }
    Ok(())
}

/// Maps raw inotify-add-watch/read errors onto this crate's error
/// taxonomy (spec.md §4.7): `ENOSPC` -> [`ErrorKind::WatchLimitReached`],
/// `EMFILE` -> [`ErrorKind::InstanceLimitReached`].
fn map_io_error(err: std::io::Error) -> Error {
    match err.raw_os_error() {
        Some(libc::ENOSPC) => Error::new(ErrorKind::WatchLimitReached),
        Some(libc::EMFILE) => Error::new(ErrorKind::InstanceLimitReached),
        _ => Error::from(err),
    }
}

//! FSEvents emitter (C10), macOS only.
//!
//! Subscribes to the native recursive change stream via `fsevent-sys`'s raw
//! `CoreServices` bindings. Grounded directly on the teacher's own
//! `src/fsevent.rs` (the CF path/array plumbing, the `FSEventStreamContext`
//! + background-thread-owned `CFRunLoop` shape, and the `callback` entry
//! point), re-targeted to this crate's `Event`/`EventKind` model and the
//! shared bus instead of `notify`'s `mpsc::Sender<notify::Event>`.

#![cfg(target_os = "macos")]

use std::ffi::CString;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;

use fsevent_sys::core_foundation as cf;
use fsevent_sys::fsevent as fs;

use crate::bus::Bus;
use crate::config::Config;
use crate::emitter::{Emitter, StopFlag};
use crate::error::{Error, Result};
use crate::event::{synthetic_moves, Event, EventKind};
use crate::watch::Watch;

bitflags::bitflags! {
    /// `FSEventStreamEventFlags`, restated here since `fsevent-sys` exposes
    /// only the raw `u32` (teacher: `src/fsevent.rs`'s `StreamFlags`).
    struct StreamFlags: u32 {
        const ROOT_CHANGED = 0x0000_0020;
        const ITEM_CREATED = 0x0000_0100;
        const ITEM_REMOVED = 0x0000_0200;
        const ITEM_INODE_META_MOD = 0x0000_0400;
        const ITEM_RENAMED = 0x0000_0800;
        const ITEM_MODIFIED = 0x0000_1000;
        const ITEM_XATTR_MOD = 0x0000_8000;
        const ITEM_IS_DIR = 0x0002_0000;
    }
}

/// A rename whose pairing partner hasn't arrived yet (spec.md §4.10: "a
/// rename is reported as two consecutive events whose ids differ by
/// exactly one").
struct PendingRename {
    id: u64,
    path: PathBuf,
    is_directory: bool,
}

struct StreamContext {
    bus: Bus,
    watch: Watch,
    recursive: bool,
    stop: StopFlag,
    pending_rename: Mutex<Option<PendingRename>>,
}

impl StreamContext {
    fn publish(&self, event: Event) {
        self.bus.publish(event, self.watch.clone());
    }

    fn publish_parent_modified(&self, path: &std::path::Path) {
        if let Some(parent) = path.parent() {
            self.publish(Event::new(EventKind::Modified, parent.to_path_buf()).with_directory(true));
        }
    }

    fn resolve_standalone(&self, path: PathBuf, is_directory: bool) {
        let kind = if path.exists() {
            EventKind::Created
        } else {
            EventKind::Deleted
        };
        self.publish(Event::new(kind, path.clone()).with_directory(is_directory));
        self.publish_parent_modified(&path);
    }

    fn publish_moved(&self, from: PathBuf, to: PathBuf, is_directory: bool) {
        self.publish(Event::moved(from.clone(), to.clone()).with_directory(is_directory));
        self.publish_parent_modified(&to);
        if is_directory && self.recursive {
            for synth in synthetic_moves(&from, &to) {
                self.publish(synth);
            }
        }
    }
}

/// The macOS backend: one `FSEventStream` per watch, run on a dedicated
/// thread owning its own `CFRunLoop`.
pub struct FsEventEmitter {
    stop: StopFlag,
    runloop: Arc<Mutex<Option<usize>>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Emitter for FsEventEmitter {
    fn start(watch: Watch, bus: Bus, _config: Config) -> Result<Self> {
        let stop = StopFlag::new();
        let runloop: Arc<Mutex<Option<usize>>> = Arc::new(Mutex::new(None));
        let runloop_for_thread = Arc::clone(&runloop);

        let root = watch.path().to_path_buf();
        let recursive = watch.is_recursive();
        let context = Box::new(StreamContext {
            bus,
            watch,
            recursive,
            stop: stop.clone(),
            pending_rename: Mutex::new(None),
        });
        let context_ptr: *mut StreamContext = Box::into_raw(context);

        let c_path = CString::new(root.to_string_lossy().into_owned())
            .map_err(|_| Error::generic("watch path contains an interior NUL"))?;

        let thread = thread::Builder::new()
            .name(format!("sentrywatch-fsevent:{}", root.display()))
            .spawn(move || unsafe {
                let path_array =
                    cf::CFArrayCreateMutable(cf::kCFAllocatorDefault, 0, &cf::kCFTypeArrayCallBacks);
                let cf_path = cf::CFStringCreateWithCString(
                    cf::kCFAllocatorDefault,
                    c_path.as_ptr(),
                    cf::kCFStringEncodingUTF8,
                );
                cf::CFArrayAppendValue(path_array, cf_path as *const _);
                cf::CFRelease(cf_path as cf::CFRef);

                let stream_context = fs::FSEventStreamContext {
                    version: 0,
                    info: context_ptr as *mut libc::c_void,
                    retain: cf::NULL,
                    release: cf::NULL,
                    copy_description: cf::NULL,
                };

                let stream = fs::FSEventStreamCreate(
                    cf::kCFAllocatorDefault,
                    callback,
                    &stream_context,
                    path_array,
                    fs::kFSEventStreamEventIdSinceNow,
                    0.1,
                    fs::kFSEventStreamCreateFlagFileEvents,
                );

                let current = cf::CFRunLoopGetCurrent();
                *runloop_for_thread.lock().unwrap() = Some(current as usize);

                fs::FSEventStreamScheduleWithRunLoop(stream, current, cf::kCFRunLoopDefaultMode);
                fs::FSEventStreamStart(stream);

                // Unblocked by `FsEventEmitter::stop` calling `CFRunLoopStop`
                // on this same run loop.
                cf::CFRunLoopRun();

                fs::FSEventStreamStop(stream);
                fs::FSEventStreamInvalidate(stream);
                fs::FSEventStreamRelease(stream);
                cf::CFRelease(path_array as cf::CFRef);
                drop(Box::from_raw(context_ptr));
            })
            .map_err(std::io::Error::from)?;

        Ok(FsEventEmitter {
            stop,
            runloop,
            thread: Some(thread),
        })
    }

    fn stop(&mut self) {
        self.stop.signal();
        if let Some(runloop) = *self.runloop.lock().unwrap() {
            unsafe {
                cf::CFRunLoopStop(runloop as cf::CFRunLoopRef);
            }
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for FsEventEmitter {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Translates one batch of native callback arrays into bus events (spec.md
/// §4.10).
extern "C" fn callback(
    _stream_ref: fs::FSEventStreamRef,
    info: *mut libc::c_void,
    num_events: libc::size_t,
    event_paths: *mut libc::c_void,
    event_flags: *const fs::FSEventStreamEventFlags,
    event_ids: *const fs::FSEventStreamEventId,
) {
    let num = num_events as usize;
    let ctx: &StreamContext = unsafe { &*(info as *const StreamContext) };

    let paths: &[*const libc::c_char] =
        unsafe { std::slice::from_raw_parts(event_paths as *const *const libc::c_char, num) };
    let flags: &[fs::FSEventStreamEventFlags] = unsafe { std::slice::from_raw_parts(event_flags, num) };
    let ids: &[fs::FSEventStreamEventId] = unsafe { std::slice::from_raw_parts(event_ids, num) };

    for i in 0..num {
        let raw_path = unsafe { std::ffi::CStr::from_ptr(paths[i]) };
        let path = PathBuf::from(raw_path.to_string_lossy().into_owned());
        let raw_flags = StreamFlags::from_bits_truncate(flags[i] as u32);
        let id = ids[i] as u64;
        let is_directory = raw_flags.contains(StreamFlags::ITEM_IS_DIR);

        if raw_flags.contains(StreamFlags::ROOT_CHANGED) {
            // The watch root itself is gone: emit a DirDeleted for it and
            // stop this emitter (spec.md §4.10, §7). Stopping the run loop
            // here unblocks `CFRunLoopRun` in `FsEventEmitter::start`,
            // whose own cleanup code tears down the stream.
            ctx.publish(Event::new(EventKind::Deleted, ctx.watch.path().to_path_buf()).with_directory(true));
            ctx.stop.signal();
            unsafe {
                cf::CFRunLoopStop(cf::CFRunLoopGetCurrent());
            }
            return;
        }

        if raw_flags.contains(StreamFlags::ITEM_RENAMED) {
            let mut pending = ctx.pending_rename.lock().unwrap();
            match pending.take() {
                Some(prev) if id == prev.id + 1 => {
                    ctx.publish_moved(prev.path, path, is_directory);
                }
                Some(prev) => {
                    ctx.resolve_standalone(prev.path, prev.is_directory);
                    *pending = Some(PendingRename {
                        id,
                        path,
                        is_directory,
                    });
                }
                None => {
                    *pending = Some(PendingRename {
                        id,
                        path,
                        is_directory,
                    });
                }
            }
            continue;
        }

        if let Some(prev) = ctx.pending_rename.lock().unwrap().take() {
            ctx.resolve_standalone(prev.path, prev.is_directory);
        }

        if raw_flags.contains(StreamFlags::ITEM_CREATED) {
            ctx.publish(Event::new(EventKind::Created, path.clone()).with_directory(is_directory));
            ctx.publish_parent_modified(&path);
        } else if raw_flags.contains(StreamFlags::ITEM_REMOVED) {
            ctx.publish(Event::new(EventKind::Deleted, path.clone()).with_directory(is_directory));
            ctx.publish_parent_modified(&path);
        } else if raw_flags.intersects(
            StreamFlags::ITEM_MODIFIED | StreamFlags::ITEM_INODE_META_MOD | StreamFlags::ITEM_XATTR_MOD,
        ) {
            ctx.publish(Event::new(EventKind::Modified, path).with_directory(is_directory));
        }
    }
}

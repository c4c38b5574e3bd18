//! Observer/dispatcher (C12): owns the bus, the emitter set, and the
//! watch -> handlers / watch -> emitter maps; drains the bus on its own
//! thread and routes events to handlers.
//!
//! Grounded on `watchdog.observers.api.BaseObserver` for the bookkeeping
//! maps, the lock discipline (snapshot handlers under the lock, release it
//! before invoking them), and `schedule`'s rollback-on-failure behavior;
//! and on `notify::recommended_watcher` for picking a backend by platform.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::bus::Bus;
use crate::config::{Config, EventFilter, RecursiveMode};
use crate::emitter::Emitter;
use crate::error::{Error, ErrorKind, Result};
use crate::handler::EventHandler;
use crate::null::NullEmitter;
use crate::poll::PollEmitter;
use crate::watch::Watch;

#[cfg(target_os = "linux")]
use crate::inotify::InotifyEmitter;

#[cfg(all(target_os = "macos", feature = "macos_fsevent"))]
use crate::fsevent::FsEventEmitter;

#[cfg(windows)]
use crate::windows::RdcwEmitter;

/// How long the dispatch thread blocks on the bus between checks of its
/// stop flag (spec.md §5, "Suspension points").
const DISPATCH_TIMEOUT: Duration = Duration::from_millis(200);

/// Which backend serves new watches. `Auto` resolves to the
/// platform-recommended backend at schedule time; the rest exist so tests
/// can pin a specific one (spec.md §4.14, "Environment hints for
/// testing").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Backend {
    #[default]
    Auto,
    Poll,
    #[cfg(target_os = "linux")]
    Inotify,
    #[cfg(all(target_os = "macos", feature = "macos_fsevent"))]
    FsEvent,
    #[cfg(windows)]
    Rdcw,
    Null,
}

fn recommended_backend() -> Backend {
    #[cfg(target_os = "linux")]
    {
        return Backend::Inotify;
    }
    #[cfg(all(target_os = "macos", feature = "macos_fsevent"))]
    {
        return Backend::FsEvent;
    }
    #[cfg(windows)]
    {
        return Backend::Rdcw;
    }
    #[allow(unreachable_code)]
    Backend::Poll
}

fn resolve(backend: Backend) -> Backend {
    match backend {
        Backend::Auto => recommended_backend(),
        other => other,
    }
}

fn start_backend(backend: Backend, watch: Watch, bus: Bus, config: Config) -> Result<Box<dyn Emitter>> {
    match backend {
        Backend::Poll => Ok(Box::new(PollEmitter::start(watch, bus, config)?)),
        #[cfg(target_os = "linux")]
        Backend::Inotify => Ok(Box::new(InotifyEmitter::start(watch, bus, config)?)),
        #[cfg(all(target_os = "macos", feature = "macos_fsevent"))]
        Backend::FsEvent => Ok(Box::new(FsEventEmitter::start(watch, bus, config)?)),
        #[cfg(windows)]
        Backend::Rdcw => Ok(Box::new(RdcwEmitter::start(watch, bus, config)?)),
        Backend::Null => Ok(Box::new(NullEmitter::start(watch, bus, config)?)),
        Backend::Auto => unreachable!("resolved before start_backend is called"),
    }
}

#[derive(Default)]
struct State {
    watches: std::collections::HashSet<Watch>,
    handlers: HashMap<Watch, Vec<Arc<dyn EventHandler>>>,
    emitters: HashMap<Watch, Box<dyn Emitter>>,
}

struct Inner {
    bus: Bus,
    backend: Backend,
    config: Config,
    state: Mutex<State>,
    stop: crate::emitter::StopFlag,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// Owns every watch, its emitter, and its handlers; drains the bus on a
/// dedicated dispatch thread once [`Observer::start`] is called (spec.md
/// §4.12).
#[derive(Clone)]
pub struct Observer(Arc<Inner>);

impl Observer {
    /// Creates an observer that picks a backend automatically per
    /// platform.
    pub fn new(config: Config) -> Self {
        Self::with_backend(config, Backend::Auto)
    }

    /// Creates an observer pinned to a specific backend, overriding the
    /// platform default (spec.md §4.14).
    pub fn with_backend(config: Config, backend: Backend) -> Self {
        Observer(Arc::new(Inner {
            bus: Bus::new(),
            backend,
            config,
            state: Mutex::new(State::default()),
            stop: crate::emitter::StopFlag::new(),
            thread: Mutex::new(None),
        }))
    }

    /// Schedules `handler` for events under `path` (spec.md §4.12).
    ///
    /// If a watch with this exact `(path, recursive, filter)` already has
    /// an emitter running, `handler` is simply added to its handler set.
    /// Otherwise a new emitter is started; if starting fails, all
    /// bookkeeping just added for this call is rolled back.
    pub fn schedule(
        &self,
        handler: Arc<dyn EventHandler>,
        path: impl Into<PathBuf>,
        mode: RecursiveMode,
        filter: EventFilter,
    ) -> Result<Watch> {
        let watch = Watch::new(path.into(), mode).with_filter(filter);
        let mut state = self.0.state.lock().unwrap();

        let handlers = state.handlers.entry(watch.clone()).or_default();
        handlers.push(handler);
        let is_first_handler = handlers.len() == 1;

        if !state.emitters.contains_key(&watch) {
            let resolved = resolve(self.0.backend);
            match start_backend(resolved, watch.clone(), self.0.bus.clone(), self.0.config) {
                Ok(emitter) => {
                    state.emitters.insert(watch.clone(), emitter);
                }
                Err(err) => {
                    if is_first_handler {
                        state.handlers.remove(&watch);
                    } else if let Some(handlers) = state.handlers.get_mut(&watch) {
                        handlers.pop();
                    }
                    return Err(err);
                }
            }
        }

        state.watches.insert(watch.clone());
        Ok(watch)
    }

    /// Adds `handler` to an already-scheduled `watch`.
    pub fn add_handler(&self, handler: Arc<dyn EventHandler>, watch: &Watch) {
        let mut state = self.0.state.lock().unwrap();
        state.handlers.entry(watch.clone()).or_default().push(handler);
    }

    /// Removes every handler pointer-equal to `handler` from `watch`.
    pub fn remove_handler(&self, handler: &Arc<dyn EventHandler>, watch: &Watch) {
        let mut state = self.0.state.lock().unwrap();
        if let Some(handlers) = state.handlers.get_mut(watch) {
            handlers.retain(|h| !Arc::ptr_eq(h, handler));
        }
    }

    /// Stops and removes `watch`'s emitter and every handler registered
    /// for it. Fails with [`ErrorKind::WatchNotFound`] if `watch` isn't
    /// currently scheduled.
    pub fn unschedule(&self, watch: &Watch) -> Result<()> {
        let mut state = self.0.state.lock().unwrap();
        if !state.watches.remove(watch) {
            return Err(Error::new(ErrorKind::WatchNotFound));
        }
        state.handlers.remove(watch);
        if let Some(mut emitter) = state.emitters.remove(watch) {
            emitter.stop();
        }
        Ok(())
    }

    /// Unschedules every watch. Idempotent, and safe to call from inside a
    /// handler callback since the observer lock is never held during
    /// dispatch (spec.md §4.12, §5).
    pub fn unschedule_all(&self) {
        let mut state = self.0.state.lock().unwrap();
        state.handlers.clear();
        for (_, mut emitter) in state.emitters.drain() {
            emitter.stop();
        }
        state.watches.clear();
    }

    /// Starts the dispatch thread. A no-op if already started.
    pub fn start(&self) -> Result<()> {
        let mut thread = self.0.thread.lock().unwrap();
        if thread.is_some() {
            return Ok(());
        }
        let inner = Arc::clone(&self.0);
        *thread = Some(
            thread::Builder::new()
                .name("sentrywatch-observer".into())
                .spawn(move || dispatch_loop(inner))
                .map_err(std::io::Error::from)?,
        );
        Ok(())
    }

    /// Signals the dispatch thread to stop; does not block. Call
    /// [`Observer::join`] to wait for it.
    pub fn stop(&self) {
        self.0.stop.signal();
    }

    /// Blocks until the dispatch thread (if started) has exited.
    pub fn join(&self) {
        let handle = self.0.thread.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

fn dispatch_loop(inner: Arc<Inner>) {
    loop {
        if inner.stop.is_set() {
            break;
        }
        let Some((event, watch)) = inner.bus.recv_timeout(DISPATCH_TIMEOUT) else {
            continue;
        };
        if !watch.filter().matches(event.kind()) {
            continue;
        }

        let handlers = {
            let state = inner.state.lock().unwrap();
            state.handlers.get(&watch).cloned().unwrap_or_default()
        };
        for handler in handlers {
            if catch_unwind(AssertUnwindSafe(|| handler.dispatch(&event))).is_err() {
                log::error!(
                    "handler panicked while dispatching {:?} for {}",
                    event.kind(),
                    watch.path().display()
                );
            }
        }
    }
    inner.state.lock().unwrap().handlers.clear();
    let mut state = inner.state.lock().unwrap();
    for (_, mut emitter) in state.emitters.drain() {
        emitter.stop();
    }
    state.watches.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler(Arc<AtomicUsize>);
    impl EventHandler for CountingHandler {
        fn on_any_event(&self, _event: &Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn schedule_then_unschedule_stops_emitter() {
        let observer = Observer::with_backend(Config::default(), Backend::Null);
        let count = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(CountingHandler(Arc::clone(&count))) as Arc<dyn EventHandler>;
        let watch = observer
            .schedule(handler, "/tmp/does-not-matter", RecursiveMode::Recursive, EventFilter::empty())
            .unwrap();
        observer.unschedule(&watch).unwrap();
        assert!(observer.unschedule(&watch).is_err());
    }

    #[test]
    fn dispatch_loop_routes_bus_events_to_handlers() {
        let observer = Observer::with_backend(Config::default(), Backend::Null);
        let count = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(CountingHandler(Arc::clone(&count))) as Arc<dyn EventHandler>;
        let watch = observer
            .schedule(handler, "/tmp/x", RecursiveMode::Recursive, EventFilter::empty())
            .unwrap();
        observer.start().unwrap();

        observer
            .0
            .bus
            .publish(Event::new(EventKind::Created, "/tmp/x/a"), watch);

        let mut seen = 0;
        for _ in 0..20 {
            seen = count.load(Ordering::SeqCst);
            if seen > 0 {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        observer.stop();
        observer.join();
        assert_eq!(seen, 1);
    }

    #[test]
    fn unschedule_unknown_watch_fails() {
        let observer = Observer::with_backend(Config::default(), Backend::Null);
        let watch = Watch::new("/tmp/never-scheduled", RecursiveMode::Recursive);
        assert!(observer.unschedule(&watch).is_err());
    }
}

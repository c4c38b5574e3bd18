//! The emitter capability (§9 Design Notes): a small typed interface each
//! backend implements, so the object graph is a tree (watch -> emitter ->
//! bus) rather than emitters holding back-references into the observer.
//!
//! Every concrete backend (C6 polling, C9 inotify, C10 FSEvents, C11
//! ReadDirectoryChangesW, plus the [`crate::null`] test stub) implements
//! [`Emitter`]. The [`Observer`](crate::observer::Observer) only ever talks
//! to backends through this trait, matching spec.md §9: "Each backend
//! should live behind the same emitter capability, selected at
//! construction."

use crate::bus::Bus;
use crate::config::Config;
use crate::error::Result;
use crate::watch::Watch;

/// A running per-watch event producer.
///
/// An `Emitter` owns every kernel resource it needs (a kernel notification
/// channel, a polling thread, a self-pipe, ...) and releases all of them on
/// [`Emitter::stop`], regardless of whether `stop` is reached normally, via
/// error, or via [`crate::observer::Observer::unschedule`] (spec.md §5,
/// "Resource lifetime"). `stop` must be idempotent.
pub trait Emitter: Send {
    /// Starts producing events for `watch` onto `bus`, spawning whatever
    /// background thread the backend needs. Implementations must suspend
    /// only on bounded waits (a kernel read with a timeout, or a polling
    /// sleep) so a later `stop()` is observed promptly (spec.md §5).
    fn start(watch: Watch, bus: Bus, config: Config) -> Result<Self>
    where
        Self: Sized;

    /// Stops the emitter and releases its resources. Idempotent.
    fn stop(&mut self);
}

/// A minimal cooperative stop signal shared between an emitter's public
/// handle and its background thread.
///
/// Every backend in this crate is built around one thread that loops until
/// this flag is set, checking it at every bounded wait (spec.md §5,
/// "Suspension points"). Wrapping it here avoids repeating the same
/// `Arc<AtomicBool>` dance in every backend module.
#[derive(Clone, Default)]
pub struct StopFlag(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl StopFlag {
    /// Creates a fresh, unset stop flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that the associated loop stop. Safe to call more than once.
    pub fn signal(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    /// Whether a stop has been requested.
    pub fn is_set(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

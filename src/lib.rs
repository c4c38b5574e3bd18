//! Cross-platform filesystem notification and dispatch.
//!
//! `sentrywatch` watches one or more paths for filesystem activity and
//! dispatches a uniform [`Event`] stream to registered [`EventHandler`]s,
//! regardless of which kernel facility produced it: Linux inotify, macOS
//! FSEvents, Windows `ReadDirectoryChangesW`, or a portable polling
//! fallback.
//!
//! ```no_run
//! use std::sync::Arc;
//! use sentrywatch::{Config, EventFilter, LoggingEventHandler, Observer, RecursiveMode};
//!
//! let observer = Observer::new(Config::default());
//! observer.start()?;
//! observer.schedule(
//!     Arc::new(LoggingEventHandler::new()),
//!     "/tmp",
//!     RecursiveMode::Recursive,
//!     EventFilter::empty(),
//! )?;
//! # Ok::<(), sentrywatch::Error>(())
//! ```

mod bus;
mod config;
mod delay_queue;
mod emitter;
mod error;
mod event;
mod handler;
mod identity;
mod null;
mod observer;
mod pattern;
mod poll;
mod queue;
mod snapshot;
mod watch;

#[cfg(target_os = "linux")]
mod inotify;

#[cfg(all(target_os = "macos", feature = "macos_fsevent"))]
mod fsevent;

#[cfg(windows)]
mod windows;

pub use config::{Config, EventFilter, RecursiveMode};
pub use error::{Error, ErrorKind, Result};
pub use event::{Event, EventKind};
pub use handler::{EventHandler, LoggingEventHandler, PatternMatchingEventHandler, RegexMatchingEventHandler};
pub use observer::{Backend, Observer};
pub use pattern::{GlobPatterns, RegexPatterns};
pub use watch::Watch;

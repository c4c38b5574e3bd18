//! Error types returned by `sentrywatch`.

use std::path::PathBuf;

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The kind of error that occurred.
///
/// Mirrors the error taxonomy in spec.md §7: configuration errors are
/// surfaced synchronously at the call site, resource errors are surfaced
/// synchronously from [`crate::Observer::schedule`], and transient I/O
/// errors never reach this type at all (they are swallowed at the
/// innermost level, per §4.3 and §4.7).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An error that isn't part of this list.
    #[error("generic error: {0}")]
    Generic(String),

    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The path given does not exist.
    #[error("path not found")]
    PathNotFound,

    /// Attempted to unschedule a watch that was never scheduled, or was
    /// already unscheduled.
    #[error("watch not found")]
    WatchNotFound,

    /// The kernel watch-descriptor table is full (Linux `ENOSPC`).
    ///
    /// See `fs.inotify.max_user_watches`.
    #[error("inotify watch limit reached")]
    WatchLimitReached,

    /// The per-user inotify instance limit was reached (Linux `EMFILE`).
    ///
    /// See `fs.inotify.max_user_instances`.
    #[error("inotify instance limit reached")]
    InstanceLimitReached,

    /// A path-pattern configuration was invalid, e.g. mismatched
    /// case-sensitivity across allow/deny lists, or an unparsable glob or
    /// regular expression.
    #[error("invalid path pattern: {0}")]
    InvalidPattern(String),

    /// Generic invalid configuration, not path-pattern specific.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// An error produced by this crate, optionally tagged with the paths it concerns.
#[derive(Debug, thiserror::Error)]
#[error("{kind}{}", paths_suffix(.paths))]
pub struct Error {
    /// The kind of error.
    pub kind: ErrorKind,
    /// Paths associated with the error, if any.
    pub paths: Vec<PathBuf>,
}

fn paths_suffix(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        String::new()
    } else {
        format!(
            " ({})",
            paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl Error {
    /// Creates a new error with no associated paths.
    pub fn new(kind: ErrorKind) -> Self {
        Error {
            kind,
            paths: Vec::new(),
        }
    }

    /// Attaches a path to this error, returning it for chaining.
    pub fn add_path(mut self, path: PathBuf) -> Self {
        self.paths.push(path);
        self
    }

    /// Shorthand for an [`ErrorKind::Generic`] error.
    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Generic(message.into()))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::PathNotFound,
            _ => ErrorKind::Io(err),
        };
        Error::new(kind)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

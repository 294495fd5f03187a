//! Error types for the watch multiplexer.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Invalid path {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("Path {path} is not a directory and its parent {tried} is not one either")]
    NotADirectory { path: PathBuf, tried: PathBuf },

    #[error("Native watch on {path} failed: {reason}")]
    Subscription { path: PathBuf, reason: String },

    #[error("Native event source failed: {0}")]
    Source(SourceError),

    #[error("Native event source closed unexpectedly")]
    SourceClosed,

    #[error("Watcher is closed after a fatal source error")]
    Closed,

    #[error("Another watch loop is already running")]
    AlreadyWatching,

    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}

/// An error reported asynchronously by a native event source.
///
/// Fatal errors end the watch loop; everything else is logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError {
    message: String,
    fatal: bool,
}

impl SourceError {
    /// A recoverable source error.
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: false,
        }
    }

    /// An error after which the source cannot deliver further events.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fatal: true,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.fatal {
            write!(f, "fatal: {}", self.message)
        } else {
            f.write_str(&self.message)
        }
    }
}

impl std::error::Error for SourceError {}

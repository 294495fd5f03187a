//! Native watch sources.
//!
//! A source owns the OS-level subscriptions and turns kernel notifications
//! into [`RawEvent`]s on a `crossbeam_channel` stream. Subscriptions are
//! always non-recursive: one directory, its immediate entries.

mod manual;
mod native;

use std::fmt;
use std::path::Path;

use crossbeam_channel::Receiver;

use super::error::{SourceError, WatchError};
use super::event::RawEvent;

pub use manual::{ManualFeed, ManualSource};
pub use native::NotifySource;

/// A message on a source's event stream.
pub type SourceMessage = Result<RawEvent, SourceError>;

/// Opaque handle for one native directory subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchToken(u64);

impl WatchToken {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WatchToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An OS facility delivering change notifications at directory granularity.
pub trait NativeSource: Send {
    /// Source name for logging.
    fn name(&self) -> &str;

    /// Start watching `dir` (non-recursive).
    fn subscribe(&mut self, dir: &Path) -> Result<WatchToken, WatchError>;

    /// Stop watching `dir`.
    ///
    /// Sources treat an already-dropped watch as success.
    fn unsubscribe(&mut self, dir: &Path) -> Result<(), WatchError>;

    /// The stream of events and asynchronous errors.
    ///
    /// The stream disconnecting means the source is gone for good.
    fn events(&self) -> Receiver<SourceMessage>;
}

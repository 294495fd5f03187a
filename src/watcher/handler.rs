//! Handler contract and capability declarations.
//!
//! A handler declares which event kinds it understands through
//! [`Handler::capabilities`]. The dispatcher only calls the callbacks a
//! handler has declared; undeclared kinds are skipped without error.

use std::fmt;
use std::path::Path;

use bitflags::bitflags;

bitflags! {
    /// Event kinds a handler is able to receive.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        const MODIFIED = 1 << 0;
        const CREATED = 1 << 1;
        const DELETED = 1 << 2;
        /// Part of the contract, but no dispatch path produces it.
        const MOVED = 1 << 3;
    }
}

/// Typed change notification kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

impl EventKind {
    /// The capability a handler must declare to receive this kind.
    pub fn capability(self) -> Capabilities {
        match self {
            EventKind::Created => Capabilities::CREATED,
            EventKind::Modified => Capabilities::MODIFIED,
            EventKind::Deleted => Capabilities::DELETED,
            EventKind::Moved => Capabilities::MOVED,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Modified => "modified",
            EventKind::Deleted => "deleted",
            EventKind::Moved => "moved",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver of filesystem change notifications.
///
/// Callbacks run synchronously on the thread driving
/// [`WatchMultiplexer::watch`](super::WatchMultiplexer::watch), one at a time.
pub trait Handler: Send + Sync {
    /// Handler name for logging.
    fn name(&self) -> &str {
        "handler"
    }

    /// The event kinds this handler wants.
    fn capabilities(&self) -> Capabilities;

    fn modified(&self, _path: &Path) {}

    fn created(&self, _path: &Path) {}

    fn deleted(&self, _path: &Path) {}

    /// Never invoked: rename events are not produced by any source.
    fn moved(&self, _source: &Path, _dest: &Path) {}
}

type PathCallback = Box<dyn Fn(&Path) + Send + Sync>;
type MoveCallback = Box<dyn Fn(&Path, &Path) + Send + Sync>;

/// A handler assembled from optional closures.
///
/// Capabilities are exactly the slots that have been filled.
///
/// ```
/// use fsmux::FnHandler;
///
/// let handler = FnHandler::new("printer")
///     .on_modified(|path| println!("{} changed", path.display()));
/// ```
pub struct FnHandler {
    name: String,
    modified: Option<PathCallback>,
    created: Option<PathCallback>,
    deleted: Option<PathCallback>,
    moved: Option<MoveCallback>,
}

impl FnHandler {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modified: None,
            created: None,
            deleted: None,
            moved: None,
        }
    }

    pub fn on_modified(mut self, f: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        self.modified = Some(Box::new(f));
        self
    }

    pub fn on_created(mut self, f: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        self.created = Some(Box::new(f));
        self
    }

    pub fn on_deleted(mut self, f: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        self.deleted = Some(Box::new(f));
        self
    }

    pub fn on_moved(mut self, f: impl Fn(&Path, &Path) + Send + Sync + 'static) -> Self {
        self.moved = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for FnHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

impl Handler for FnHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::empty();
        caps.set(Capabilities::MODIFIED, self.modified.is_some());
        caps.set(Capabilities::CREATED, self.created.is_some());
        caps.set(Capabilities::DELETED, self.deleted.is_some());
        caps.set(Capabilities::MOVED, self.moved.is_some());
        caps
    }

    fn modified(&self, path: &Path) {
        if let Some(f) = &self.modified {
            f(path);
        }
    }

    fn created(&self, path: &Path) {
        if let Some(f) = &self.created {
            f(path);
        }
    }

    fn deleted(&self, path: &Path) {
        if let Some(f) = &self.deleted {
            f(path);
        }
    }

    fn moved(&self, source: &Path, dest: &Path) {
        if let Some(f) = &self.moved {
            f(source, dest);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_fn_handler_capabilities_follow_slots() {
        let handler = FnHandler::new("deletes").on_deleted(|_| {});
        assert_eq!(handler.capabilities(), Capabilities::DELETED);

        let handler = FnHandler::new("all")
            .on_modified(|_| {})
            .on_created(|_| {})
            .on_deleted(|_| {});
        assert!(handler.capabilities().contains(Capabilities::MODIFIED | Capabilities::CREATED));
        assert!(!handler.capabilities().contains(Capabilities::MOVED));
    }

    #[test]
    fn test_fn_handler_invokes_callback() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let handler = FnHandler::new("count").on_modified(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        handler.modified(Path::new("/tmp/a"));
        // Unset slot is a no-op
        handler.created(Path::new("/tmp/a"));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_kind_capability() {
        assert_eq!(EventKind::Modified.capability(), Capabilities::MODIFIED);
        assert_eq!(EventKind::Moved.capability(), Capabilities::MOVED);
        assert_eq!(EventKind::Deleted.to_string(), "deleted");
    }
}

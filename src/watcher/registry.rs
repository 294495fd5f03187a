//! Handler registry keyed by canonical path.
//!
//! An insertion-ordered multimap from path to the handlers registered there.
//! Every entry carries a registration sequence number so that handlers drawn
//! from several paths can be merged back into global registration order.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::handler::Handler;
use super::path::CanonicalPath;

/// One registration of a handler on a path.
#[derive(Clone)]
pub struct HandlerEntry {
    /// The path the handler was registered on.
    pub path: CanonicalPath,
    /// The directory whose native watch serves this registration.
    pub dir: CanonicalPath,
    pub handler: Arc<dyn Handler>,
    seq: u64,
}

impl HandlerEntry {
    /// Registration sequence number, unique and increasing per registry.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Debug for HandlerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerEntry")
            .field("path", &self.path)
            .field("dir", &self.dir)
            .field("handler", &self.handler.name())
            .field("seq", &self.seq)
            .finish()
    }
}

/// Ordered mapping from canonical path to registered handlers.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    entries: IndexMap<CanonicalPath, Vec<HandlerEntry>>,
    next_seq: u64,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `path`, served by the watch on `dir`.
    ///
    /// Returns the registration sequence number.
    pub fn register(
        &mut self,
        path: CanonicalPath,
        dir: CanonicalPath,
        handler: Arc<dyn Handler>,
    ) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.entries
            .entry(path.clone())
            .or_default()
            .push(HandlerEntry {
                path,
                dir,
                handler,
                seq,
            });
        seq
    }

    /// Remove every handler registered on `path`.
    ///
    /// Returns the removed entries; empty when nothing was registered.
    pub fn unregister_all(&mut self, path: &CanonicalPath) -> Vec<HandlerEntry> {
        self.entries.shift_remove(path).unwrap_or_default()
    }

    /// Handlers registered on exactly `path`, in registration order.
    pub fn entries_for(&self, path: &CanonicalPath) -> &[HandlerEntry] {
        self.entries.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any registration is served by the watch on `dir`.
    pub fn depends_on(&self, dir: &CanonicalPath) -> bool {
        self.entries
            .values()
            .flatten()
            .any(|entry| &entry.dir == dir)
    }

    /// Registered paths in first-registration order.
    pub fn paths(&self) -> impl Iterator<Item = &CanonicalPath> {
        self.entries.keys()
    }

    /// Total number of handler registrations.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

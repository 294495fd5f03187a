//! Directories with a live native subscription.
//!
//! Native watchers cap the number of watched objects and have no cheap
//! per-file granularity, so watches are taken per directory and shared by
//! every registration inside it. Liveness is recomputed by scanning the
//! registry on release instead of keeping a counter.

use indexmap::IndexMap;

use super::error::WatchError;
use super::path::CanonicalPath;
use super::registry::HandlerRegistry;
use super::source::{NativeSource, WatchToken};

/// A directory under native watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedDirectory {
    pub path: CanonicalPath,
    pub token: WatchToken,
}

/// Table of watched directories.
#[derive(Debug, Default)]
pub struct DirectoryWatchTable {
    dirs: IndexMap<CanonicalPath, WatchedDirectory>,
}

impl DirectoryWatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure `dir` has a native subscription.
    ///
    /// Returns `true` when a new subscription was made. On failure the table
    /// is left unchanged.
    pub fn ensure_watched(
        &mut self,
        dir: &CanonicalPath,
        source: &mut dyn NativeSource,
    ) -> Result<bool, WatchError> {
        if self.dirs.contains_key(dir) {
            return Ok(false);
        }

        let token = source.subscribe(dir.as_path())?;
        crate::log_event!(source.name(), "watching", "{dir} ({token})");
        self.dirs.insert(
            dir.clone(),
            WatchedDirectory {
                path: dir.clone(),
                token,
            },
        );
        Ok(true)
    }

    /// Drop the subscription on `dir` if no registration depends on it.
    ///
    /// Returns `true` when the directory was released. The entry leaves the
    /// table even if the native unsubscribe fails; that error is returned.
    pub fn release(
        &mut self,
        dir: &CanonicalPath,
        registry: &HandlerRegistry,
        source: &mut dyn NativeSource,
    ) -> Result<bool, WatchError> {
        if !self.dirs.contains_key(dir) {
            return Ok(false);
        }
        if registry.depends_on(dir) {
            crate::debug_event!(source.name(), "still in use", "{dir}");
            return Ok(false);
        }

        if let Some(watched) = self.dirs.shift_remove(dir) {
            crate::log_event!(source.name(), "unwatching", "{dir} ({})", watched.token);
        }
        source.unsubscribe(dir.as_path())?;
        Ok(true)
    }

    pub fn is_watched(&self, dir: &CanonicalPath) -> bool {
        self.dirs.contains_key(dir)
    }

    pub fn get(&self, dir: &CanonicalPath) -> Option<&WatchedDirectory> {
        self.dirs.get(dir)
    }

    /// Watched directories in subscription order.
    pub fn directories(&self) -> impl Iterator<Item = &CanonicalPath> {
        self.dirs.keys()
    }

    pub fn len(&self) -> usize {
        self.dirs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dirs.is_empty()
    }
}

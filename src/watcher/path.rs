//! Path canonicalization and containing-directory resolution.
//!
//! Every path the multiplexer stores or looks up goes through
//! [`resolve_absolute`] first, so relative spellings of the same location
//! (`./foo`, `bar/../foo`) share one key. Cleaning is purely lexical:
//! symlinks are not followed and case is preserved.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use super::WatchError;

/// An absolute, lexically cleaned path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalPath(PathBuf);

impl CanonicalPath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }

    /// Join a single directory entry name onto this path.
    pub fn join_name(&self, name: &OsStr) -> CanonicalPath {
        CanonicalPath(clean(&self.0.join(name)))
    }

    /// The parent directory, if this is not the filesystem root.
    pub fn parent(&self) -> Option<CanonicalPath> {
        self.0.parent().map(|p| CanonicalPath(p.to_path_buf()))
    }

    /// Wrap a path that is already absolute, cleaning it.
    ///
    /// Returns `None` for relative paths.
    pub fn from_absolute(path: &Path) -> Option<CanonicalPath> {
        path.is_absolute().then(|| CanonicalPath(clean(path)))
    }
}

impl AsRef<Path> for CanonicalPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Resolve `path` against the working directory and clean it.
pub fn resolve_absolute(path: impl AsRef<Path>) -> Result<CanonicalPath, WatchError> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(WatchError::InvalidPath {
            path: path.to_path_buf(),
            reason: "empty path".to_string(),
        });
    }

    if path.is_absolute() {
        return Ok(CanonicalPath(clean(path)));
    }

    let cwd = std::env::current_dir().map_err(|e| WatchError::InvalidPath {
        path: path.to_path_buf(),
        reason: format!("cannot determine working directory: {e}"),
    })?;
    Ok(CanonicalPath(clean(&cwd.join(path))))
}

/// The directory a native watch must cover to observe `path`.
///
/// A directory is its own containing directory. Anything else (including a
/// file that does not exist yet, or was just deleted) maps to its parent, as
/// long as the parent is a directory.
pub fn containing_directory(path: &CanonicalPath) -> Result<CanonicalPath, WatchError> {
    if is_dir(path.as_path()) {
        return Ok(path.clone());
    }

    match path.parent() {
        Some(parent) if is_dir(parent.as_path()) => Ok(parent),
        Some(parent) => Err(WatchError::NotADirectory {
            path: path.as_path().to_path_buf(),
            tried: parent.into_path_buf(),
        }),
        None => Err(WatchError::NotADirectory {
            path: path.as_path().to_path_buf(),
            tried: path.as_path().to_path_buf(),
        }),
    }
}

fn is_dir(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

/// Lexically normalize a path: drop `.`, fold `..`, collapse separators.
pub fn clean(path: &Path) -> PathBuf {
    let mut components = path.components().peekable();
    let mut ret = if let Some(c @ Component::Prefix(..)) = components.peek().cloned() {
        components.next();
        PathBuf::from(c.as_os_str())
    } else {
        PathBuf::new()
    };

    for component in components {
        match component {
            Component::Prefix(..) => {}
            Component::RootDir => ret.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` above the root stays at the root; for relative paths
                // with nothing left to pop it is kept.
                if !ret.pop() && !ret.has_root() {
                    ret.push("..");
                }
            }
            Component::Normal(c) => ret.push(c),
        }
    }

    if ret.as_os_str().is_empty() {
        ret.push(".");
    }
    ret
}

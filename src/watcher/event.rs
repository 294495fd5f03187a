//! Raw native events.
//!
//! A [`RawEvent`] is what a native source reports: the watched directory, the
//! entry name inside it, and an inotify-style bitmask. Only the
//! content-bearing bits ever reach a handler.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use bitflags::bitflags;

use super::handler::EventKind;

bitflags! {
    /// Kinds of change reported by a native source.
    ///
    /// Values follow the inotify layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        const ACCESS = 0x0000_0001;
        const MODIFY = 0x0000_0002;
        const ATTRIB = 0x0000_0004;
        const CLOSE_WRITE = 0x0000_0008;
        const CLOSE_NOWRITE = 0x0000_0010;
        const OPEN = 0x0000_0020;
        const MOVED_FROM = 0x0000_0040;
        const MOVED_TO = 0x0000_0080;
        const CREATE = 0x0000_0100;
        const DELETE = 0x0000_0200;
        const DELETE_SELF = 0x0000_0400;
        const MOVE_SELF = 0x0000_0800;
        const OVERFLOW = 0x0000_4000;

        const CLOSE = Self::CLOSE_WRITE.bits() | Self::CLOSE_NOWRITE.bits();
        const CONTENT = Self::CREATE.bits()
            | Self::MODIFY.bits()
            | Self::DELETE.bits()
            | Self::DELETE_SELF.bits();
    }
}

impl EventMask {
    /// Whether any bit with content semantics is set.
    pub fn has_content(self) -> bool {
        self.intersects(EventMask::CONTENT)
    }

    /// Content kinds carried by this mask, in dispatch order.
    ///
    /// The order is fixed: created, modified, deleted.
    pub fn kinds(self) -> impl Iterator<Item = EventKind> {
        [
            (EventMask::CREATE, EventKind::Created),
            (EventMask::MODIFY, EventKind::Modified),
            (EventMask::DELETE | EventMask::DELETE_SELF, EventKind::Deleted),
        ]
        .into_iter()
        .filter(move |(bits, _)| self.intersects(*bits))
        .map(|(_, kind)| kind)
    }
}

/// One notification from a native source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// The watched directory the event was reported on.
    pub dir: PathBuf,
    /// Entry name inside `dir`; `None` when the event is about `dir` itself.
    pub name: Option<OsString>,
    pub mask: EventMask,
}

impl RawEvent {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<OsString>, mask: EventMask) -> Self {
        Self {
            dir: dir.into(),
            name: Some(name.into()),
            mask,
        }
    }

    /// An event addressed to the watched directory itself.
    pub fn on_dir(dir: impl Into<PathBuf>, mask: EventMask) -> Self {
        Self {
            dir: dir.into(),
            name: None,
            mask,
        }
    }

    /// Split a full path into directory and entry name.
    ///
    /// The filesystem root has no parent and is reported as a directory event.
    pub fn for_path(path: &Path, mask: EventMask) -> Self {
        match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) => Self::new(parent, name, mask),
            _ => Self::on_dir(path, mask),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_order_is_stable() {
        let mask = EventMask::DELETE | EventMask::MODIFY | EventMask::CREATE;
        let kinds: Vec<_> = mask.kinds().collect();
        assert_eq!(
            kinds,
            vec![EventKind::Created, EventKind::Modified, EventKind::Deleted]
        );
    }

    #[test]
    fn test_non_content_bits_filtered() {
        for mask in [
            EventMask::OPEN,
            EventMask::ACCESS,
            EventMask::CLOSE,
            EventMask::ATTRIB,
            EventMask::MOVED_FROM | EventMask::MOVED_TO,
            EventMask::OVERFLOW,
        ] {
            assert!(!mask.has_content(), "{mask:?} should carry no content");
            assert_eq!(mask.kinds().count(), 0);
        }
    }

    #[test]
    fn test_delete_self_maps_to_single_deleted() {
        let kinds: Vec<_> = (EventMask::DELETE | EventMask::DELETE_SELF).kinds().collect();
        assert_eq!(kinds, vec![EventKind::Deleted]);
    }

    #[test]
    fn test_for_path_splits() {
        let ev = RawEvent::for_path(Path::new("/tmp/x/foo"), EventMask::MODIFY);
        assert_eq!(ev.dir, PathBuf::from("/tmp/x"));
        assert_eq!(ev.name.as_deref(), Some(std::ffi::OsStr::new("foo")));

        let root = RawEvent::for_path(Path::new("/"), EventMask::DELETE_SELF);
        assert!(root.name.is_none());
    }
}

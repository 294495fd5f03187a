//! Native source backed by the `notify` crate.
//!
//! `Backend::Native` uses `notify::RecommendedWatcher` (inotify on Linux),
//! `Backend::Poll` uses `notify::PollWatcher`, and `Backend::Auto` tries the
//! native watcher first and falls back to polling.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use notify::event::{AccessKind, AccessMode, MetadataKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, PollWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use super::{NativeSource, SourceMessage, WatchToken};
use crate::config::{Backend, WatcherConfig};
use crate::watcher::error::{SourceError, WatchError};
use crate::watcher::event::{EventMask, RawEvent};

/// Native source over a `notify` watcher.
pub struct NotifySource {
    watcher: Box<dyn Watcher + Send>,
    rx: Receiver<SourceMessage>,
    subscriptions: Arc<Mutex<Subscriptions>>,
    name: &'static str,
    next_token: u64,
}

/// Directories this source watches, shared with the notify callback.
///
/// notify reports the removal of a watched directory twice with the same
/// path: once from the parent's watch and once from the directory's own.
/// Only the directory's own report may address the directory alone.
#[derive(Debug, Default)]
struct Subscriptions {
    dirs: HashSet<PathBuf>,
    // Removed directories whose parent-side report was already forwarded
    reported_to_parent: HashSet<PathBuf>,
}

impl Subscriptions {
    fn insert(&mut self, dir: &Path) {
        self.dirs.insert(dir.to_path_buf());
    }

    fn remove(&mut self, dir: &Path) {
        self.dirs.remove(dir);
        self.reported_to_parent.remove(dir);
    }

    /// Address one removal report for `path`.
    fn removal(&mut self, path: &Path) -> RawEvent {
        if !self.dirs.contains(path) {
            return RawEvent::for_path(path, EventMask::DELETE);
        }
        if self.reported_to_parent.remove(path) {
            return RawEvent::on_dir(path, EventMask::DELETE_SELF);
        }
        match path.parent() {
            Some(parent) if self.dirs.contains(parent) => {
                self.reported_to_parent.insert(path.to_path_buf());
                RawEvent::for_path(path, EventMask::DELETE)
            }
            _ => RawEvent::on_dir(path, EventMask::DELETE_SELF),
        }
    }
}

impl NotifySource {
    /// Construct the backend selected in `config`.
    pub fn from_config(config: &WatcherConfig) -> Result<Self, WatchError> {
        let interval = Duration::from_millis(config.poll_interval_ms);
        match config.backend {
            Backend::Native => Self::recommended(),
            Backend::Poll => Self::poll(interval),
            Backend::Auto => Self::recommended().or_else(|e| {
                tracing::warn!("[watcher] native backend unavailable, polling instead: {e}");
                Self::poll(interval)
            }),
        }
    }

    /// The platform's recommended watcher (inotify on Linux).
    pub fn recommended() -> Result<Self, WatchError> {
        let (tx, rx) = unbounded();
        let subscriptions = Arc::new(Mutex::new(Subscriptions::default()));
        let watcher = notify::recommended_watcher(forward_to(tx, subscriptions.clone()))?;
        Ok(Self {
            watcher: Box::new(watcher),
            rx,
            subscriptions,
            name: "native",
            next_token: 0,
        })
    }

    /// A polling watcher scanning every `interval`.
    pub fn poll(interval: Duration) -> Result<Self, WatchError> {
        let (tx, rx) = unbounded();
        let subscriptions = Arc::new(Mutex::new(Subscriptions::default()));
        let config = notify::Config::default().with_poll_interval(interval);
        let watcher = PollWatcher::new(forward_to(tx, subscriptions.clone()), config)?;
        Ok(Self {
            watcher: Box::new(watcher),
            rx,
            subscriptions,
            name: "poll",
            next_token: 0,
        })
    }
}

impl std::fmt::Debug for NotifySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifySource")
            .field("name", &self.name)
            .field("next_token", &self.next_token)
            .finish()
    }
}

impl NativeSource for NotifySource {
    fn name(&self) -> &str {
        self.name
    }

    fn subscribe(&mut self, dir: &Path) -> Result<WatchToken, WatchError> {
        // Known before the first event for it can arrive
        self.subscriptions.lock().insert(dir);
        if let Err(e) = self.watcher.watch(dir, RecursiveMode::NonRecursive) {
            self.subscriptions.lock().remove(dir);
            return Err(WatchError::Subscription {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            });
        }
        self.next_token += 1;
        Ok(WatchToken::new(self.next_token))
    }

    fn unsubscribe(&mut self, dir: &Path) -> Result<(), WatchError> {
        self.subscriptions.lock().remove(dir);
        match self.watcher.unwatch(dir) {
            Ok(()) => Ok(()),
            // The kernel drops the watch itself when the directory goes away
            Err(e) if matches!(e.kind, notify::ErrorKind::WatchNotFound) => Ok(()),
            Err(e) => Err(WatchError::Subscription {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            }),
        }
    }

    fn events(&self) -> Receiver<SourceMessage> {
        self.rx.clone()
    }
}

/// Event handler forwarding converted events into the source channel.
fn forward_to(
    tx: Sender<SourceMessage>,
    subscriptions: Arc<Mutex<Subscriptions>>,
) -> impl FnMut(notify::Result<Event>) + Send + 'static {
    move |res: notify::Result<Event>| match res {
        Ok(event) => {
            let messages = convert_event(&event, &mut subscriptions.lock());
            for message in messages {
                // Receiver gone means the source was dropped
                let _ = tx.send(message);
            }
        }
        Err(e) => {
            let _ = tx.send(Err(SourceError::recoverable(e.to_string())));
        }
    }
}

/// Translate one notify event into raw events, one per path.
fn convert_event(event: &Event, subscriptions: &mut Subscriptions) -> Vec<SourceMessage> {
    if event.need_rescan() {
        // Queue overflow: the kernel dropped events and sends no paths
        let mut messages: Vec<SourceMessage> = vec![Err(SourceError::recoverable(
            "event queue overflowed, some changes were lost",
        ))];
        messages.extend(
            event
                .paths
                .iter()
                .map(|p| Ok(RawEvent::for_path(p, EventMask::OVERFLOW))),
        );
        return messages;
    }

    let mask = mask_for(&event.kind);
    if mask.is_empty() {
        return Vec::new();
    }

    match event.kind {
        EventKind::Remove(_) => event
            .paths
            .iter()
            .map(|p| Ok(subscriptions.removal(p)))
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => vec![
            Ok(RawEvent::for_path(&event.paths[0], EventMask::MOVED_FROM)),
            Ok(RawEvent::for_path(&event.paths[1], EventMask::MOVED_TO)),
        ],
        _ => event
            .paths
            .iter()
            .map(|p| Ok(RawEvent::for_path(p, mask)))
            .collect(),
    }
}

fn mask_for(kind: &EventKind) -> EventMask {
    match kind {
        EventKind::Create(_) => EventMask::CREATE,
        EventKind::Remove(_) => EventMask::DELETE,
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Other) => {
            EventMask::MODIFY
        }
        // Polling reports content changes as a write-time change
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime)) => EventMask::MODIFY,
        EventKind::Modify(ModifyKind::Metadata(_)) => EventMask::ATTRIB,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => EventMask::MOVED_FROM,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => EventMask::MOVED_TO,
        EventKind::Modify(ModifyKind::Name(_)) => EventMask::MOVED_FROM | EventMask::MOVED_TO,
        EventKind::Access(AccessKind::Open(_)) => EventMask::OPEN,
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => EventMask::CLOSE_WRITE,
        EventKind::Access(AccessKind::Close(_)) => EventMask::CLOSE_NOWRITE,
        EventKind::Access(_) => EventMask::ACCESS,
        EventKind::Any | EventKind::Other => EventMask::empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, Flag, RemoveKind};
    use std::path::PathBuf;

    fn single(event: Event) -> RawEvent {
        let mut messages = convert_event(&event, &mut Subscriptions::default());
        assert_eq!(messages.len(), 1, "expected one message for {event:?}");
        messages.remove(0).unwrap()
    }

    #[test]
    fn test_convert_content_events() {
        let raw = single(
            Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
                .add_path(PathBuf::from("/tmp/x/foo")),
        );
        assert_eq!(raw.dir, PathBuf::from("/tmp/x"));
        assert_eq!(raw.mask, EventMask::MODIFY);

        let raw = single(
            Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/tmp/x/new")),
        );
        assert_eq!(raw.mask, EventMask::CREATE);

        let raw = single(
            Event::new(EventKind::Remove(RemoveKind::File)).add_path(PathBuf::from("/tmp/x/foo")),
        );
        assert_eq!(raw.mask, EventMask::DELETE);
    }

    #[test]
    fn test_convert_access_events_carry_no_content() {
        for kind in [
            EventKind::Access(AccessKind::Open(AccessMode::Any)),
            EventKind::Access(AccessKind::Close(AccessMode::Write)),
            EventKind::Access(AccessKind::Close(AccessMode::Read)),
            EventKind::Access(AccessKind::Read),
        ] {
            let raw = single(Event::new(kind).add_path(PathBuf::from("/tmp/x/foo")));
            assert!(!raw.mask.has_content(), "{kind:?} leaked content bits");
        }
    }

    #[test]
    fn test_convert_rename_both() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/tmp/x/a"))
            .add_path(PathBuf::from("/tmp/x/b"));
        let messages = convert_event(&event, &mut Subscriptions::default());

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].as_ref().unwrap().mask, EventMask::MOVED_FROM);
        assert_eq!(messages[1].as_ref().unwrap().mask, EventMask::MOVED_TO);
    }

    #[test]
    fn test_convert_rescan_reports_error() {
        let event = Event::new(EventKind::Other).set_flag(Flag::Rescan);
        let messages = convert_event(&event, &mut Subscriptions::default());

        assert_eq!(messages.len(), 1);
        let err = messages[0].as_ref().unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_convert_unknown_kind_dropped() {
        let event = Event::new(EventKind::Any).add_path(PathBuf::from("/tmp/x/foo"));
        assert!(convert_event(&event, &mut Subscriptions::default()).is_empty());
    }

    fn removed(path: &str) -> Event {
        Event::new(EventKind::Remove(RemoveKind::Folder)).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_removed_watched_dir_reported_once_to_parent() {
        let mut subs = Subscriptions::default();
        subs.insert(Path::new("/t"));
        subs.insert(Path::new("/t/sub"));

        // Same path twice: the parent's report, then the directory's own
        let first = convert_event(&removed("/t/sub"), &mut subs);
        let second = convert_event(&removed("/t/sub"), &mut subs);

        assert_eq!(first[0].as_ref().unwrap(), &RawEvent::new("/t", "sub", EventMask::DELETE));
        assert_eq!(
            second[0].as_ref().unwrap(),
            &RawEvent::on_dir("/t/sub", EventMask::DELETE_SELF)
        );
        assert!(subs.reported_to_parent.is_empty());
    }

    #[test]
    fn test_removed_watched_dir_without_watched_parent() {
        let mut subs = Subscriptions::default();
        subs.insert(Path::new("/t/sub"));

        let messages = convert_event(&removed("/t/sub"), &mut subs);
        assert_eq!(
            messages[0].as_ref().unwrap(),
            &RawEvent::on_dir("/t/sub", EventMask::DELETE_SELF)
        );
    }

    #[test]
    fn test_unsubscribe_forgets_pending_removal() {
        let mut subs = Subscriptions::default();
        subs.insert(Path::new("/t"));
        subs.insert(Path::new("/t/sub"));
        convert_event(&removed("/t/sub"), &mut subs);

        subs.remove(Path::new("/t/sub"));
        assert!(subs.reported_to_parent.is_empty());
        // No longer watched: a plain entry removal in the parent
        let messages = convert_event(&removed("/t/sub"), &mut subs);
        assert_eq!(messages[0].as_ref().unwrap(), &RawEvent::new("/t", "sub", EventMask::DELETE));
    }

    #[test]
    fn test_poll_source_subscribes() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut source = NotifySource::poll(Duration::from_millis(50)).unwrap();

        let token = source.subscribe(temp.path()).unwrap();
        assert_eq!(token.id(), 1);
        source.unsubscribe(temp.path()).unwrap();
        // Already gone
        source.unsubscribe(temp.path()).unwrap();
    }
}

//! Routing of raw native events to registered handlers.
//!
//! Dispatch happens in two steps. [`EventDispatcher::plan`] runs while the
//! multiplexer lock is held and turns one [`RawEvent`] into an owned list of
//! [`Invocation`]s. [`EventDispatcher::run`] executes that list after the
//! lock is released, so a handler may add or remove watches without
//! deadlocking. Such changes take effect from the next event.
//!
//! For an event on entry `name` inside watched directory `dir`:
//!
//! 1. Masks without content bits (open, close, access, attrib, moves) are
//!    dropped before any lookup.
//! 2. The affected path is `dir/name`, or `dir` itself for events on the
//!    watched directory.
//! 3. Candidates are the handlers on the affected path plus the handlers on
//!    `dir`, merged into global registration order.
//! 4. For every content kind in the mask (created, modified, deleted) and
//!    every candidate, the handler is invoked if it declares the matching
//!    capability.

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use super::event::{EventMask, RawEvent};
use super::handler::{EventKind, Handler};
use super::path::CanonicalPath;
use super::registry::{HandlerEntry, HandlerRegistry};

/// One pending handler callback.
#[derive(Clone)]
pub struct Invocation {
    pub kind: EventKind,
    pub path: CanonicalPath,
    pub handler: Arc<dyn Handler>,
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("handler", &self.handler.name())
            .finish()
    }
}

/// Turns raw events into capability-checked handler invocations.
#[derive(Debug, Clone, Default)]
pub struct EventDispatcher {
    isolate_panics: bool,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catch handler panics instead of letting them unwind into the loop.
    pub fn isolate_panics(mut self, isolate: bool) -> Self {
        self.isolate_panics = isolate;
        self
    }

    /// Compute the invocations for `event` against the current registry.
    pub fn plan(&self, event: &RawEvent, registry: &HandlerRegistry) -> Vec<Invocation> {
        if event.mask.contains(EventMask::OVERFLOW) {
            tracing::warn!("[dispatch] event queue overflow in {}", event.dir.display());
        }
        if !event.mask.has_content() {
            crate::debug_event!("dispatch", "filtered", "{:?} {}", event.mask, event.dir.display());
            return Vec::new();
        }

        let Some(dir) = CanonicalPath::from_absolute(&event.dir) else {
            tracing::warn!("[dispatch] ignoring event for relative path {}", event.dir.display());
            return Vec::new();
        };
        let affected = match &event.name {
            Some(name) => dir.join_name(name),
            None => dir.clone(),
        };

        let candidates = candidates(registry, &affected, &dir);
        if candidates.is_empty() {
            crate::debug_event!("dispatch", "unmatched", "{:?} {affected}", event.mask);
            return Vec::new();
        }

        let mut plan = Vec::new();
        for kind in event.mask.kinds() {
            for entry in &candidates {
                if entry.handler.capabilities().contains(kind.capability()) {
                    plan.push(Invocation {
                        kind,
                        path: affected.clone(),
                        handler: entry.handler.clone(),
                    });
                }
            }
        }
        plan
    }

    /// Execute planned invocations in order, one at a time.
    ///
    /// Returns the number of callbacks that completed.
    pub fn run(&self, plan: Vec<Invocation>) -> usize {
        let mut completed = 0;
        for invocation in plan {
            crate::debug_event!(
                invocation.handler.name(),
                invocation.kind.as_str(),
                "{}",
                invocation.path
            );

            if !self.isolate_panics {
                invoke(&invocation);
                completed += 1;
                continue;
            }

            match panic::catch_unwind(AssertUnwindSafe(|| invoke(&invocation))) {
                Ok(()) => completed += 1,
                Err(payload) => {
                    tracing::error!(
                        "[{}] handler panicked on {} {}: {}",
                        invocation.handler.name(),
                        invocation.kind,
                        invocation.path,
                        panic_message(payload.as_ref())
                    );
                }
            }
        }
        completed
    }
}

/// Entries for `affected` and, when distinct, for `dir`, in registration order.
fn candidates<'a>(
    registry: &'a HandlerRegistry,
    affected: &CanonicalPath,
    dir: &CanonicalPath,
) -> Vec<&'a HandlerEntry> {
    let mut entries: Vec<&HandlerEntry> = registry.entries_for(affected).iter().collect();
    if affected != dir {
        entries.extend(registry.entries_for(dir));
        entries.sort_by_key(|entry| entry.seq());
    }
    entries
}

fn invoke(invocation: &Invocation) {
    let path: &Path = invocation.path.as_path();
    match invocation.kind {
        EventKind::Created => invocation.handler.created(path),
        EventKind::Modified => invocation.handler.modified(path),
        EventKind::Deleted => invocation.handler.deleted(path),
        // Never planned
        EventKind::Moved => {}
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::handler::FnHandler;
    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn canon(p: &str) -> CanonicalPath {
        CanonicalPath::from_absolute(Path::new(p)).unwrap()
    }

    fn recording(name: &str, log: &Log) -> Arc<dyn Handler> {
        let (m, c, d) = (log.clone(), log.clone(), log.clone());
        let (nm, nc, nd) = (name.to_string(), name.to_string(), name.to_string());
        Arc::new(
            FnHandler::new(name)
                .on_modified(move |p| m.lock().push(format!("{nm} modified {}", p.display())))
                .on_created(move |p| c.lock().push(format!("{nc} created {}", p.display())))
                .on_deleted(move |p| d.lock().push(format!("{nd} deleted {}", p.display()))),
        )
    }

    fn setup() -> (HandlerRegistry, Log) {
        (HandlerRegistry::new(), Arc::new(Mutex::new(Vec::new())))
    }

    #[test]
    fn test_multiple_handlers_in_registration_order() {
        let (mut registry, log) = setup();
        let file = canon("/tmp/x/foo");
        let dir = canon("/tmp/x");
        registry.register(file.clone(), dir.clone(), recording("first", &log));
        registry.register(file.clone(), dir.clone(), recording("second", &log));

        let dispatcher = EventDispatcher::new();
        let plan = dispatcher.plan(&RawEvent::new("/tmp/x", "foo", EventMask::MODIFY), &registry);
        assert_eq!(dispatcher.run(plan), 2);

        assert_eq!(
            *log.lock(),
            vec!["first modified /tmp/x/foo", "second modified /tmp/x/foo"]
        );
    }

    #[test]
    fn test_directory_handler_sees_children() {
        let (mut registry, log) = setup();
        let dir = canon("/tmp/x");
        registry.register(dir.clone(), dir.clone(), recording("dir", &log));

        let dispatcher = EventDispatcher::new();
        let plan = dispatcher.plan(&RawEvent::new("/tmp/x", "new.txt", EventMask::CREATE), &registry);
        dispatcher.run(plan);

        assert_eq!(*log.lock(), vec!["dir created /tmp/x/new.txt"]);
    }

    #[test]
    fn test_candidates_merge_by_registration_order() {
        let (mut registry, log) = setup();
        let dir = canon("/tmp/x");
        let file = canon("/tmp/x/foo");
        registry.register(dir.clone(), dir.clone(), recording("dir", &log));
        registry.register(file.clone(), dir.clone(), recording("file", &log));

        let dispatcher = EventDispatcher::new();
        let plan = dispatcher.plan(&RawEvent::new("/tmp/x", "foo", EventMask::MODIFY), &registry);
        let names: Vec<_> = plan.iter().map(|i| i.handler.name().to_string()).collect();
        assert_eq!(names, vec!["dir", "file"]);
    }

    #[test]
    fn test_sibling_file_not_delivered() {
        let (mut registry, log) = setup();
        registry.register(canon("/tmp/x/foo"), canon("/tmp/x"), recording("foo", &log));

        let plan = EventDispatcher::new()
            .plan(&RawEvent::new("/tmp/x", "bar", EventMask::MODIFY), &registry);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_capability_mismatch_skipped() {
        let (mut registry, log) = setup();
        let deleted_only = log.clone();
        registry.register(
            canon("/tmp/x/foo"),
            canon("/tmp/x"),
            Arc::new(
                FnHandler::new("deletes")
                    .on_deleted(move |p| deleted_only.lock().push(format!("deleted {}", p.display()))),
            ),
        );

        let dispatcher = EventDispatcher::new();
        let plan = dispatcher.plan(&RawEvent::new("/tmp/x", "foo", EventMask::MODIFY), &registry);
        assert!(plan.is_empty());

        let plan = dispatcher.plan(&RawEvent::new("/tmp/x", "foo", EventMask::DELETE), &registry);
        dispatcher.run(plan);
        assert_eq!(*log.lock(), vec!["deleted /tmp/x/foo"]);
    }

    #[test]
    fn test_non_content_events_never_dispatched() {
        let (mut registry, log) = setup();
        registry.register(canon("/tmp/x/foo"), canon("/tmp/x"), recording("h", &log));

        let dispatcher = EventDispatcher::new();
        for mask in [
            EventMask::OPEN,
            EventMask::ACCESS,
            EventMask::CLOSE_WRITE,
            EventMask::CLOSE_NOWRITE,
            EventMask::MOVED_FROM,
        ] {
            let plan = dispatcher.plan(&RawEvent::new("/tmp/x", "foo", mask), &registry);
            assert!(plan.is_empty(), "{mask:?} reached a handler");
        }
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_multiple_bits_kind_major_order() {
        let (mut registry, log) = setup();
        let file = canon("/tmp/x/foo");
        let dir = canon("/tmp/x");
        registry.register(file.clone(), dir.clone(), recording("a", &log));
        registry.register(file.clone(), dir.clone(), recording("b", &log));

        let dispatcher = EventDispatcher::new();
        let mask = EventMask::MODIFY | EventMask::CREATE | EventMask::OPEN;
        dispatcher.run(dispatcher.plan(&RawEvent::new("/tmp/x", "foo", mask), &registry));

        assert_eq!(
            *log.lock(),
            vec![
                "a created /tmp/x/foo",
                "b created /tmp/x/foo",
                "a modified /tmp/x/foo",
                "b modified /tmp/x/foo",
            ]
        );
    }

    #[test]
    fn test_event_on_directory_itself() {
        let (mut registry, log) = setup();
        let dir = canon("/tmp/x");
        registry.register(dir.clone(), dir.clone(), recording("dir", &log));

        let dispatcher = EventDispatcher::new();
        dispatcher.run(dispatcher.plan(&RawEvent::on_dir("/tmp/x", EventMask::DELETE_SELF), &registry));

        // Registered once, delivered once
        assert_eq!(*log.lock(), vec!["dir deleted /tmp/x"]);
    }

    #[test]
    fn test_isolated_panic_does_not_stop_dispatch() {
        let (mut registry, log) = setup();
        let file = canon("/tmp/x/foo");
        let dir = canon("/tmp/x");
        registry.register(
            file.clone(),
            dir.clone(),
            Arc::new(FnHandler::new("boom").on_modified(|_| panic!("handler failure"))),
        );
        registry.register(file.clone(), dir.clone(), recording("after", &log));

        let dispatcher = EventDispatcher::new().isolate_panics(true);
        let plan = dispatcher.plan(&RawEvent::new("/tmp/x", "foo", EventMask::MODIFY), &registry);
        assert_eq!(dispatcher.run(plan), 1);
        assert_eq!(*log.lock(), vec!["after modified /tmp/x/foo"]);
    }

    #[test]
    #[should_panic(expected = "handler failure")]
    fn test_panic_propagates_by_default() {
        let (mut registry, _log) = setup();
        registry.register(
            canon("/tmp/x/foo"),
            canon("/tmp/x"),
            Arc::new(FnHandler::new("boom").on_modified(|_| panic!("handler failure"))),
        );

        let dispatcher = EventDispatcher::new();
        let plan = dispatcher.plan(&RawEvent::new("/tmp/x", "foo", EventMask::MODIFY), &registry);
        dispatcher.run(plan);
    }
}

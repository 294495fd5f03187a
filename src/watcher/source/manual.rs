//! In-process source fed by hand.
//!
//! Does not touch the OS. Events are injected through a [`ManualFeed`] and
//! subscription calls are recorded, which makes multiplexer behaviour
//! deterministic to test. It can also front a notifier the crate does not
//! know about.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

use super::{NativeSource, SourceMessage, WatchToken};
use crate::watcher::error::{SourceError, WatchError};
use crate::watcher::event::RawEvent;

#[derive(Debug, Default)]
struct ManualState {
    watched: HashSet<PathBuf>,
    subscribe_calls: Vec<PathBuf>,
    unsubscribe_calls: Vec<PathBuf>,
    failing: HashSet<PathBuf>,
    failing_unsubscribe: HashSet<PathBuf>,
    next_token: u64,
}

/// Deterministic native source.
#[derive(Debug)]
pub struct ManualSource {
    rx: Receiver<SourceMessage>,
    feed: ManualFeed,
}

/// Cloneable handle for injecting events into, and inspecting, a
/// [`ManualSource`].
#[derive(Debug, Clone)]
pub struct ManualFeed {
    tx: Arc<Mutex<Option<Sender<SourceMessage>>>>,
    state: Arc<Mutex<ManualState>>,
}

impl Default for ManualSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualSource {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            rx,
            feed: ManualFeed {
                tx: Arc::new(Mutex::new(Some(tx))),
                state: Arc::new(Mutex::new(ManualState::default())),
            },
        }
    }

    /// A handle that stays usable after the source is moved into a
    /// multiplexer.
    pub fn feed(&self) -> ManualFeed {
        self.feed.clone()
    }
}

impl ManualFeed {
    /// Inject a raw event. Returns `false` once the stream is closed.
    pub fn push(&self, event: RawEvent) -> bool {
        self.send(Ok(event))
    }

    /// Inject an asynchronous source error.
    pub fn push_error(&self, error: SourceError) -> bool {
        self.send(Err(error))
    }

    /// Disconnect the event stream, as an unrecoverable close would.
    pub fn close(&self) {
        self.tx.lock().take();
    }

    /// Make future subscriptions of `dir` fail.
    pub fn fail_subscriptions_for(&self, dir: impl Into<PathBuf>) {
        self.state.lock().failing.insert(dir.into());
    }

    /// Make future unsubscriptions of `dir` fail; the watch stays in place.
    pub fn fail_unsubscriptions_for(&self, dir: impl Into<PathBuf>) {
        self.state.lock().failing_unsubscribe.insert(dir.into());
    }

    /// Currently subscribed directories, sorted.
    pub fn watched(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<_> = self.state.lock().watched.iter().cloned().collect();
        dirs.sort();
        dirs
    }

    pub fn is_watched(&self, dir: impl AsRef<Path>) -> bool {
        self.state.lock().watched.contains(dir.as_ref())
    }

    /// Directories passed to `subscribe`, in call order.
    pub fn subscribe_calls(&self) -> Vec<PathBuf> {
        self.state.lock().subscribe_calls.clone()
    }

    /// Directories passed to `unsubscribe`, in call order.
    pub fn unsubscribe_calls(&self) -> Vec<PathBuf> {
        self.state.lock().unsubscribe_calls.clone()
    }

    fn send(&self, message: SourceMessage) -> bool {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }
}

impl NativeSource for ManualSource {
    fn name(&self) -> &str {
        "manual"
    }

    fn subscribe(&mut self, dir: &Path) -> Result<WatchToken, WatchError> {
        let mut state = self.feed.state.lock();
        state.subscribe_calls.push(dir.to_path_buf());

        if state.failing.contains(dir) {
            return Err(WatchError::Subscription {
                path: dir.to_path_buf(),
                reason: "subscription refused".to_string(),
            });
        }

        state.watched.insert(dir.to_path_buf());
        state.next_token += 1;
        Ok(WatchToken::new(state.next_token))
    }

    fn unsubscribe(&mut self, dir: &Path) -> Result<(), WatchError> {
        let mut state = self.feed.state.lock();
        state.unsubscribe_calls.push(dir.to_path_buf());

        if state.failing_unsubscribe.contains(dir) {
            return Err(WatchError::Subscription {
                path: dir.to_path_buf(),
                reason: "unsubscribe refused".to_string(),
            });
        }

        state.watched.remove(dir);
        Ok(())
    }

    fn events(&self) -> Receiver<SourceMessage> {
        self.rx.clone()
    }
}

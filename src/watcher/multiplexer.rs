//! Watch multiplexer: many logical registrations over shared directory watches.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, select};
use parking_lot::Mutex;

use crate::config::{Backend, WatcherConfig};

use super::directory_table::DirectoryWatchTable;
use super::dispatcher::EventDispatcher;
use super::error::WatchError;
use super::event::RawEvent;
use super::handler::Handler;
use super::path::{CanonicalPath, containing_directory, resolve_absolute};
use super::registry::HandlerRegistry;
use super::source::{NativeSource, NotifySource, SourceMessage};

/// Shared mutable state, guarded by one lock.
struct State<S> {
    registry: HandlerRegistry,
    table: DirectoryWatchTable,
    source: S,
    closed: bool,
}

/// Multiplexes per-path handler registrations onto directory-level native
/// watches and dispatches native events to them.
///
/// `add_watch` and `remove_watches` may be called from any thread while
/// another thread is blocked in [`watch`](Self::watch).
pub struct WatchMultiplexer<S: NativeSource = NotifySource> {
    state: Mutex<State<S>>,
    events: Receiver<SourceMessage>,
    dispatcher: EventDispatcher,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
    watching: AtomicBool,
}

/// Requests that a running [`WatchMultiplexer::watch`] loop return.
///
/// A stop requested while no loop is running makes the next loop return
/// immediately.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Sender<()>,
}

impl StopHandle {
    pub fn stop(&self) {
        // A pending stop is already queued when the slot is full
        let _ = self.tx.try_send(());
    }
}

impl WatchMultiplexer<NotifySource> {
    /// A multiplexer on the first available native backend.
    pub fn new() -> Result<Self, WatchError> {
        Self::from_config(&WatcherConfig::default())
    }

    /// A multiplexer built from watcher settings.
    pub fn from_config(config: &WatcherConfig) -> Result<Self, WatchError> {
        let source = NotifySource::from_config(config)?;
        Ok(Self::with_source(source).isolate_handler_panics(config.isolate_handler_panics))
    }

    /// Create a builder for configuring the multiplexer.
    pub fn builder() -> WatchMultiplexerBuilder {
        WatchMultiplexerBuilder::new()
    }
}

impl<S: NativeSource> WatchMultiplexer<S> {
    /// A multiplexer over an explicit native source.
    pub fn with_source(source: S) -> Self {
        let events = source.events();
        let (stop_tx, stop_rx) = bounded(1);
        Self {
            state: Mutex::new(State {
                registry: HandlerRegistry::new(),
                table: DirectoryWatchTable::new(),
                source,
                closed: false,
            }),
            events,
            dispatcher: EventDispatcher::new(),
            stop_tx,
            stop_rx,
            watching: AtomicBool::new(false),
        }
    }

    /// Catch handler panics, log them, and keep dispatching.
    ///
    /// Off by default: a panicking handler unwinds out of `watch`.
    pub fn isolate_handler_panics(mut self, isolate: bool) -> Self {
        self.dispatcher = self.dispatcher.isolate_panics(isolate);
        self
    }

    /// Register `handler` for events on `path`.
    ///
    /// `path` may be a file (existing or not) or a directory. A directory
    /// registration also observes events on the directory's immediate
    /// entries.
    pub fn add_watch<H: Handler + 'static>(
        &self,
        path: impl AsRef<Path>,
        handler: H,
    ) -> Result<(), WatchError> {
        self.add_shared_watch(path, Arc::new(handler))
    }

    /// Register a shared handler, e.g. one handler on several paths.
    pub fn add_shared_watch(
        &self,
        path: impl AsRef<Path>,
        handler: Arc<dyn Handler>,
    ) -> Result<(), WatchError> {
        let path = resolve_absolute(path)?;
        let dir = containing_directory(&path)?;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.closed {
            return Err(WatchError::Closed);
        }

        state.table.ensure_watched(&dir, &mut state.source)?;
        let seq = state.registry.register(path.clone(), dir, handler.clone());
        crate::debug_event!("watcher", "registered", "{} on {path} (#{seq})", handler.name());
        Ok(())
    }

    /// Remove every handler registered on `path`.
    ///
    /// The native watch on the containing directory is released once nothing
    /// else depends on it. Removing an unregistered path is not an error.
    pub fn remove_watches(&self, path: impl AsRef<Path>) -> Result<(), WatchError> {
        let path = resolve_absolute(path)?;

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.closed {
            return Err(WatchError::Closed);
        }

        let removed = state.registry.unregister_all(&path);
        let mut dirs: Vec<CanonicalPath> = Vec::new();
        for entry in &removed {
            if !dirs.contains(&entry.dir) {
                dirs.push(entry.dir.clone());
            }
        }

        if removed.is_empty() {
            // Nothing registered; still release a watch left behind for
            // this directory, if any.
            match containing_directory(&path) {
                Ok(dir) => dirs.push(dir),
                Err(_) => return Ok(()),
            }
        } else {
            crate::debug_event!("watcher", "unregistered", "{} from {path}", removed.len());
        }

        // Release every directory even if one fails; report the first error
        let mut first_err = None;
        for dir in &dirs {
            if let Err(e) = state.table.release(dir, &state.registry, &mut state.source) {
                tracing::warn!("[watcher] failed to release {dir}: {e}");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Block, dispatching native events to handlers.
    ///
    /// Returns `Ok(())` after a stop request. A fatal source error, or the
    /// source stream closing, closes the multiplexer and is returned; the
    /// owner must build a new one.
    pub fn watch(&self) -> Result<(), WatchError> {
        if self.watching.swap(true, Ordering::SeqCst) {
            return Err(WatchError::AlreadyWatching);
        }
        let result = self.run_loop();
        self.watching.store(false, Ordering::SeqCst);
        result
    }

    fn run_loop(&self) -> Result<(), WatchError> {
        if self.state.lock().closed {
            return Err(WatchError::Closed);
        }
        crate::log_event!("watcher", "started");

        loop {
            select! {
                recv(self.events) -> message => match message {
                    Ok(Ok(event)) => {
                        self.dispatch(&event);
                    }
                    Ok(Err(e)) if e.is_fatal() => {
                        tracing::error!("[watcher] fatal source error: {e}");
                        self.close();
                        return Err(WatchError::Source(e));
                    }
                    Ok(Err(e)) => {
                        tracing::warn!("[watcher] source error: {e}");
                    }
                    Err(_) => {
                        tracing::error!("[watcher] event source closed");
                        self.close();
                        return Err(WatchError::SourceClosed);
                    }
                },
                recv(self.stop_rx) -> _ => {
                    crate::log_event!("watcher", "stopped");
                    return Ok(());
                }
            }
        }
    }

    /// Wait up to `timeout` for one event and dispatch it.
    ///
    /// Returns `Ok(true)` if an event or non-fatal error was consumed,
    /// `Ok(false)` on timeout. Fatal errors close the multiplexer.
    pub fn poll_once(&self, timeout: Duration) -> Result<bool, WatchError> {
        if self.state.lock().closed {
            return Err(WatchError::Closed);
        }
        match self.events.recv_timeout(timeout) {
            Ok(Ok(event)) => {
                self.dispatch(&event);
                Ok(true)
            }
            Ok(Err(e)) if e.is_fatal() => {
                self.close();
                Err(WatchError::Source(e))
            }
            Ok(Err(e)) => {
                tracing::warn!("[watcher] source error: {e}");
                Ok(true)
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Ok(false),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                self.close();
                Err(WatchError::SourceClosed)
            }
        }
    }

    /// Dispatch one raw event.
    ///
    /// Handlers run after the state lock is released.
    pub fn dispatch(&self, event: &RawEvent) -> usize {
        let plan = {
            let state = self.state.lock();
            self.dispatcher.plan(event, &state.registry)
        };
        self.dispatcher.run(plan)
    }

    /// A handle for stopping the watch loop from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            tx: self.stop_tx.clone(),
        }
    }

    fn close(&self) {
        self.state.lock().closed = true;
    }

    /// Whether a fatal source failure has made this multiplexer unusable.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Whether `dir` currently has a native watch.
    pub fn is_watching_dir(&self, dir: impl AsRef<Path>) -> bool {
        match resolve_absolute(dir) {
            Ok(dir) => self.state.lock().table.is_watched(&dir),
            Err(_) => false,
        }
    }

    /// Directories with a native watch, in subscription order.
    pub fn watched_directories(&self) -> Vec<PathBuf> {
        self.state
            .lock()
            .table
            .directories()
            .map(|d| d.as_path().to_path_buf())
            .collect()
    }

    /// Paths with at least one handler, in first-registration order.
    pub fn registered_paths(&self) -> Vec<PathBuf> {
        self.state
            .lock()
            .registry
            .paths()
            .map(|p| p.as_path().to_path_buf())
            .collect()
    }

    /// Total number of handler registrations.
    pub fn handler_count(&self) -> usize {
        self.state.lock().registry.len()
    }

    /// Name of the native source in use.
    pub fn source_name(&self) -> String {
        self.state.lock().source.name().to_string()
    }
}

/// Builder for a notify-backed [`WatchMultiplexer`].
#[derive(Debug, Clone, Default)]
pub struct WatchMultiplexerBuilder {
    config: WatcherConfig,
}

impl WatchMultiplexerBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing watcher settings.
    pub fn config(mut self, config: WatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Select the native backend.
    pub fn backend(mut self, backend: Backend) -> Self {
        self.config.backend = backend;
        self
    }

    /// Set the scan interval used by the polling backend.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Catch handler panics instead of stopping the loop.
    pub fn isolate_handler_panics(mut self, isolate: bool) -> Self {
        self.config.isolate_handler_panics = isolate;
        self
    }

    /// Build the multiplexer.
    pub fn build(self) -> Result<WatchMultiplexer, WatchError> {
        WatchMultiplexer::from_config(&self.config)
    }
}

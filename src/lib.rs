//! Multiplexed filesystem change notifications.
//!
//! Many independent handlers register interest in files or directories;
//! the crate shares one non-recursive native watch per directory between
//! them and routes each kernel notification to the handlers that asked for
//! it, checked against the event kinds each handler declares.
//!
//! ```no_run
//! use fsmux::{FnHandler, WatchMultiplexer};
//!
//! let mux = WatchMultiplexer::new()?;
//! mux.add_watch(
//!     "Cargo.toml",
//!     FnHandler::new("cargo").on_modified(|path| println!("{} changed", path.display())),
//! )?;
//! mux.watch()?;
//! # Ok::<(), fsmux::WatchError>(())
//! ```

pub mod cli;
pub mod config;
pub mod logging;
pub mod watcher;

pub use config::{Backend, LoggingConfig, Settings, WatcherConfig};
pub use watcher::{
    Capabilities, EventKind, EventMask, FnHandler, Handler, ManualFeed, ManualSource,
    NativeSource, NotifySource, RawEvent, SourceError, StopHandle, WatchError, WatchMultiplexer,
    WatchMultiplexerBuilder,
};

//! Watch multiplexing and event dispatch.
//!
//! Callers register handlers on arbitrary file or directory paths. Native
//! watches are only ever taken on directories and are shared by every
//! registration inside them; raw events are routed back to the handlers
//! registered on the affected entry and on its directory.
//!
//! # Architecture
//!
//! ```text
//! WatchMultiplexer
//!   - one lock over:
//!       HandlerRegistry      path -> [handler, ...]
//!       DirectoryWatchTable  dir  -> native subscription
//!       NativeSource         subscribe / unsubscribe
//!   - event stream (crossbeam) from the NativeSource
//!         |
//!    EventDispatcher
//!      filter -> affected path -> candidates -> capability check
//!         |
//!    Handler::created / modified / deleted
//! ```

mod directory_table;
mod dispatcher;
mod error;
mod event;
mod handler;
mod multiplexer;
pub mod path;
mod registry;
pub mod source;

pub use directory_table::{DirectoryWatchTable, WatchedDirectory};
pub use dispatcher::{EventDispatcher, Invocation};
pub use error::{SourceError, WatchError};
pub use event::{EventMask, RawEvent};
pub use handler::{Capabilities, EventKind, FnHandler, Handler};
pub use multiplexer::{StopHandle, WatchMultiplexer, WatchMultiplexerBuilder};
pub use path::CanonicalPath;
pub use registry::{HandlerEntry, HandlerRegistry};
pub use source::{ManualFeed, ManualSource, NativeSource, NotifySource, SourceMessage, WatchToken};

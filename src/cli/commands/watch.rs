//! Watch command: print change events for the given paths.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{Backend, WatcherConfig};
use crate::watcher::{Capabilities, EventKind, Handler, WatchMultiplexer};

/// Handler printing one line per event to stdout.
#[derive(Debug, Default)]
pub struct PrintHandler;

impl PrintHandler {
    fn print(&self, kind: EventKind, path: &Path) {
        let mut stdout = std::io::stdout().lock();
        // Closed stdout (e.g. piped into `head`) is not worth failing over
        let _ = writeln!(stdout, "{kind} {}", path.display());
        let _ = stdout.flush();
    }
}

impl Handler for PrintHandler {
    fn name(&self) -> &str {
        "print"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::CREATED | Capabilities::MODIFIED | Capabilities::DELETED
    }

    fn modified(&self, path: &Path) {
        self.print(EventKind::Modified, path);
    }

    fn created(&self, path: &Path) {
        self.print(EventKind::Created, path);
    }

    fn deleted(&self, path: &Path) {
        self.print(EventKind::Deleted, path);
    }
}

/// Run watch command - register every path and block on the event loop.
pub fn run(
    paths: &[PathBuf],
    backend: Option<Backend>,
    isolate_panics: bool,
    config: &WatcherConfig,
) -> anyhow::Result<()> {
    let mut config = config.clone();
    if let Some(backend) = backend {
        config.backend = backend;
    }
    if isolate_panics {
        config.isolate_handler_panics = true;
    }

    let mux = WatchMultiplexer::from_config(&config)?;
    let handler: Arc<dyn Handler> = Arc::new(PrintHandler);

    for path in paths {
        mux.add_shared_watch(path, handler.clone())?;
    }

    eprintln!(
        "Watching {} path(s) in {} directories ({} backend)",
        paths.len(),
        mux.watched_directories().len(),
        mux.source_name()
    );

    mux.watch()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_handler_capabilities() {
        let caps = PrintHandler.capabilities();
        assert!(caps.contains(Capabilities::MODIFIED | Capabilities::CREATED | Capabilities::DELETED));
        assert!(!caps.contains(Capabilities::MOVED));
    }

    #[test]
    fn test_run_rejects_unresolvable_path() {
        let temp = tempfile::TempDir::new().unwrap();
        let missing = temp.path().join("missing/dir/file.txt");
        let config = WatcherConfig {
            backend: Backend::Poll,
            ..WatcherConfig::default()
        };

        let err = run(&[missing], None, false, &config).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}

//! Diagnostics for the multiplexer and the `fsmux` binary.
//!
//! Subscriptions, releases, source errors and caught handler panics are
//! reported through `tracing` under `[component]` prefixes. Output goes to
//! stderr; stdout stays reserved for the `watch` command's event lines.
//!
//! Levels come from the `[logging]` table of the settings file:
//!
//! ```toml
//! [logging]
//! default = "warn"
//!
//! [logging.modules]
//! "fsmux::watcher" = "debug"
//! ```
//!
//! A set `RUST_LOG` replaces the table entirely, e.g.
//! `RUST_LOG=fsmux::watcher=trace fsmux watch Cargo.toml`.

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Wall-clock `HH:MM:SS.mmm`; watch sessions rarely span days.
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// `default[,module=level...]`, modules sorted.
fn filter_directives(config: &LoggingConfig) -> String {
    let mut modules: Vec<_> = config.modules.iter().collect();
    modules.sort();

    modules
        .into_iter()
        .fold(config.default.clone(), |mut directives, (module, level)| {
            directives.push(',');
            directives.push_str(module);
            directives.push('=');
            directives.push_str(level);
            directives
        })
}

/// Install the global subscriber for `config`.
///
/// Only the first call in a process has any effect.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = match std::env::var_os("RUST_LOG") {
            Some(_) => EnvFilter::from_default_env(),
            None => EnvFilter::new(filter_directives(config)),
        };

        let stderr = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_timer(CompactTime)
            .with_filter(filter);

        tracing_subscriber::registry().with(stderr).init();
    });
}

/// [`init_with_config`] with warnings only.
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Info-level `[component] event: detail` line.
///
/// ```ignore
/// log_event!(source.name(), "watching", "{dir} ({token})");
/// ```
#[macro_export]
macro_rules! log_event {
    ($handler:expr, $event:expr) => {
        tracing::info!("[{}] {}", $handler, $event)
    };
    ($handler:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $handler, $event, format!($($arg)*))
    };
}

/// Debug-level counterpart of [`log_event!`].
#[macro_export]
macro_rules! debug_event {
    ($handler:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $handler, $event)
    };
    ($handler:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $handler, $event, format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_filter_directives() {
        let config = LoggingConfig {
            default: "info".to_string(),
            modules: HashMap::from([
                ("fsmux::watcher".to_string(), "debug".to_string()),
                ("fsmux::cli".to_string(), "trace".to_string()),
            ]),
        };

        assert_eq!(
            filter_directives(&config),
            "info,fsmux::cli=trace,fsmux::watcher=debug"
        );
        assert_eq!(filter_directives(&LoggingConfig::default()), "warn");
    }
}

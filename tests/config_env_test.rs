use fsmux::{Backend, Settings};
use std::env;
use std::fs;
use tempfile::TempDir;

// Single test in this binary: it mutates the process environment.
#[test]
fn test_env_overrides_file_values() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("settings.toml");
    fs::write(
        &config_path,
        "[watcher]\nbackend = \"native\"\npoll_interval_ms = 750\n",
    )
    .unwrap();

    unsafe {
        // Double underscore separates nested levels
        env::set_var("FSMUX_WATCHER__BACKEND", "poll");
        env::set_var("FSMUX_WATCHER__ISOLATE_HANDLER_PANICS", "true");
        env::set_var("FSMUX_LOGGING__DEFAULT", "debug");
    }

    let settings = Settings::load_from(&config_path);

    unsafe {
        env::remove_var("FSMUX_WATCHER__BACKEND");
        env::remove_var("FSMUX_WATCHER__ISOLATE_HANDLER_PANICS");
        env::remove_var("FSMUX_LOGGING__DEFAULT");
    }

    let settings = settings.unwrap();
    assert_eq!(settings.watcher.backend, Backend::Poll);
    assert!(settings.watcher.isolate_handler_panics);
    assert_eq!(settings.logging.default, "debug");
    // Untouched by the environment
    assert_eq!(settings.watcher.poll_interval_ms, 750);
}

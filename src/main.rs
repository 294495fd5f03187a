use clap::Parser;
use fsmux::Settings;
use fsmux::cli::commands;
use fsmux::cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        eprintln!("Using default configuration for now.");
        Settings::default()
    });

    fsmux::logging::init_with_config(&settings.logging);

    match &cli.command {
        Commands::Init { force } => commands::init::run_init(*force),
        Commands::Config => commands::init::run_config(&settings),
        Commands::Watch {
            paths,
            backend,
            isolate_panics,
        } => commands::watch::run(paths, *backend, *isolate_panics, &settings.watcher),
    }
}

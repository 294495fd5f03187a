//! CLI argument parsing using clap.
//!
//! Contains the Cli struct and Commands enum.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

use crate::config::Backend;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Multiplexed filesystem change notifications
#[derive(Parser, Debug)]
#[command(
    name = "fsmux",
    version = env!("CARGO_PKG_VERSION"),
    about = "Watch files and directories for changes",
    long_about = "Register files and directories and print created, modified and deleted events.",
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize project
    #[command(about = "Set up .fsmux directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Watch paths and print events
    #[command(
        about = "Watch files or directories and print change events",
        after_help = "Examples:\n  fsmux watch Cargo.toml\n  fsmux watch src tests --backend poll\n\nOutput:\n  created <path>\n  modified <path>\n  deleted <path>"
    )]
    Watch {
        /// Files or directories to watch (multiple paths allowed)
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,

        /// Native backend (overrides config)
        #[arg(short, long, value_enum)]
        backend: Option<Backend>,

        /// Keep watching when a handler panics (overrides config)
        #[arg(long)]
        isolate_panics: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings from .fsmux/settings.toml")]
    Config,
}

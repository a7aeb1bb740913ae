// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::ConfigOverrides;
use crate::types::ExecutionMode;

/// Command-line arguments for `nprsched`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "nprsched",
    version,
    about = "Schedule the tasks and jobs of phylogenetic NPR pipelines under a core budget.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Nprsched.toml")]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `NPRSCHED_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print threads and templates, but run nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Override `[config].max_cores`.
    #[arg(long, value_name = "N")]
    pub max_cores: Option<u32>,

    /// Override `[config].execution` (local, detached, sge).
    #[arg(long, value_name = "MODE")]
    pub execution: Option<ExecutionMode>,

    /// Skip rendering the final tree image.
    #[arg(long)]
    pub no_render: bool,

    /// Show a menu on Ctrl-C instead of quitting right away.
    #[arg(long)]
    pub interactive: bool,

    /// Switch to debug output once a task whose id starts with PREFIX shows up.
    #[arg(long, value_name = "PREFIX")]
    pub debug_task: Option<String>,
}

impl CliArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            max_cores: self.max_cores,
            execution: self.execution,
            no_render: self.no_render,
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

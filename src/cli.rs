// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `flowdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "flowdag",
    version,
    about = "Build and run job graphs with dynamic expansion.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Flowdag.toml` in the current working directory. A missing
    /// file means built-in defaults.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Which demo flow to build and run.
    #[arg(long, value_enum, value_name = "NAME", default_value = "chain")]
    pub demo: DemoKind,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FLOWDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Build + validate, print the graph, but don't execute any job.
    #[arg(long)]
    pub dry_run: bool,
}

/// Demo flows shipped with the binary.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum DemoKind {
    /// Two-job chain: a value and its double.
    Chain,
    /// Threshold screening over three scored candidates.
    Screening,
    /// High-throughput thermoelectric ZT screening.
    Zt,
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

//! autobuild — rebuild and redeploy services when their git branch moves.
//!
//! # Usage
//!
//! ```text
//! autobuild [--config <path>] run [--once]
//! autobuild [--config <path>] build <name> [--force]
//! autobuild [--config <path>] status [--json]
//! autobuild [--config <path>] check
//! ```
//!
//! With no subcommand, `run` is assumed.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use autobuild_core::config::DEFAULT_CONFIG_FILE;
use commands::{build::BuildArgs, check::CheckArgs, run::RunArgs, status::StatusArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "autobuild",
    version,
    about = "Watch git repositories, rebuild on new commits and publish the result",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(
        long,
        short = 'c',
        global = true,
        env = "AUTOBUILD_CONFIG",
        default_value = DEFAULT_CONFIG_FILE
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll every configured repository on an interval (the default).
    Run(RunArgs),

    /// Sync and build a single repository once.
    Build(BuildArgs),

    /// Show clone and last-built state for every repository.
    Status(StatusArgs),

    /// Validate the configuration file and print a summary.
    Check(CheckArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config;
    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => args.run(&config),
        Commands::Build(args) => args.run(&config),
        Commands::Status(args) => args.run(&config),
        Commands::Check(args) => args.run(&config),
    }
}

//! Binary entry point for redsweep.
//!
//! This binary provides the CLI interface for retention cleanup.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

mod commands;

use clap::{Parser, Subcommand};
use redsweep::config::SweepConfig;
use redsweep::observability::{self, InitOptions};
use std::path::PathBuf;
use std::process::ExitCode;

/// Redsweep - retention-policy cleanup for Reddit comments and posts.
#[derive(Parser)]
#[command(name = "redsweep")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Unattended cleanup with the configured policy (scheduled jobs).
    Run {
        /// Show what would be deleted without changing anything.
        #[arg(long)]
        dry_run: bool,

        /// Retention rule, overriding the configured one.
        #[arg(long)]
        rule: Option<String>,

        /// Age threshold in days, overriding the configured one.
        #[arg(long)]
        days: Option<u32>,

        /// Kinds to process (comma-separated: comments, posts).
        #[arg(long)]
        kinds: Option<String>,

        /// Stop each listing at the age cutoff (stale-only rule only).
        #[arg(long)]
        cutoff: bool,

        /// Upload logs under today's dated names instead of the stable names.
        #[arg(long)]
        dated_sync: bool,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Menu-driven cleanup.
    Interactive {
        /// Show what would be deleted without changing anything.
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation before logging in.
        #[arg(short, long)]
        yes: bool,
    },

    /// Start the JSON web service.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Upload existing log files to the remote folder.
    Upload {
        /// Log files to upload.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Store as `<stem>_<YYYY-MM-DD><ext>` snapshots.
        #[arg(long, conflicts_with = "today")]
        date_suffix: Option<String>,

        /// Use today's date as the suffix.
        #[arg(long)]
        today: bool,
    },

    /// Manage configuration.
    Config {
        /// Show current configuration.
        #[arg(long)]
        show: bool,
    },
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match SweepConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    if let Err(e) = observability::init_from_config(
        &config.logging,
        InitOptions {
            verbose: cli.verbose,
        },
    ) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

fn run_command(command: Commands, config: SweepConfig) -> redsweep::Result<()> {
    match command {
        Commands::Run {
            dry_run,
            rule,
            days,
            kinds,
            cutoff,
            dated_sync,
            json,
        } => commands::cmd_run(
            &config,
            &commands::RunArgs {
                dry_run,
                rule,
                days,
                kinds,
                cutoff,
                dated_sync,
                json,
            },
        ),
        Commands::Interactive { dry_run, yes } => commands::cmd_interactive(&config, dry_run, yes),
        Commands::Serve { port } => commands::cmd_serve(config, port),
        Commands::Upload {
            files,
            date_suffix,
            today,
        } => commands::cmd_upload(&config, &files, date_suffix, today),
        Commands::Config { show } => {
            commands::cmd_config(&config, show);
            Ok(())
        },
    }
}

//! # eduauth CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use eduauth_cli::fingerprint::{run_fingerprint, FingerprintArgs};
use eduauth_cli::seed::{run_seed, SeedArgs};

/// EduAuth registry operator tool.
#[derive(Parser, Debug)]
#[command(name = "eduauth", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the identity fingerprint of an identity number.
    Fingerprint(FingerprintArgs),

    /// Create the bootstrap administrator if it does not exist.
    SeedAdmin(SeedArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Fingerprint(args) => run_fingerprint(&args),
        Commands::SeedAdmin(args) => run_seed(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
